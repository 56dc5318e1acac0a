use scraper::Html;
use std::borrow::Cow;

/// Ellipsis appended to truncated text.
const ELLIPSIS: &str = "...";

/// Convert an HTML fragment into a single line of plain text.
///
/// The fragment is parsed as HTML, so entities are decoded and a bare `<` in
/// prose stays text. Script and style bodies are dropped. Runs of whitespace
/// or control characters collapse to one space.
///
/// ```
/// use feedrelay::util::strip_markup;
///
/// assert_eq!(strip_markup("<p>Hello&nbsp;<b>world</b></p>\n"), "Hello world");
/// ```
pub fn strip_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|parent| {
                    parent
                        .value()
                        .as_element()
                        .map(|el| matches!(el.name(), "script" | "style"))
                })
                .unwrap_or(false);
            (!hidden).then_some(&**text)
        })
        .collect();

    // Adjacent block elements still separate words.
    collapse_whitespace(&text.join(" "))
}

/// Collapse runs of whitespace and control characters into single spaces,
/// trimming both ends.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split(|c: char| c.is_whitespace() || c.is_control()) {
        if word.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
///
/// Counts Unicode scalar values, which is how webhook APIs measure their
/// field limits. The ellipsis is added after the kept prefix, matching the
/// `substring(0, n) + "..."` convention of chat embeds.
///
/// ```
/// use feedrelay::util::truncate_chars;
///
/// assert_eq!(truncate_chars("short", 10), "short");
/// assert_eq!(truncate_chars("Hello World", 5), "Hello...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        None => Cow::Borrowed(s),
        Some((cut, _)) => Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS)),
    }
}
