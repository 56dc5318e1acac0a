use chrono::{DateTime, Utc};
use feed_rs::parser;
use sha2::{Digest, Sha256};

use crate::storage::Article;
use crate::util::{collapse_whitespace, strip_markup};

/// Fields of one feed entry before normalization.
///
/// Mirrors what a syndication parser yields per item: every field optional.
#[derive(Debug, Clone, Default)]
pub struct RawItem {
    pub guid: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    /// Plain-text summary, if the feed provides one.
    pub content_snippet: Option<String>,
    /// Full body, usually HTML.
    pub content: Option<String>,
}

/// Parse RSS/Atom/JSON Feed bytes into normalized articles.
///
/// `now` stands in for entries without a publication date.
pub fn parse_feed(bytes: &[u8], now: DateTime<Utc>) -> Result<Vec<Article>, parser::ParseFeedError> {
    // feed-rs synthesizes an id from link + title for entries without one.
    // An empty id lets `normalize` fall back to the link instead, so a
    // retitled entry keeps its identity.
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)?;

    let articles = feed
        .entries
        .into_iter()
        .map(|entry| {
            let item = RawItem {
                guid: Some(entry.id).filter(|id| !id.trim().is_empty()),
                title: entry.title.map(|t| t.content),
                link: entry.links.first().map(|l| l.href.clone()),
                published: entry.published.or(entry.updated),
                content_snippet: entry.summary.map(|s| s.content),
                content: entry.content.and_then(|c| c.body),
            };
            normalize(item, now)
        })
        .collect();

    Ok(articles)
}

/// Canonicalize one entry.
///
/// - `id = guid ?? link`, or a content hash when neither is present
/// - `published_at = published ?? now`
/// - `snippet = content_snippet ?? content ?? ""`, reduced to plain text
pub fn normalize(item: RawItem, now: DateTime<Utc>) -> Article {
    let title = item
        .title
        .map(|t| collapse_whitespace(&t))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());
    let link = non_blank(item.link).unwrap_or_default();
    // Hashed before the `now` fallback so undated entries keep their id.
    let id = non_blank(item.guid)
        .or_else(|| Some(link.clone()).filter(|l| !l.is_empty()))
        .unwrap_or_else(|| content_hash(&link, &title, item.published));
    let published_at = item.published.unwrap_or(now);

    let snippet = non_blank(item.content_snippet)
        .or_else(|| non_blank(item.content))
        .map(|s| strip_markup(&s))
        .unwrap_or_default();

    Article {
        id,
        title,
        link,
        published_at,
        snippet,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn content_hash(link: &str, title: &str, published: Option<DateTime<Utc>>) -> String {
    let published = published
        .map(|p| p.timestamp().to_string())
        .unwrap_or_default();
    let input = format!("{}|{}|{}", link, title, published);
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_guid_preferred_over_link() {
        let article = normalize(
            RawItem {
                guid: Some("urn:guid:1".into()),
                link: Some("https://example.com/1".into()),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(article.id, "urn:guid:1");
        assert_eq!(article.link, "https://example.com/1");
    }

    #[test]
    fn test_link_used_when_guid_missing_or_blank() {
        for guid in [None, Some("   ".to_string())] {
            let article = normalize(
                RawItem {
                    guid,
                    link: Some("https://example.com/post".into()),
                    ..Default::default()
                },
                now(),
            );
            assert_eq!(article.id, "https://example.com/post");
        }
    }

    #[test]
    fn test_hash_id_when_no_guid_or_link() {
        let item = RawItem {
            title: Some("Orphan".into()),
            ..Default::default()
        };
        let a = normalize(item.clone(), now());
        let b = normalize(item, now());

        assert_eq!(a.id.len(), 64);
        assert_eq!(a.id, b.id, "hash must be stable across fetches");
    }

    #[test]
    fn test_hash_id_of_undated_entry_ignores_fetch_time() {
        let item = RawItem {
            title: Some("Orphan".into()),
            ..Default::default()
        };
        let first = normalize(item.clone(), now());
        let later = normalize(item, now() + chrono::Duration::minutes(10));

        assert_eq!(first.id, later.id);
        assert_ne!(first.published_at, later.published_at);
    }

    #[test]
    fn test_hash_id_distinguishes_publication_dates() {
        let dated = |day| RawItem {
            title: Some("Weekly digest".into()),
            published: Some(Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let a = normalize(dated(1), now());
        let b = normalize(dated(8), now());

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_title_is_plain_text_not_markup() {
        let article = normalize(
            RawItem {
                title: Some("I <3 Rust\n  and tokio".into()),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(article.title, "I <3 Rust and tokio");
    }

    #[test]
    fn test_missing_date_defaults_to_now() {
        let article = normalize(RawItem::default(), now());
        assert_eq!(article.published_at, now());
    }

    #[test]
    fn test_snippet_fallback_chain() {
        let from_snippet = normalize(
            RawItem {
                content_snippet: Some("summary".into()),
                content: Some("<p>body</p>".into()),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(from_snippet.snippet, "summary");

        let from_content = normalize(
            RawItem {
                content: Some("<p>body <em>text</em></p>".into()),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(from_content.snippet, "body text");

        let empty = normalize(RawItem::default(), now());
        assert_eq!(empty.snippet, "");
        assert_eq!(empty.title, "Untitled");
    }

    #[test]
    fn test_parse_rss_items() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item>
        <guid>item-1</guid>
        <title>First &amp; best</title>
        <link>https://example.com/1</link>
        <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
        <description>&lt;p&gt;Hello &lt;b&gt;there&lt;/b&gt;&lt;/p&gt;</description>
    </item>
    <item>
        <title>No date</title>
        <link>https://example.com/2</link>
    </item>
</channel></rss>"#;

        let articles = parse_feed(rss.as_bytes(), now()).unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].id, "item-1");
        assert_eq!(articles[0].title, "First & best");
        assert_eq!(articles[0].link, "https://example.com/1");
        assert_eq!(
            articles[0].published_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(articles[0].snippet, "Hello there");
        assert_eq!(articles[1].published_at, now());
        assert_eq!(articles[1].id, "https://example.com/2");
    }

    #[test]
    fn test_parse_atom_entries() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom</title>
    <id>urn:feed</id>
    <updated>2024-03-01T00:00:00Z</updated>
    <entry>
        <id>urn:entry:1</id>
        <title>Atom entry</title>
        <link href="https://example.com/atom/1"/>
        <updated>2024-03-01T00:00:00Z</updated>
        <summary>Short summary</summary>
    </entry>
</feed>"#;

        let articles = parse_feed(atom.as_bytes(), now()).unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "urn:entry:1");
        assert_eq!(articles[0].link, "https://example.com/atom/1");
        assert_eq!(
            articles[0].published_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(articles[0].snippet, "Short summary");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_feed(b"<not valid xml", now()).is_err());
    }
}
