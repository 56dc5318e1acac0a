//! Text helpers for normalizing feed content and fitting it into notifications.

mod text;

pub use text::{collapse_whitespace, strip_markup, truncate_chars};
