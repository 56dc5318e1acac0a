//! Feed collection: fetch one syndication source and normalize its entries.
//!
//! - [`parser`] - feed-rs parsing and the canonical `Article` normalization
//! - [`fetcher`] - HTTP retrieval with timeout and body size limits

mod fetcher;
mod parser;

pub use fetcher::{FeedCollector, FetchError};
pub use parser::{normalize, parse_feed, RawItem};
