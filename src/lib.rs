//! Collects RSS/Atom feeds into per-category JSON archives and announces new
//! articles to Discord.
pub mod config;
pub mod feed;
pub mod http;
pub mod notify;
pub mod storage;
pub mod sync;
pub mod util;
