//! Single-feed retrieval: fetching, parsing, retrying, and topical filtering.
//!
//! - [`parser`] - Feed parsing using the `feed-rs` crate, plus extension elements
//! - [`fetcher`] - HTTP retrieval with a request timeout and body size limit
//! - [`retry`] - Stateless retry policy with `r * 1.2^r` backoff
//! - [`filter`] - Marker-keyword predicate deciding inclusion
//!
//! # Example
//!
//! ```ignore
//! use planet::feed::{FeedFetcher, RetryPolicy};
//!
//! let fetcher = FeedFetcher::with_user_agent("planet/0.1.0", DEFAULT_REQUEST_TIMEOUT)?;
//! let items = RetryPolicy::default()
//!     .run(uri, || fetcher.fetch(uri))
//!     .await?;
//! ```

mod fetcher;
mod filter;
mod parser;
mod retry;

pub use fetcher::{
    default_user_agent, FeedError, FeedErrorKind, FeedFetcher, DEFAULT_REQUEST_TIMEOUT,
};
pub use filter::ContentFilter;
pub use parser::{parse_feed, FeedItem, ParseError, KEYWORDS_EXTENSION};
pub use retry::{Retryable, RetryPolicy, DEFAULT_MAX_RETRIES};
