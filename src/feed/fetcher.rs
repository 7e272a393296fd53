use crate::feed::parser::{parse_feed, FeedItem, ParseError};
use crate::feed::retry::Retryable;
use futures::stream::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Per-request budget covering connect, response, and body read.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Identifying client signature sent with every feed request.
pub fn default_user_agent() -> String {
    format!("planet/{}", env!("CARGO_PKG_VERSION"))
}

/// Why a single feed could not be loaded.
#[derive(Debug, Error)]
pub enum FeedErrorKind {
    /// Network-level error (DNS, connection, TLS, truncated body, etc.)
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// The request did not complete within the request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The body is not a feed document
    #[error("parse error: {0}")]
    Parse(#[source] ParseError),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the 10MB size limit
    #[error("response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
}

/// A failed feed load: the offending URI and what went wrong.
///
/// Every kind is retryable; the Source Reader absorbs whatever survives the
/// retry budget.
#[derive(Debug, Error)]
#[error("failed to load feed {uri}: {kind}")]
pub struct FeedError {
    pub uri: String,
    pub kind: FeedErrorKind,
}

impl FeedError {
    /// Status code for [`FeedErrorKind::HttpStatus`] failures.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            FeedErrorKind::HttpStatus(status) => Some(status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, FeedErrorKind::Timeout(_))
    }
}

impl Retryable for FeedError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Retrieves and parses one remote feed document per call.
///
/// Cloning is cheap: the `reqwest::Client` is a shared handle and carries no
/// per-request state, so one fetcher serves every concurrent source.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Builds a fetcher with its own client sending `user_agent`.
    pub fn with_user_agent(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::new(client, timeout))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Loads `uri` and returns its items in document order, each tagged
    /// with `uri` as its source.
    ///
    /// # Errors
    ///
    /// - [`FeedErrorKind::Transport`] - Connection, TLS, or body read errors
    /// - [`FeedErrorKind::Timeout`] - Request exceeded the request timeout
    /// - [`FeedErrorKind::HttpStatus`] - Non-2xx HTTP response
    /// - [`FeedErrorKind::ResponseTooLarge`] - Body exceeded 10MB
    /// - [`FeedErrorKind::Parse`] - Body is not RSS, Atom, or JSON Feed
    pub async fn fetch(&self, uri: &str) -> Result<Vec<FeedItem>, FeedError> {
        tracing::info!(uri = %uri, "Loading feed");

        match self.fetch_items(uri).await {
            Ok(mut items) => {
                for item in &mut items {
                    item.source = uri.to_string();
                }
                tracing::debug!(uri = %uri, items = items.len(), "Feed loaded");
                Ok(items)
            }
            Err(kind) => {
                tracing::error!(uri = %uri, error = %kind, "Feed failed to load");
                Err(FeedError {
                    uri: uri.to_string(),
                    kind,
                })
            }
        }
    }

    async fn fetch_items(&self, uri: &str) -> Result<Vec<FeedItem>, FeedErrorKind> {
        let request = async {
            let response = self
                .client
                .get(uri)
                .send()
                .await
                .map_err(|e| self.classify(e))?;

            if !response.status().is_success() {
                return Err(FeedErrorKind::HttpStatus(response.status().as_u16()));
            }

            read_limited_bytes(response, MAX_FEED_SIZE)
                .await
                .map_err(|e| match e {
                    LimitedReadError::TooLarge => FeedErrorKind::ResponseTooLarge(MAX_FEED_SIZE),
                    LimitedReadError::Network(e) => self.classify(e),
                })
        };

        let bytes = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FeedErrorKind::Timeout(self.timeout))??;

        parse_feed(&bytes).map_err(FeedErrorKind::Parse)
    }

    fn classify(&self, err: reqwest::Error) -> FeedErrorKind {
        if err.is_timeout() {
            FeedErrorKind::Timeout(self.timeout)
        } else {
            FeedErrorKind::Transport(err)
        }
    }
}

enum LimitedReadError {
    TooLarge,
    Network(reqwest::Error),
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, LimitedReadError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(LimitedReadError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(LimitedReadError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(LimitedReadError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
