use crate::feed::{FeedFetcher, FeedItem, RetryPolicy};
use crate::roster::Author;
use futures::future;

/// Reads every feed of one author, absorbing failures.
///
/// This is the failure-isolation boundary: a feed that still fails after
/// the retry budget contributes nothing, and its siblings are unaffected.
#[derive(Debug, Clone)]
pub struct SourceReader {
    fetcher: FeedFetcher,
    retry: RetryPolicy,
}

impl SourceReader {
    pub fn new(fetcher: FeedFetcher, retry: RetryPolicy) -> Self {
        Self { fetcher, retry }
    }

    /// Fetches all of `author`'s feeds concurrently and concatenates the
    /// items of the ones that loaded. Never fails.
    pub async fn read_author_feeds(&self, author: &Author) -> Vec<FeedItem> {
        let reads = author
            .feed_uris
            .iter()
            .map(|uri| self.read_source(author, uri.as_str()));

        future::join_all(reads).await.into_iter().flatten().collect()
    }

    async fn read_source(&self, author: &Author, uri: &str) -> Vec<FeedItem> {
        let fetcher = &self.fetcher;

        match self.retry.run(uri, move || fetcher.fetch(uri)).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(
                    author = %author.full_name(),
                    uri = %e.uri,
                    error = %e.kind,
                    "Feed failed to load after retries, skipping"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::default_user_agent;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rss(guid: &str, title: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
    <item><guid>{guid}</guid><title>{title}</title></item>
</channel></rss>"#
        )
    }

    fn author(uris: &[String]) -> Author {
        Author {
            first_name: "Test".to_string(),
            last_name: "Author".to_string(),
            state_or_region: String::new(),
            email_address: "test@example.com".to_string(),
            short_bio_or_tag_line: String::new(),
            website: Url::parse("https://example.com/").unwrap(),
            twitter_handle: String::new(),
            github_handle: "test".to_string(),
            gravatar_hash: String::new(),
            feed_uris: uris.iter().map(|u| Url::parse(u).unwrap()).collect(),
            position: None,
            language_code: "en".to_string(),
        }
    }

    fn reader() -> SourceReader {
        let fetcher =
            FeedFetcher::with_user_agent(&default_user_agent(), Duration::from_millis(500))
                .unwrap();
        SourceReader::new(fetcher, RetryPolicy::new(2, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_concatenates_all_feeds() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss("a1", "From A")))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss("b1", "From B")))
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let items = reader()
            .read_author_feeds(&author(&[format!("{base}/a"), format!("{base}/b")]))
            .await;

        let mut ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a1", "b1"]);
    }

    #[tokio::test]
    async fn test_failing_feed_is_isolated_after_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // Initial request + 2 retries
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss("ok1", "Fine")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let items = reader()
            .read_author_feeds(&author(&[format!("{base}/broken"), format!("{base}/ok")]))
            .await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "ok1");
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss("r1", "Recovered")))
            .mount(&mock_server)
            .await;

        let items = reader()
            .read_author_feeds(&author(&[format!("{}/feed", mock_server.uri())]))
            .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "r1");
    }

    #[tokio::test]
    async fn test_author_without_feeds_yields_nothing() {
        assert!(reader().read_author_feeds(&author(&[])).await.is_empty());
    }
}
