use crate::aggregate::source::SourceReader;
use crate::config::Config;
use crate::feed::{ContentFilter, FeedFetcher, FeedItem};
use crate::roster::Author;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use url::Url;

/// Language selection meaning "every author, regardless of language".
pub const MIXED_LANGUAGE: &str = "mixed";

pub const COPYRIGHT_NOTICE: &str = "The copyright for each post is retained by its author.";

const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Static envelope fields shared by every combined feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub title: String,
    pub description: String,
    pub url: Url,
    pub image_url: Url,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contributor {
    pub name: String,
    pub email: String,
    pub website: String,
}

impl From<&Author> for Contributor {
    fn from(author: &Author) -> Self {
        Self {
            name: author.full_name(),
            email: author.email_address.clone(),
            website: author.website.to_string(),
        }
    }
}

/// One assembled, time-ordered feed for a language selection.
///
/// Built fresh by every [`Aggregator::aggregate`] call and never mutated
/// afterwards. Items are sorted newest first by effective timestamp, none is
/// dated after `last_updated`, and all passed the content filter.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedFeed {
    pub title: String,
    pub description: String,
    pub url: Url,
    pub image_url: Url,
    pub language: String,
    pub copyright: String,
    pub last_updated: DateTime<Utc>,
    pub contributors: Vec<Contributor>,
    pub items: Vec<FeedItem>,
}

/// Builds combined feeds from a roster of authors.
#[derive(Debug, Clone)]
pub struct Aggregator {
    reader: SourceReader,
    filter: ContentFilter,
    channel: ChannelInfo,
    max_concurrent: usize,
}

impl Aggregator {
    pub fn new(reader: SourceReader, filter: ContentFilter, channel: ChannelInfo) -> Self {
        Self {
            reader,
            filter,
            channel,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Caps how many authors are read at the same time (minimum 1).
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Wires fetcher, retry policy, filter, and envelope from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let channel = config.channel_info()?;
        let fetcher = FeedFetcher::with_user_agent(&config.user_agent(), config.request_timeout())
            .context("Failed to create HTTP client")?;
        let reader = SourceReader::new(fetcher, config.retry_policy());

        Ok(Self::new(reader, ContentFilter::new(&config.marker_keyword), channel)
            .with_max_concurrent(config.max_concurrent_fetches))
    }

    /// Aggregates the feeds of the authors selected by `language`.
    ///
    /// `"mixed"` selects every author; any other code selects authors whose
    /// language code is exactly equal. All selected authors are read before
    /// merging; a feed that fails only shrinks the item pool.
    pub async fn aggregate(
        &self,
        authors: &[Author],
        language: &str,
        max_items: Option<usize>,
    ) -> CombinedFeed {
        let selected = select_authors(authors, language);
        tracing::info!(
            language = %language,
            authors = selected.len(),
            "Loading combined feed"
        );

        // `buffered` yields in roster order, whichever author finishes first.
        let pool: Vec<FeedItem> = stream::iter(selected.iter().copied())
            .map(|author| self.reader.read_author_feeds(author))
            .buffered(self.max_concurrent)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        let now = Utc::now();
        let fetched = pool.len();
        let items = assemble_items(pool, &self.filter, now, max_items);
        tracing::info!(
            language = %language,
            fetched = fetched,
            kept = items.len(),
            "Combined feed assembled"
        );

        CombinedFeed {
            title: self.channel.title.clone(),
            description: self.channel.description.clone(),
            url: self.channel.url.clone(),
            image_url: self.channel.image_url.clone(),
            language: language.to_string(),
            copyright: COPYRIGHT_NOTICE.to_string(),
            last_updated: now,
            contributors: selected.into_iter().map(Contributor::from).collect(),
            items,
        }
    }
}

/// Authors contributing to `language`; see [`Aggregator::aggregate`].
pub fn select_authors<'a>(authors: &'a [Author], language: &str) -> Vec<&'a Author> {
    if language == MIXED_LANGUAGE {
        authors.iter().collect()
    } else {
        authors
            .iter()
            .filter(|a| a.language_code == language)
            .collect()
    }
}

/// Turns the merged item pool into the ordered item list of a combined feed.
///
/// Keeps items that pass `filter` and are not dated after `now`, drops
/// items repeating the id of an earlier item from the same source (first
/// occurrence wins), sorts newest first with a stable sort, then truncates
/// to `max_items`. Ids from different sources never collide.
pub fn assemble_items(
    pool: Vec<FeedItem>,
    filter: &ContentFilter,
    now: DateTime<Utc>,
    max_items: Option<usize>,
) -> Vec<FeedItem> {
    let mut seen = HashSet::new();
    let mut items: Vec<FeedItem> = pool
        .into_iter()
        .filter(|item| filter.include(item))
        .filter(|item| item.effective_timestamp() <= Some(now))
        .filter(|item| seen.insert((item.source.clone(), item.id.clone())))
        .collect();

    items.sort_by(|a, b| b.effective_timestamp().cmp(&a.effective_timestamp()));

    if let Some(max) = max_items {
        items.truncate(max);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn item(id: &str, title: &str, published: Option<DateTime<Utc>>) -> FeedItem {
        FeedItem {
            id: id.to_string(),
            source: "https://blog.example.com/feed.xml".to_string(),
            title: Some(title.to_string()),
            link: None,
            published,
            updated: None,
            body: None,
            categories: Vec::new(),
            extensions: HashMap::new(),
        }
    }

    fn ids(items: &[FeedItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    fn author(language: &str, email: &str) -> Author {
        Author {
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            state_or_region: String::new(),
            email_address: email.to_string(),
            short_bio_or_tag_line: String::new(),
            website: Url::parse("https://example.com/").unwrap(),
            twitter_handle: String::new(),
            github_handle: String::new(),
            gravatar_hash: String::new(),
            feed_uris: Vec::new(),
            position: None,
            language_code: language.to_string(),
        }
    }

    #[test]
    fn test_select_mixed_returns_all() {
        let authors = vec![author("en", "a@x"), author("fr", "b@x")];
        assert_eq!(select_authors(&authors, MIXED_LANGUAGE).len(), 2);
    }

    #[test]
    fn test_select_language_is_exact_and_case_sensitive() {
        let authors = vec![author("en", "a@x"), author("EN", "b@x"), author("fr", "c@x")];
        let selected = select_authors(&authors, "en");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].email_address, "a@x");
        assert!(select_authors(&authors, "de").is_empty());
    }

    #[test]
    fn test_assemble_filters_sorts_and_drops_future() {
        let now = Utc::now();
        let filter = ContentFilter::new("rust");
        let pool = vec![
            item("old", "Rust old", Some(now - Duration::days(3))),
            item("future", "Rust future", Some(now + Duration::days(1))),
            item("off-topic", "Gardening", Some(now - Duration::hours(1))),
            item("new", "Rust new", Some(now - Duration::hours(2))),
        ];

        let items = assemble_items(pool, &filter, now, None);
        assert_eq!(ids(&items), vec!["new", "old"]);
    }

    #[test]
    fn test_assemble_item_dated_exactly_now_is_kept() {
        let now = Utc::now();
        let filter = ContentFilter::new("rust");
        let items = assemble_items(vec![item("now", "rust", Some(now))], &filter, now, None);
        assert_eq!(ids(&items), vec!["now"]);
    }

    #[test]
    fn test_assemble_future_update_excludes_item() {
        let now = Utc::now();
        let filter = ContentFilter::new("rust");
        let mut edited = item("edited", "rust", Some(now - Duration::days(1)));
        edited.updated = Some(now + Duration::minutes(5));

        assert!(assemble_items(vec![edited], &filter, now, None).is_empty());
    }

    #[test]
    fn test_assemble_orders_by_later_of_published_and_updated() {
        let now = Utc::now();
        let filter = ContentFilter::new("rust");
        let mut revised = item("revised", "rust", Some(now - Duration::days(10)));
        revised.updated = Some(now - Duration::hours(1));
        let recent = item("recent", "rust", Some(now - Duration::days(1)));

        let items = assemble_items(vec![recent, revised], &filter, now, None);
        assert_eq!(ids(&items), vec!["revised", "recent"]);
    }

    #[test]
    fn test_assemble_undated_items_sort_last() {
        let now = Utc::now();
        let filter = ContentFilter::new("rust");
        let pool = vec![
            item("undated", "rust", None),
            item("dated", "rust", Some(now - Duration::days(365))),
        ];
        let items = assemble_items(pool, &filter, now, None);
        assert_eq!(ids(&items), vec!["dated", "undated"]);
    }

    #[test]
    fn test_assemble_ties_keep_pool_order() {
        let now = Utc::now();
        let at = Some(now - Duration::hours(1));
        let filter = ContentFilter::new("rust");
        let pool = vec![item("first", "rust", at), item("second", "rust", at), item("third", "rust", at)];

        let items = assemble_items(pool, &filter, now, None);
        assert_eq!(ids(&items), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_assemble_truncates() {
        let now = Utc::now();
        let filter = ContentFilter::new("rust");
        let pool: Vec<_> = (0..5)
            .map(|i| item(&format!("i{i}"), "rust", Some(now - Duration::hours(i))))
            .collect();

        assert_eq!(ids(&assemble_items(pool.clone(), &filter, now, Some(2))), vec!["i0", "i1"]);
        assert_eq!(assemble_items(pool.clone(), &filter, now, Some(0)).len(), 0);
        assert_eq!(assemble_items(pool, &filter, now, Some(50)).len(), 5);
    }

    #[test]
    fn test_assemble_drops_repeated_ids() {
        let now = Utc::now();
        let filter = ContentFilter::new("rust");
        let pool = vec![
            item("dup", "rust first", Some(now - Duration::hours(1))),
            item("dup", "rust second", Some(now - Duration::hours(2))),
        ];

        let items = assemble_items(pool, &filter, now, None);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("rust first"));
    }

    #[test]
    fn test_assemble_keeps_shared_ids_from_different_sources() {
        let now = Utc::now();
        let filter = ContentFilter::new("xamarin");
        let mut alice = item("1", "Alice on xamarin", Some(now - Duration::days(2)));
        alice.source = "https://alice.example.com/feed.xml".to_string();
        let mut bob = item("1", "Bob on xamarin", Some(now - Duration::days(1)));
        bob.source = "https://bob.example.com/feed.xml".to_string();

        let items = assemble_items(vec![alice, bob], &filter, now, None);
        let titles: Vec<_> = items.iter().map(|i| i.title.as_deref()).collect();
        assert_eq!(titles, vec![Some("Bob on xamarin"), Some("Alice on xamarin")]);
    }

    #[test]
    fn test_contributor_from_author() {
        let contributor = Contributor::from(&author("en", "a@x"));
        assert_eq!(
            contributor,
            Contributor {
                name: "A B".to_string(),
                email: "a@x".to_string(),
                website: "https://example.com/".to_string(),
            }
        );
    }

    proptest! {
        #[test]
        fn prop_assembled_items_are_sorted_past_and_capped(
            offsets in proptest::collection::vec(-1000i64..1000, 0..40),
            cap in proptest::option::of(0usize..50),
        ) {
            let now = Utc::now();
            let filter = ContentFilter::new("rust");
            let pool: Vec<_> = offsets
                .iter()
                .enumerate()
                .map(|(i, off)| item(&i.to_string(), "rust", Some(now + Duration::minutes(*off))))
                .collect();
            let eligible = offsets.iter().filter(|off| **off <= 0).count();

            let items = assemble_items(pool, &filter, now, cap);

            prop_assert_eq!(items.len(), cap.map_or(eligible, |c| c.min(eligible)));
            for item in &items {
                prop_assert!(item.effective_timestamp() <= Some(now));
            }
            for pair in items.windows(2) {
                let (a, b) = (pair[0].effective_timestamp(), pair[1].effective_timestamp());
                prop_assert!(a >= b);
                // Stable: equal timestamps keep pool order, and ids encode pool index.
                if a == b {
                    let (ia, ib): (usize, usize) = (pair[0].id.parse().unwrap(), pair[1].id.parse().unwrap());
                    prop_assert!(ia < ib);
                }
            }
        }
    }
}
