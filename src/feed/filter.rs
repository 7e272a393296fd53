use crate::feed::parser::FeedItem;

/// Decides whether an item is on-topic for the combined feed.
///
/// An item is included when its title, any of its categories, or its
/// `keywords` extension contains the marker keyword, ignoring case.
/// An item with none of those fields is excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    marker: String,
}

impl ContentFilter {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_lowercase(),
        }
    }

    /// The marker keyword, lowercased.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn include(&self, item: &FeedItem) -> bool {
        let in_title = item.title.as_deref().is_some_and(|t| self.matches(t));

        in_title
            || item.categories.iter().any(|c| self.matches(c))
            || item.keywords().is_some_and(|k| self.matches(k))
    }

    fn matches(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.marker)
    }
}
