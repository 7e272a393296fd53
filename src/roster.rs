//! The author roster: who contributes to the combined feeds.
//!
//! The roster is a JSON array of authors. It is loaded once per run and only
//! read afterwards; no validation beyond deserialization happens here.
use crate::aggregate::MIXED_LANGUAGE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Failed to read author roster: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid author roster JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Geographic position shown on author listings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub state_or_region: String,
    pub email_address: String,
    #[serde(default, rename = "tagOrBio")]
    pub short_bio_or_tag_line: String,
    #[serde(rename = "webSite")]
    pub website: Url,
    #[serde(default)]
    pub twitter_handle: String,
    pub github_handle: String,
    #[serde(default)]
    pub gravatar_hash: String,
    pub feed_uris: Vec<Url>,
    #[serde(default)]
    pub position: Option<GeoPosition>,
    /// ISO 639-1, lowercase, two letters.
    pub language_code: String,
}

impl Author {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Reads and parses the roster file at `path`.
pub async fn load_authors(path: &Path) -> Result<Vec<Author>, RosterError> {
    let content = tokio::fs::read_to_string(path).await?;
    let authors = parse_authors(&content)?;
    tracing::info!(path = %path.display(), authors = authors.len(), "Loaded author roster");
    Ok(authors)
}

pub fn parse_authors(content: &str) -> Result<Vec<Author>, RosterError> {
    Ok(serde_json::from_str(content)?)
}

/// Language selections to publish: each distinct author language in
/// first-seen order, followed by [`MIXED_LANGUAGE`].
pub fn feed_languages(authors: &[Author]) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    for author in authors {
        if !languages.contains(&author.language_code) {
            languages.push(author.language_code.clone());
        }
    }
    languages.push(MIXED_LANGUAGE.to_string());
    languages
}
