use chrono::{DateTime, Utc};
use feed_rs::parser;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

/// Name of the item extension element holding free-form keywords.
pub const KEYWORDS_EXTENSION: &str = "keywords";

/// Errors produced while turning a feed document into items.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not a feed `feed-rs` understands (RSS, Atom, JSON Feed).
    #[error("invalid feed document: {0}")]
    Feed(#[from] parser::ParseFeedError),
}

/// A single entry taken from a remote feed.
///
/// Read-only once parsed. Timestamps are kept separately because the
/// combined feed orders by whichever of the two is later.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    /// The entry's own id/guid, or a SHA-256 of link|title when it has none.
    pub id: String,
    /// URI of the feed the item was read from; empty when parsed from bytes
    /// without a fetch. Ids are only unique within one source.
    pub source: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// Summary, falling back to the full content body.
    pub body: Option<String>,
    pub categories: Vec<String>,
    /// Raw text of the item element's direct children, keyed by local name.
    pub extensions: HashMap<String, String>,
}

impl FeedItem {
    /// The later of the publish and last-updated timestamps.
    ///
    /// `None` (neither timestamp present) orders before every real instant.
    pub fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        self.published.max(self.updated)
    }

    /// Looks up an extension element by exact local name.
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }

    pub fn keywords(&self) -> Option<&str> {
        self.extension(KEYWORDS_EXTENSION)
    }
}

/// Parses a feed document into items, in document order.
///
/// Structured fields come from `feed-rs`. Extension elements are gathered by
/// a second, lightweight `quick-xml` pass; if that pass fails or disagrees
/// with `feed-rs` on the number of entries, items carry no extensions.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, ParseError> {
    let feed = parser::Builder::new()
        .id_generator(|links, title, _uri| {
            generate_id(
                links.first().map(|l| l.href.as_str()),
                title.as_ref().map(|t| t.content.as_str()).unwrap_or(""),
            )
        })
        .build()
        .parse(bytes)?;

    let extensions = match scan_item_extensions(bytes) {
        Ok(found) if found.len() == feed.entries.len() => found,
        Ok(found) => {
            tracing::debug!(
                entries = feed.entries.len(),
                scanned = found.len(),
                "Extension scan disagrees with entry count, ignoring extensions"
            );
            Vec::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Extension scan failed, ignoring extensions");
            Vec::new()
        }
    };
    let mut extensions = extensions.into_iter();

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let body = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));
            let title = entry.title.map(|t| t.content);
            let categories = entry.categories.into_iter().map(|c| c.term).collect();

            FeedItem {
                id: entry.id,
                source: String::new(),
                title,
                link,
                published: entry.published,
                updated: entry.updated,
                body,
                categories,
                extensions: extensions.next().unwrap_or_default(),
            }
        })
        .collect();

    Ok(items)
}

/// Id for entries that carry no guid/id of their own.
///
/// Called by `feed-rs` only for entries whose id is missing.
fn generate_id(link: Option<&str>, title: &str) -> String {
    let input = format!("{}|{}", link.unwrap_or(""), title);
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

fn is_entry_element(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"item" | b"entry")
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Collects, for every `<item>`/`<entry>`, the text of its direct children.
///
/// Keys are local names (`media:keywords` → `keywords`); the first occurrence
/// of a name wins. Text of nested descendants is folded into the enclosing
/// direct child.
fn scan_item_extensions(bytes: &[u8]) -> Result<Vec<HashMap<String, String>>, quick_xml::Error> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations, so a
    // hostile feed cannot smuggle external entities through this pass.
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut current: Option<HashMap<String, String>> = None;
    // Depth below the current entry element; 0 means directly inside it.
    let mut depth: usize = 0;
    let mut child: Option<(String, String)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if current.is_some() {
                    depth += 1;
                    if depth == 1 {
                        child = Some((local_name(&e), String::new()));
                    }
                } else if is_entry_element(&e) {
                    current = Some(HashMap::new());
                    depth = 0;
                }
            }
            Event::Empty(e) => match current.as_mut() {
                Some(fields) if depth == 0 => {
                    fields.entry(local_name(&e)).or_default();
                }
                Some(_) => {}
                None if is_entry_element(&e) => items.push(HashMap::new()),
                None => {}
            },
            Event::Text(t) => {
                if let Some((_, text)) = child.as_mut() {
                    // HTML entities such as &nbsp; are not XML; keep the raw
                    // text of that node rather than failing the whole scan.
                    match t.unescape() {
                        Ok(unescaped) => text.push_str(&unescaped),
                        Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Event::CData(c) => {
                if let Some((_, text)) = child.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) if current.is_some() => {
                if depth == 0 {
                    items.extend(current.take());
                } else {
                    if depth == 1 {
                        if let (Some(fields), Some((name, text))) = (current.as_mut(), child.take())
                        {
                            fields.entry(name).or_insert(text);
                        }
                    }
                    depth -= 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}
