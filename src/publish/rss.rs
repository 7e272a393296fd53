use crate::aggregate::CombinedFeed;
use crate::feed::FeedItem;
use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const MEDIA_NS: &str = "http://search.yahoo.com/mrss/";

/// Serializes a combined feed as an RSS 2.0 document.
///
/// Channel: `title`, `link`, `description`, `language`, `copyright`,
/// `lastBuildDate`, `generator`, `image`, and one `atom:contributor` per
/// contributor. Items: `title`, `link`, `guid`, `pubDate`, `atom:updated`,
/// `description`, `category`, and `media:keywords` when the source carried
/// keywords.
/// Optional fields are omitted rather than written empty.
pub fn to_rss_xml(feed: &CombinedFeed) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    // <rss version="2.0" xmlns:atom="..." xmlns:media="...">
    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    rss.push_attribute(("xmlns:media", MEDIA_NS));
    writer
        .write_event(Event::Start(rss))
        .context("Failed to write rss element")?;
    writer
        .write_event(Event::Start(BytesStart::new("channel")))
        .context("Failed to write channel element")?;

    write_text_element(&mut writer, "title", &feed.title)?;
    write_text_element(&mut writer, "link", feed.url.as_str())?;
    write_text_element(&mut writer, "description", &feed.description)?;
    write_text_element(&mut writer, "language", &feed.language)?;
    write_text_element(&mut writer, "copyright", &feed.copyright)?;
    write_text_element(&mut writer, "lastBuildDate", &feed.last_updated.to_rfc2822())?;
    write_text_element(
        &mut writer,
        "generator",
        concat!("planet ", env!("CARGO_PKG_VERSION")),
    )?;

    // <image><url/><title/><link/></image>
    writer
        .write_event(Event::Start(BytesStart::new("image")))
        .context("Failed to write image element")?;
    write_text_element(&mut writer, "url", feed.image_url.as_str())?;
    write_text_element(&mut writer, "title", &feed.title)?;
    write_text_element(&mut writer, "link", feed.url.as_str())?;
    writer
        .write_event(Event::End(BytesEnd::new("image")))
        .context("Failed to write image end")?;

    for contributor in &feed.contributors {
        writer
            .write_event(Event::Start(BytesStart::new("atom:contributor")))
            .context("Failed to write contributor element")?;
        write_text_element(&mut writer, "atom:name", &contributor.name)?;
        write_text_element(&mut writer, "atom:email", &contributor.email)?;
        write_text_element(&mut writer, "atom:uri", &contributor.website)?;
        writer
            .write_event(Event::End(BytesEnd::new("atom:contributor")))
            .context("Failed to write contributor end")?;
    }

    for item in &feed.items {
        write_item(&mut writer, item)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("channel")))
        .context("Failed to write channel end")?;
    writer
        .write_event(Event::End(BytesEnd::new("rss")))
        .context("Failed to write rss end")?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).context("Generated RSS contains invalid UTF-8")
}

fn write_item(writer: &mut Writer<Cursor<Vec<u8>>>, item: &FeedItem) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("item")))
        .context("Failed to write item element")?;

    if let Some(title) = &item.title {
        write_text_element(writer, "title", title)?;
    }
    if let Some(link) = &item.link {
        write_text_element(writer, "link", link)?;
    }

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", "false"));
    writer
        .write_event(Event::Start(guid))
        .context("Failed to write guid element")?;
    writer
        .write_event(Event::Text(BytesText::new(&item.id)))
        .context("Failed to write guid text")?;
    writer
        .write_event(Event::End(BytesEnd::new("guid")))
        .context("Failed to write guid end")?;

    if let Some(published) = item.published {
        write_text_element(writer, "pubDate", &published.to_rfc2822())?;
    }
    if let Some(updated) = item.updated {
        write_text_element(writer, "atom:updated", &updated.to_rfc3339())?;
    }
    if let Some(body) = &item.body {
        write_text_element(writer, "description", body)?;
    }
    for category in &item.categories {
        write_text_element(writer, "category", category)?;
    }
    if let Some(keywords) = item.keywords() {
        write_text_element(writer, "media:keywords", keywords)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("item")))
        .context("Failed to write item end")?;
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write {name} element"))?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .with_context(|| format!("Failed to write {name} text"))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write {name} end"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Contributor, COPYRIGHT_NOTICE};
    use crate::feed::{parse_feed, KEYWORDS_EXTENSION};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use url::Url;

    fn sample_feed(items: Vec<FeedItem>) -> CombinedFeed {
        CombinedFeed {
            title: "Planet Rust".to_string(),
            description: "Posts from the community".to_string(),
            url: Url::parse("https://planet.example.com/").unwrap(),
            image_url: Url::parse("https://planet.example.com/logo.png").unwrap(),
            language: "en".to_string(),
            copyright: COPYRIGHT_NOTICE.to_string(),
            last_updated: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            contributors: vec![Contributor {
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                website: "https://ada.example.com/".to_string(),
            }],
            items,
        }
    }

    fn sample_item() -> FeedItem {
        let mut extensions = HashMap::new();
        extensions.insert(KEYWORDS_EXTENSION.to_string(), "rust, async".to_string());
        FeedItem {
            id: "post-1".to_string(),
            source: "https://ada.example.com/feed.xml".to_string(),
            title: Some("Tips & <tricks>".to_string()),
            link: Some("https://ada.example.com/post?a=1&b=2".to_string()),
            published: Some(Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap()),
            updated: Some(Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap()),
            body: Some("<p>Hello</p>".to_string()),
            categories: vec!["Rust".to_string(), "Async".to_string()],
            extensions,
        }
    }

    #[test]
    fn test_channel_envelope() {
        let xml = to_rss_xml(&sample_feed(Vec::new())).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"<rss version="2.0""#));
        assert!(xml.contains("<language>en</language>"));
        assert!(xml.contains("<lastBuildDate>Fri,"));
        assert!(xml.contains("Mar 2024 12:00:00 +0000</lastBuildDate>"));
        assert!(xml.contains("<url>https://planet.example.com/logo.png</url>"));
        assert!(xml.contains("<atom:email>ada@example.com</atom:email>"));
        assert!(xml.contains(COPYRIGHT_NOTICE));
    }

    #[test]
    fn test_items_survive_reparse() {
        let mut older = sample_item();
        older.id = "post-0".to_string();
        older.title = Some("Older".to_string());
        older.published = Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
        older.updated = None;
        older.extensions.clear();

        let xml = to_rss_xml(&sample_feed(vec![sample_item(), older])).unwrap();
        let items = parse_feed(xml.as_bytes()).unwrap();

        assert_eq!(items.len(), 2);
        let first = &items[0];
        assert_eq!(first.id, "post-1");
        assert_eq!(first.title.as_deref(), Some("Tips & <tricks>"));
        assert_eq!(first.link.as_deref(), Some("https://ada.example.com/post?a=1&b=2"));
        assert_eq!(first.published, sample_item().published);
        assert_eq!(first.categories, vec!["Rust".to_string(), "Async".to_string()]);
        assert_eq!(first.keywords(), Some("rust, async"));
        assert_eq!(first.body.as_deref(), Some("<p>Hello</p>"));

        assert_eq!(items[1].id, "post-0");
        assert_eq!(items[1].keywords(), None);
    }

    #[test]
    fn test_keywords_written_in_media_namespace() {
        let xml = to_rss_xml(&sample_feed(vec![sample_item()])).unwrap();
        assert!(xml.contains(r#"xmlns:media="http://search.yahoo.com/mrss/""#));
        assert!(xml.contains("<media:keywords>rust, async</media:keywords>"));
        assert!(!xml.contains("<keywords>"));
    }

    #[test]
    fn test_optional_item_fields_omitted() {
        let bare = FeedItem {
            id: "bare".to_string(),
            source: String::new(),
            title: None,
            link: None,
            published: None,
            updated: None,
            body: None,
            categories: Vec::new(),
            extensions: HashMap::new(),
        };
        let xml = to_rss_xml(&sample_feed(vec![bare])).unwrap();
        let item_xml = &xml[xml.find("<item>").unwrap()..];
        assert!(!item_xml.contains("<pubDate>"));
        assert!(!item_xml.contains("<link>"));
        assert!(item_xml.contains(r#"<guid isPermaLink="false">bare</guid>"#));
    }
}
