//! RSS/Atom parsing into raw items

use feed_rs::model::Entry;
use feedloom_domain::{ItemKey, Platform, RawItem, SourceError};
use regex::Regex;
use std::sync::LazyLock;

/// Entries kept per fetch
pub const MAX_FEED_ENTRIES: usize = 20;
/// Description length after HTML stripping, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 500;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Valid regex"));
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("Valid regex"));

#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    /// Feed-level title, usually the channel or account name
    pub title: Option<String>,
    pub items: Vec<RawItem>,
}

/// Parse a feed body, keying each entry by a hash of its id (or link)
pub fn parse_feed(body: &str, platform: Platform) -> Result<ParsedFeed, SourceError> {
    parse_feed_keyed(body, platform, |id, link| {
        let stable = if id.is_empty() { link } else { id };
        ItemKey::hashed(platform, stable)
    })
}

/// Parse a feed body with a custom key function over `(entry_id, link)`
pub fn parse_feed_keyed(
    body: &str,
    platform: Platform,
    key_fn: impl Fn(&str, &str) -> ItemKey,
) -> Result<ParsedFeed, SourceError> {
    // Entries without a guid keep an empty id so callers key them by link alone
    let feed = feed_rs::parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(body.as_bytes())
        .map_err(|e| SourceError::Parse(format!("{} feed: {}", platform.as_str(), e)))?;

    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty());

    let items = feed
        .entries
        .into_iter()
        .take(MAX_FEED_ENTRIES)
        .filter_map(|entry| entry_to_item(entry, &key_fn, title.as_deref()))
        .collect();

    Ok(ParsedFeed { title, items })
}

fn entry_to_item(
    entry: Entry,
    key_fn: &impl Fn(&str, &str) -> ItemKey,
    channel_title: Option<&str>,
) -> Option<RawItem> {
    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();
    let id = entry.id.trim().to_string();
    if id.is_empty() && link.is_empty() {
        return None;
    }

    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();

    let raw_description = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .or_else(|| {
            entry
                .media
                .iter()
                .find_map(|m| m.description.as_ref().map(|d| d.content.clone()))
        })
        .unwrap_or_default();

    let pub_date = entry
        .published
        .or(entry.updated)
        .map(|d| d.format("%Y-%m-%dT%H:%M:%SZ").to_string());

    Some(
        RawItem::new(key_fn(&id, &link), title, link)
            .with_description(html_to_text(&raw_description, MAX_DESCRIPTION_CHARS))
            .with_pub_date(pub_date)
            .with_channel_title(channel_title.map(str::to_string)),
    )
}

/// Strip tags, decode common entities and collapse whitespace
pub fn html_to_text(html: &str, max_chars: usize) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let collapsed = SPACE_RE.replace_all(decoded.trim(), " ");
    truncate_chars(&collapsed, max_chars)
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Whether a proxied-feed response actually carries a feed
pub fn is_feed_content(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.contains("xml") || ct.contains("rss"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Studio Reel</title>
    <link>https://vimeo.com/studio</link>
    <item>
      <title>First cut</title>
      <link>https://vimeo.com/111</link>
      <guid>tag:vimeo,2026:clip111</guid>
      <description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt; &amp;amp; friends&lt;/p&gt;</description>
      <pubDate>Wed, 11 Feb 2026 02:07:30 +0000</pubDate>
    </item>
    <item>
      <title>Second cut</title>
      <link>https://vimeo.com/222</link>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Loud Channel</title>
  <id>urn:feed</id>
  <updated>2026-02-10T00:00:00Z</updated>
  <entry>
    <id>yt:video:abc123</id>
    <title>Episode</title>
    <link href="https://www.youtube.com/watch?v=abc123"/>
    <published>2026-02-09T10:00:00+00:00</published>
    <updated>2026-02-09T11:00:00+00:00</updated>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss() {
        let feed = parse_feed(RSS, Platform::Vimeo).unwrap();

        assert_eq!(feed.title.as_deref(), Some("Studio Reel"));
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.title, "First cut");
        assert_eq!(first.link, "https://vimeo.com/111");
        assert!(first.description.starts_with("Hello world"));
        assert!(!first.description.contains('<'));
        assert_eq!(first.channel_title.as_deref(), Some("Studio Reel"));
        assert_eq!(first.pub_date.as_deref(), Some("2026-02-11T02:07:30Z"));
        assert!(first.key.as_str().starts_with("vimeo_"));
    }

    #[test]
    fn test_keys_are_stable_across_parses() {
        let a = parse_feed(RSS, Platform::Vimeo).unwrap();
        let b = parse_feed(RSS, Platform::Vimeo).unwrap();
        let keys_a: Vec<_> = a.items.iter().map(|i| i.key.clone()).collect();
        let keys_b: Vec<_> = b.items.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys_a, keys_b);
        assert_ne!(keys_a[0], keys_a[1]);
    }

    #[test]
    fn test_key_ignores_title_when_guid_missing() {
        let body = |title: &str| {
            format!(
                "<rss version=\"2.0\"><channel><title>w</title>\
                 <item><title>{title}</title><link>https://weibo.com/777/Pq1</link></item>\
                 </channel></rss>"
            )
        };

        let a = parse_feed(&body("original title"), Platform::Weibo).unwrap();
        let b = parse_feed(&body("edited title"), Platform::Weibo).unwrap();

        assert_eq!(a.items[0].key, b.items[0].key);
        assert_eq!(
            a.items[0].key,
            ItemKey::hashed(Platform::Weibo, "https://weibo.com/777/Pq1")
        );
    }

    #[test]
    fn test_guid_wins_over_link() {
        let feed = parse_feed(RSS, Platform::Vimeo).unwrap();
        assert_eq!(
            feed.items[0].key,
            ItemKey::hashed(Platform::Vimeo, "tag:vimeo,2026:clip111")
        );
        assert_eq!(
            feed.items[1].key,
            ItemKey::hashed(Platform::Vimeo, "https://vimeo.com/222")
        );
    }

    #[test]
    fn test_parse_atom_with_custom_keys() {
        let feed = parse_feed_keyed(ATOM, Platform::Youtube, |id, _| {
            ItemKey::native(Platform::Youtube, id.trim_start_matches("yt:video:"))
        })
        .unwrap();

        assert_eq!(feed.title.as_deref(), Some("Loud Channel"));
        assert_eq!(feed.items[0].key.as_str(), "youtube_abc123");
        assert_eq!(feed.items[0].pub_date.as_deref(), Some("2026-02-09T10:00:00Z"));
    }

    #[test]
    fn test_entry_cap() {
        let entries: String = (0..30)
            .map(|i| format!("<item><title>{i}</title><link>https://x/{i}</link></item>"))
            .collect();
        let body =
            format!("<rss version=\"2.0\"><channel><title>t</title>{entries}</channel></rss>");

        let feed = parse_feed(&body, Platform::Weibo).unwrap();
        assert_eq!(feed.items.len(), MAX_FEED_ENTRIES);
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(
            parse_feed("<html>blocked</html>", Platform::Bilibili),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_html_to_text_caps_chars() {
        let long = "字".repeat(600);
        assert_eq!(html_to_text(&long, 500).chars().count(), 500);
    }

    #[test]
    fn test_feed_content_type() {
        assert!(is_feed_content(Some("application/rss+xml; charset=utf-8")));
        assert!(is_feed_content(Some("text/xml")));
        assert!(!is_feed_content(Some("text/html")));
        assert!(!is_feed_content(None));
    }
}
