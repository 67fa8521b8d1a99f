//! Body text selection and display formatting.
//!
//! Picks the best available body representation for a message and flattens
//! rich (HTML) bodies to plain text: `<br>` becomes a newline, tags are
//! stripped, and the four standard entities are decoded.

use crate::records::{parse_feed_timestamp, Message};
use regex::Regex;
use std::sync::LazyLock;

/// Placeholder for messages with no usable body at all.
pub const NO_CONTENT: &str = "[No content]";

/// Display format for message dates.
const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Standard entities, `&amp;` last so decoding never manufactures new ones.
const HTML_ENTITIES: [(&str, &str); 4] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&amp;", "&"),
];

/// Flatten a rich (HTML) body to plain text.
pub fn strip_rich_text(rich: &str) -> String {
    let text = BR_RE.replace_all(rich, "\n");
    let mut text = TAG_RE.replace_all(&text, "").to_string();
    for (entity, replacement) in HTML_ENTITIES {
        text = text.replace(entity, replacement);
    }
    text.trim().to_string()
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Best available text for a message, in priority order:
/// plain, parsed, rich (stripped), excerpt, placeholder.
pub fn body_text(message: &Message) -> String {
    if let Some(plain) = non_blank(&message.body.plain) {
        return plain.to_string();
    }
    if let Some(parsed) = non_blank(&message.body.parsed) {
        return parsed.to_string();
    }
    if let Some(rich) = non_blank(&message.body.rich) {
        let stripped = strip_rich_text(rich);
        if !stripped.is_empty() {
            return stripped;
        }
    }
    if let Some(excerpt) = non_blank(&message.content_excerpt) {
        return excerpt.to_string();
    }
    NO_CONTENT.to_string()
}

/// Feed timestamp formatted for display, falling back to the raw string
/// when it does not parse.
pub fn format_timestamp(raw: &str) -> String {
    match parse_feed_timestamp(raw) {
        Some(instant) => instant.format(DISPLAY_TIME_FORMAT).to_string(),
        None => raw.to_string(),
    }
}

/// Display date for a message; "-" when the feed never supplied one.
pub fn display_date(message: &Message) -> String {
    match message.created_at.as_deref() {
        Some(raw) => format_timestamp(raw),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordId;

    #[test]
    fn test_rich_text_stripping() {
        assert_eq!(strip_rich_text("<p>Hi&amp;Bye<br>Next</p>"), "Hi&Bye\nNext");
    }

    #[test]
    fn test_br_variants_become_newlines() {
        assert_eq!(strip_rich_text("a<br/>b<BR />c"), "a\nb\nc");
    }

    #[test]
    fn test_entity_decoding_order() {
        // "&amp;lt;" is a literal "&lt;", not a second round of decoding.
        assert_eq!(strip_rich_text("&amp;lt;"), "&lt;");
        assert_eq!(strip_rich_text("&lt;b&gt; &quot;q&quot;"), "<b> \"q\"");
    }

    #[test]
    fn test_body_priority_chain() {
        let mut m = Message::stub(RecordId(1));
        assert_eq!(body_text(&m), NO_CONTENT);

        m.content_excerpt = Some("excerpt".into());
        assert_eq!(body_text(&m), "excerpt");

        m.body.rich = Some("<b>rich</b>".into());
        assert_eq!(body_text(&m), "rich");

        m.body.parsed = Some("parsed".into());
        assert_eq!(body_text(&m), "parsed");

        m.body.plain = Some("plain".into());
        assert_eq!(body_text(&m), "plain");
    }

    #[test]
    fn test_tags_only_rich_body_falls_through() {
        let mut m = Message::stub(RecordId(1));
        m.body.rich = Some("<p></p>".into());
        m.content_excerpt = Some("fallback".into());
        assert_eq!(body_text(&m), "fallback");
    }

    #[test]
    fn test_timestamp_display() {
        assert_eq!(
            format_timestamp("2025/03/04 05:06:07 +0000"),
            "2025-03-04 05:06:07 UTC"
        );
        // Offset input displays in UTC.
        assert_eq!(
            format_timestamp("2025/03/04 05:06:07 +0100"),
            "2025-03-04 04:06:07 UTC"
        );
        // Unparseable input falls back to the raw string.
        assert_eq!(format_timestamp("bogus"), "bogus");
    }
}
