//! Pure text formatting for outgoing messages and feed summaries.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::JobItem;

const SNIPPET_MAX_CHARS: usize = 420;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static pattern"))
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Strip markup from a feed description: drop tags, decode the common
/// entities, collapse whitespace.
pub fn strip_html(input: &str) -> String {
    let without_tags = tag_regex().replace_all(input, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character-aware truncation with a trailing ellipsis.
pub fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn format_pub_date(published_at: Option<DateTime<Utc>>) -> String {
    match published_at {
        Some(date) => date.format("%Y-%m-%d %H:%M").to_string(),
        None => "no date".to_string(),
    }
}

/// One listing rendered for delivery: bold title, category, date, snippet,
/// hyperlink. The bot sends this with HTML parse mode.
pub fn format_job_message(item: &JobItem) -> String {
    let snippet = truncate(&item.summary, SNIPPET_MAX_CHARS);
    format!(
        "<b>{}</b>\nCategory: {}\nDate: {}\n\n{}\n\n<a href=\"{}\">Open listing</a>",
        escape_html(&item.title),
        escape_html(&item.category),
        escape_html(&format_pub_date(item.published_at)),
        escape_html(&snippet),
        escape_html(&item.link),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, summary: &str) -> JobItem {
        JobItem {
            id: "1".into(),
            title: title.into(),
            link: "https://example.com/jobs/1/".into(),
            category: "Rust".into(),
            summary: summary.into(),
            published_at: None,
        }
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_html(r#"<b>&"'"#), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn strips_tags_and_decodes_entities() {
        let input = "<p>Senior&nbsp;Rust</p><br/>engineer &amp; friends";
        assert_eq!(strip_html(input), "Senior Rust engineer & friends");
    }

    #[test]
    fn amp_is_decoded_last() {
        // "&amp;lt;" is a literal "<" escaped twice; it must not become "<".
        assert_eq!(strip_html("&amp;lt;"), "&lt;");
    }

    #[test]
    fn truncate_is_char_aware() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("абвгдеж", 5), "абвг…");
    }

    #[test]
    fn message_carries_title_and_link() {
        let text = format_job_message(&item("Rust <Dev>", "Build things"));
        assert!(text.starts_with("<b>Rust &lt;Dev&gt;</b>"));
        assert!(text.contains("Category: Rust"));
        assert!(text.contains("Date: no date"));
        assert!(text.contains(r#"<a href="https://example.com/jobs/1/">Open listing</a>"#));
    }
}
