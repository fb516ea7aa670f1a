use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel category meaning "subscribe to the unfiltered feed".
pub const ALL_CATEGORIES: &str = "all";

/// Experience-level filters understood by the remote feed, with display labels.
pub const EXP_LEVELS: &[(&str, &str)] = &[
    ("no_exp", "No experience"),
    ("1y", "1 year"),
    ("2y", "2 years"),
    ("3y", "3 years"),
    ("5y", "5+ years"),
];

pub fn is_exp_level(id: &str) -> bool {
    EXP_LEVELS.iter().any(|(key, _)| *key == id)
}

pub fn exp_label<'a>(id: &'a str) -> &'a str {
    EXP_LEVELS
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, label)| *label)
        .unwrap_or(id)
}

/// Canonical form of a listing link used for watermark comparison and dedup.
/// Raw links are only used for display and outbound hyperlinks.
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    trimmed.strip_suffix('/').unwrap_or(trimmed).to_string()
}

/// One feed entry, created fresh on every fetch and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub category: String,
    /// Plain-text summary, HTML already stripped.
    pub summary: String,
    /// Missing or unparsable dates stay `None` and sort as oldest.
    pub published_at: Option<DateTime<Utc>>,
}

impl JobItem {
    pub fn normalized_link(&self) -> String {
        normalize_link(&self.link)
    }

    pub fn sort_key(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// One subscriber, keyed by chat id. Persisted by the settings store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: i64,
    pub categories: Vec<String>,
    pub exp_levels: Vec<String>,
    pub is_active: bool,
    /// Watermark: normalized link of the most recently delivered (or primed) item.
    pub last_job_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscriber {
    /// Only configured subscribers take part in scheduled polling.
    pub fn is_configured(&self) -> bool {
        self.is_active && !self.categories.is_empty()
    }
}
