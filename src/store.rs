use anyhow::Result;
use chrono::NaiveDateTime;
use log::warn;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::models::{ALL_CATEGORIES, Subscriber};

/// Subscriber settings persisted in SQLite. This is the only state shared
/// between the interactive process and the polling worker, so both open the
/// same database file in WAL mode.
#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Private in-memory database; one connection, or every pool checkout
    /// would see a different empty database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                chat_id INTEGER PRIMARY KEY,
                categories TEXT NOT NULL DEFAULT '[]',
                exp_levels TEXT NOT NULL DEFAULT '[]',
                is_active INTEGER NOT NULL DEFAULT 1,
                last_job_link TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Idempotent: called on every first interaction with a chat.
    pub async fn ensure(&self, chat_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO subscribers (chat_id) VALUES (?)")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get(&self, chat_id: i64) -> Result<Option<Subscriber>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM subscribers WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(map_subscriber))
    }

    pub async fn save_categories(&self, chat_id: i64, categories: &[String]) -> Result<(), sqlx::Error> {
        let normalized = normalize_categories(categories);
        let payload = serde_json::to_string(&normalized).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            r#"
            INSERT INTO subscribers (chat_id, categories, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(chat_id) DO UPDATE SET
                categories = excluded.categories,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(chat_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_exp_levels(&self, chat_id: i64, exp_levels: &[String]) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_string(exp_levels).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            r#"
            INSERT INTO subscribers (chat_id, exp_levels, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(chat_id) DO UPDATE SET
                exp_levels = excluded.exp_levels,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(chat_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_active(&self, chat_id: i64, is_active: bool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE subscribers SET is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE chat_id = ?")
            .bind(is_active)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_watermark(&self, chat_id: i64, link: Option<&str>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE subscribers SET last_job_link = ?, updated_at = CURRENT_TIMESTAMP WHERE chat_id = ?")
            .bind(link)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Active subscribers with at least one category filter: the only ones
    /// included in scheduled polling.
    pub async fn list_configured(&self) -> Result<Vec<Subscriber>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM subscribers WHERE is_active = 1 AND categories <> '[]'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(map_subscriber)
            .filter(|sub| !sub.categories.is_empty())
            .collect())
    }
}

fn map_subscriber(row: SqliteRow) -> Subscriber {
    Subscriber {
        chat_id: row.get("chat_id"),
        categories: parse_filter_column(row.get("categories")),
        exp_levels: parse_filter_column(row.get("exp_levels")),
        is_active: row.get("is_active"),
        last_job_link: row.get("last_job_link"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<NaiveDateTime, _>("updated_at").and_utc(),
    }
}

/// Filter columns are JSON arrays of strings; anything unreadable is treated
/// as an empty set rather than poisoning the whole row.
fn parse_filter_column(raw: String) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(values) => values.into_iter().filter(|v| !v.trim().is_empty()).collect(),
        Err(err) => {
            warn!("unreadable filter column {raw:?}: {err}");
            Vec::new()
        }
    }
}

/// Trim, drop empties, dedup keeping first occurrence. If the `all` sentinel
/// is present the whole set collapses to just the sentinel.
fn normalize_categories(categories: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for category in categories {
        let trimmed = category.trim();
        if trimmed.is_empty() || normalized.iter().any(|c| c == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_string());
    }
    if normalized.iter().any(|c| c == ALL_CATEGORIES) {
        return vec![ALL_CATEGORIES.to_string()];
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_normalization() {
        let input = vec![" Rust ".to_string(), "".to_string(), "Rust".to_string(), "Go".to_string()];
        assert_eq!(normalize_categories(&input), vec!["Rust", "Go"]);

        let with_all = vec!["Rust".to_string(), ALL_CATEGORIES.to_string()];
        assert_eq!(normalize_categories(&with_all), vec![ALL_CATEGORIES]);
    }

    #[tokio::test]
    async fn ensure_is_idempotent_and_defaults_apply() {
        let store = SettingsStore::open_in_memory().await.unwrap();
        store.ensure(7).await.unwrap();
        store.ensure(7).await.unwrap();

        let sub = store.get(7).await.unwrap().unwrap();
        assert_eq!(sub.chat_id, 7);
        assert!(sub.is_active);
        assert!(sub.categories.is_empty());
        assert!(sub.exp_levels.is_empty());
        assert!(sub.last_job_link.is_none());
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_chat() {
        let store = SettingsStore::open_in_memory().await.unwrap();
        assert!(store.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filters_and_watermark_round_trip() {
        let store = SettingsStore::open_in_memory().await.unwrap();
        store.ensure(1).await.unwrap();
        store.save_categories(1, &["Rust".to_string(), "Go".to_string()]).await.unwrap();
        store.save_exp_levels(1, &["1y".to_string()]).await.unwrap();
        store.set_watermark(1, Some("https://e.com/jobs/42")).await.unwrap();

        let sub = store.get(1).await.unwrap().unwrap();
        assert_eq!(sub.categories, vec!["Rust", "Go"]);
        assert_eq!(sub.exp_levels, vec!["1y"]);
        assert_eq!(sub.last_job_link.as_deref(), Some("https://e.com/jobs/42"));

        store.set_watermark(1, None).await.unwrap();
        assert!(store.get(1).await.unwrap().unwrap().last_job_link.is_none());
    }

    #[tokio::test]
    async fn save_upserts_without_prior_ensure() {
        let store = SettingsStore::open_in_memory().await.unwrap();
        store.save_categories(5, &[ALL_CATEGORIES.to_string()]).await.unwrap();
        let sub = store.get(5).await.unwrap().unwrap();
        assert_eq!(sub.categories, vec![ALL_CATEGORIES]);
    }

    #[tokio::test]
    async fn list_configured_skips_paused_and_unconfigured() {
        let store = SettingsStore::open_in_memory().await.unwrap();

        store.save_categories(1, &["Rust".to_string()]).await.unwrap();

        store.ensure(2).await.unwrap(); // no categories

        store.save_categories(3, &["Go".to_string()]).await.unwrap();
        store.set_active(3, false).await.unwrap(); // paused

        let configured = store.list_configured().await.unwrap();
        let ids: Vec<_> = configured.iter().map(|s| s.chat_id).collect();
        assert_eq!(ids, vec![1]);
    }
}
