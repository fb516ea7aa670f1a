//! Interactive front end: a long-polling command loop over the Telegram API.
//!
//! Filter edits go through the in-memory draft store and only hit the
//! settings store on an explicit save, which then re-primes the watermark so
//! the next poll starts from "now". Command failures are logged and answered
//! with a generic message; they never crash the loop.

use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use tokio::sync::watch;

use crate::aggregate::JobSource;
use crate::drafts::DraftStore;
use crate::models::{Subscriber, exp_label, is_exp_level};
use crate::render::escape_html;
use crate::scheduler::PollScheduler;
use crate::store::SettingsStore;
use crate::telegram::{Notifier, TelegramApi};

const HELP: &str = "\
<b>Job feed bot</b>\n\
/category &lt;name&gt; — toggle a category in your draft\n\
/category all | clear | save — edit and commit the category filter\n\
/experience &lt;level&gt; | clear | save — edit the experience filter\n\
/poll — check for new listings right now\n\
/pause, /resume — stop or restart notifications\n\
/status — show your current settings";

pub struct BotApp<J, N> {
    api: TelegramApi,
    store: SettingsStore,
    scheduler: PollScheduler<J, N>,
    drafts: DraftStore,
}

impl<J: JobSource, N: Notifier> BotApp<J, N> {
    pub fn new(api: TelegramApi, store: SettingsStore, scheduler: PollScheduler<J, N>) -> Self {
        Self { api, store, scheduler, drafts: DraftStore::new() }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("bot started");
        let mut offset = 0i64;
        loop {
            let updates = tokio::select! {
                result = self.api.get_updates(offset) => result,
                _ = shutdown.changed() => break,
            };
            let updates = match updates {
                Ok(updates) => updates,
                Err(err) => {
                    error!("get_updates failed: {err}");
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else { continue };
                let Some(text) = message.text else { continue };
                let chat_id = message.chat.id;
                if let Err(err) = self.handle_command(chat_id, text.trim()).await {
                    error!("command failed for chat {chat_id}: {err}");
                    let _ = self
                        .api
                        .send(chat_id, "Something went wrong, please try again later.")
                        .await;
                }
            }
        }
        info!("bot stopped");
        Ok(())
    }

    async fn handle_command(&self, chat_id: i64, text: &str) -> Result<()> {
        self.store.ensure(chat_id).await?;
        let mut parts = text.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        match command {
            "/start" => self.api.send(chat_id, HELP).await?,
            "/pause" => {
                self.store.set_active(chat_id, false).await?;
                self.api.send(chat_id, "Notifications paused.").await?;
            }
            "/resume" => {
                self.store.set_active(chat_id, true).await?;
                self.api.send(chat_id, "Notifications resumed.").await?;
            }
            "/poll" => {
                let sent = self.scheduler.poll_now(chat_id).await?;
                let reply = if sent == 0 {
                    "No new listings.".to_string()
                } else {
                    format!("Sent {sent} new listing(s).")
                };
                self.api.send(chat_id, &reply).await?;
            }
            "/status" => {
                let subscriber = self.store.get(chat_id).await?;
                self.api.send(chat_id, &status_text(subscriber.as_ref())).await?;
            }
            "/category" => self.handle_category(chat_id, &rest).await?,
            "/experience" => self.handle_experience(chat_id, &rest).await?,
            _ => self.api.send(chat_id, HELP).await?,
        }
        Ok(())
    }

    async fn handle_category(&self, chat_id: i64, args: &[&str]) -> Result<()> {
        let seed = self
            .store
            .get(chat_id)
            .await?
            .map(|s| s.categories)
            .unwrap_or_default();

        let reply = match args {
            [] => format!("Draft categories: {}", join_or_none(&self.drafts.category_draft(chat_id, &seed))),
            ["all"] => {
                self.drafts.select_all_categories(chat_id);
                "Draft set to all categories.".to_string()
            }
            ["clear"] => {
                self.drafts.clear_categories(chat_id);
                "Category draft cleared.".to_string()
            }
            ["save"] => {
                let categories = self.drafts.take_categories(chat_id, &seed);
                self.store.save_categories(chat_id, &categories).await?;
                // Start counting from "now" for the new selection.
                self.scheduler.prime(chat_id).await;
                if categories.is_empty() {
                    "Category filter removed; polling is off until you pick one.".to_string()
                } else {
                    format!("Saved categories: {}", join_or_none(&categories))
                }
            }
            parts => {
                let category = parts.join(" ");
                let added = self.drafts.toggle_category(chat_id, &seed, &category);
                let draft = self.drafts.category_draft(chat_id, &seed);
                format!(
                    "{} {}. Draft: {}. Use /category save to apply.",
                    if added { "Added" } else { "Removed" },
                    escape_html(&category),
                    join_or_none(&draft)
                )
            }
        };
        self.api.send(chat_id, &reply).await?;
        Ok(())
    }

    async fn handle_experience(&self, chat_id: i64, args: &[&str]) -> Result<()> {
        let seed = self
            .store
            .get(chat_id)
            .await?
            .map(|s| s.exp_levels)
            .unwrap_or_default();

        let reply = match args {
            [] => format!("Draft experience filter: {}", join_or_none(&self.drafts.exp_draft(chat_id, &seed))),
            ["clear"] => {
                self.drafts.clear_exp_levels(chat_id);
                "Experience draft cleared.".to_string()
            }
            ["save"] => {
                let levels = self.drafts.take_exp_levels(chat_id, &seed);
                self.store.save_exp_levels(chat_id, &levels).await?;
                self.scheduler.prime(chat_id).await;
                if levels.is_empty() {
                    "Experience filter disabled.".to_string()
                } else {
                    format!("Saved experience filter: {}", join_or_none(&levels))
                }
            }
            [level] if is_exp_level(level) => {
                let added = self.drafts.toggle_exp_level(chat_id, &seed, level);
                format!(
                    "{} {}. Use /experience save to apply.",
                    if added { "Added" } else { "Removed" },
                    exp_label(level)
                )
            }
            _ => format!(
                "Unknown level. Available: {}",
                crate::models::EXP_LEVELS
                    .iter()
                    .map(|(id, _)| *id)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        self.api.send(chat_id, &reply).await?;
        Ok(())
    }
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        escape_html(&values.join(", "))
    }
}

fn status_text(subscriber: Option<&Subscriber>) -> String {
    let Some(subscriber) = subscriber else {
        return "No settings yet. Send /start to begin.".to_string();
    };
    format!(
        "Active: {}\nCategories: {}\nExperience: {}",
        if subscriber.is_active { "yes" } else { "no" },
        join_or_none(&subscriber.categories),
        join_or_none(&subscriber.exp_levels),
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn status_summarizes_filters() {
        assert!(status_text(None).contains("/start"));

        let now = Utc::now();
        let subscriber = Subscriber {
            chat_id: 1,
            categories: vec!["Rust".into()],
            exp_levels: vec!["1y".into()],
            is_active: true,
            last_job_link: None,
            created_at: now,
            updated_at: now,
        };
        let text = status_text(Some(&subscriber));
        assert!(text.contains("Active: yes"));
        assert!(text.contains("Categories: Rust"));
        assert!(text.contains("Experience: 1y"));
    }

    #[test]
    fn join_escapes_markup() {
        assert_eq!(join_or_none(&[]), "none");
        assert_eq!(join_or_none(&["C<++>".to_string()]), "C&lt;++&gt;");
    }
}
