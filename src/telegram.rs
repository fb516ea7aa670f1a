use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::error::SendError;

// Must exceed the getUpdates long-poll timeout.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(50);
pub const LONG_POLL_SECS: u64 = 30;

/// Outbound delivery seam. The dispatcher only needs this; the interactive
/// front end uses the full `TelegramApi`.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), SendError>;
}

/// Thin Telegram Bot API client. Messages go out with HTML parse mode and
/// link previews disabled; HTTP 403 means the chat blocked the bot.
#[derive(Clone)]
pub struct TelegramApi {
    client: Client,
    base: String,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

impl TelegramApi {
    pub fn new(token: &str) -> Result<Self> {
        let client = Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(Self { client, base: format!("https://api.telegram.org/bot{token}") })
    }

    pub async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        let response = self
            .client
            .post(format!("{}/sendMessage", self.base))
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "link_preview_options": { "is_disabled": true },
            }))
            .send()
            .await
            .map_err(|err| SendError::Transport(err.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::FORBIDDEN => Err(SendError::Unreachable),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SendError::Transport(format!("sendMessage returned {status}: {body}")))
            }
        }
    }

    /// Long-polls for updates past `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, SendError> {
        let response = self
            .client
            .post(format!("{}/getUpdates", self.base))
            .json(&json!({
                "offset": offset,
                "timeout": LONG_POLL_SECS,
                "allowed_updates": ["message"],
            }))
            .send()
            .await
            .map_err(|err| SendError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SendError::Transport(format!(
                "getUpdates returned {}",
                response.status()
            )));
        }

        let parsed: UpdatesResponse = response
            .json()
            .await
            .map_err(|err| SendError::Transport(err.to_string()))?;
        Ok(parsed.result)
    }
}

impl Notifier for TelegramApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        self.send(chat_id, text).await
    }
}
