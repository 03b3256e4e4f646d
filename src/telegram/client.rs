use crate::telegram::types::{ApiResponse, InlineKeyboardMarkup, Update};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub type Result<T> = std::result::Result<T, TelegramError>;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Telegram rejected {method}: {description}")]
    Rejected { method: String, description: String },
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        TelegramError::Network(err.to_string())
    }
}

/// Minimal Bot API client covering what the bot uses
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        // Must outlive the getUpdates long-poll
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let endpoint = format!("{}/{}", self.base_url, method);

        let resp = self.client.post(&endpoint).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TelegramError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ApiResponse<T> = resp.json().await?;
        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(TelegramError::Rejected {
                method: method.to_string(),
                description: description.unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    /// Long-poll for updates newer than `offset`
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        let updates: Vec<Update> = self.call("getUpdates", &body).await?;
        debug!(count = updates.len(), "Received updates");
        Ok(updates)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = json!({ "chat_id": chat_id, "text": text });
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    pub async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: &str,
        reply_markup: &InlineKeyboardMarkup,
    ) -> Result<()> {
        let body = json!({
            "chat_id": chat_id,
            "photo": photo_url,
            "caption": caption,
            "reply_markup": reply_markup,
        });
        let _: serde_json::Value = self.call("sendPhoto", &body).await?;
        Ok(())
    }
}
