//! Minimal Telegram Bot API client: long polling, replies, callback answers
//! and document downloads.

pub mod types;

use anyhow::{anyhow, bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use types::*;

pub const API_BASE: &str = "https://api.telegram.org";

/// Extra time on top of the long-poll timeout before the HTTP request gives up
const TRANSPORT_SLACK: Duration = Duration::from_secs(15);

pub struct Bot {
    client: reqwest::Client,
    token: String,
    base: String,
}

impl Bot {
    pub fn new(token: impl Into<String>, poll_timeout: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout) + TRANSPORT_SLACK)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            token: token.into(),
            base: API_BASE.to_string(),
        })
    }

    pub fn method_url(&self, method: &str) -> String { format!("{}/bot{}/{method}", self.base, self.token) }

    pub fn file_url(&self, file_path: &str) -> String { format!("{}/file/bot{}/{file_path}", self.base, self.token) }

    async fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, payload: &P) -> Result<R> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request failed"))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| "Unable to read response".to_string());

        let envelope: ApiResponse<R> = serde_json::from_str(&body).map_err(|_| anyhow!("Telegram {method} failed ({status}): {body}"))?;

        match envelope {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { description, .. } => {
                let description = description.unwrap_or_else(|| status.to_string());
                bail!("Telegram {method} failed: {description}{}", hint(&description))
            }
        }
    }

    pub async fn get_updates(&self, offset: Option<i64>, timeout: u64) -> Result<Vec<Update>> {
        let payload = GetUpdates {
            offset,
            timeout,
            allowed_updates: &["message", "callback_query"],
        };
        self.call("getUpdates", &payload).await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str, parse_mode: Option<&str>, reply_markup: Option<&InlineKeyboardMarkup>) -> Result<()> {
        let payload = SendMessage {
            chat_id,
            text,
            parse_mode,
            reply_markup,
        };
        self.call::<_, serde_json::Value>("sendMessage", &payload).await.map(|_| ())
    }

    pub async fn answer_callback(&self, callback_query_id: &str, text: Option<&str>) -> Result<()> {
        let payload = AnswerCallback { callback_query_id, text };
        self.call::<_, bool>("answerCallbackQuery", &payload).await.map(|_| ())
    }

    /// Download the document `file_id` to `dest`, replacing any earlier upload there
    pub async fn download(&self, file_id: &str, dest: &Path) -> Result<PathBuf> {
        let file: File = self.call("getFile", &GetFile { file_id }).await?;
        let remote = file.file_path.ok_or_else(|| anyhow!("Telegram returned no path for file {}", file.file_id))?;

        let response = self
            .client
            .get(self.file_url(&remote))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to download {remote}"))?;
        let bytes = response.bytes().await.context("failed to read download body")?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(dest, &bytes).await.with_context(|| format!("failed to write {}", dest.display()))?;

        log::debug!("downloaded {} bytes to {}", bytes.len(), dest.display());
        Ok(dest.to_path_buf())
    }
}

fn hint(description: &str) -> &'static str {
    if description.contains("chat not found") {
        "\nHint: the operator must open a private chat with the bot first."
    } else if description.contains("Unauthorized") {
        "\nHint: Check the bot token is correct."
    } else if description.contains("Conflict") {
        "\nHint: another process is polling with the same token."
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let bot = Bot::new("123:abc", 30).unwrap();
        assert_eq!(bot.method_url("getUpdates"), "https://api.telegram.org/bot123:abc/getUpdates");
        assert_eq!(bot.file_url("documents/file_1.py"), "https://api.telegram.org/file/bot123:abc/documents/file_1.py");
    }

    #[test]
    fn test_hints() {
        assert!(hint("Unauthorized").contains("token"));
        assert!(hint("Conflict: terminated by other getUpdates request").contains("polling"));
        assert_eq!(hint("Bad Request: message is too long"), "");
    }

    #[test]
    fn test_get_updates_payload() {
        let payload = GetUpdates {
            offset: None,
            timeout: 30,
            allowed_updates: &["message", "callback_query"],
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"timeout": 30, "allowed_updates": ["message", "callback_query"]})
        );
    }
}
