use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value, json};

use super::super::transport::{ButtonAction, ChatId, Keyboard, MessageId, Transport};
use super::updates::{Update, parse_updates};
use crate::http::{RetryPolicy, post_json_with_retries};

const API_ROOT: &str = "https://api.telegram.org";
// Headroom on top of the long-poll timeout before the read is considered stuck.
const POLL_READ_SLACK: Duration = Duration::from_secs(10);

pub(crate) struct TelegramClient {
    base_url: String,
    token: String,
    policy: RetryPolicy,
}

impl TelegramClient {
    pub(crate) fn new(token: &str) -> Self {
        Self::with_base_url(format!("{API_ROOT}/bot{token}"), token)
    }

    pub(crate) fn with_base_url(base_url: impl Into<String>, token: &str) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.to_string(),
            policy: RetryPolicy {
                connect_timeout: Duration::from_secs(5),
                read_timeout: Duration::from_secs(15),
                attempts: 3,
                retry_delay: Duration::from_secs(1),
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub(crate) fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut payload = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        let policy = RetryPolicy {
            read_timeout: Duration::from_secs(timeout_secs) + POLL_READ_SLACK,
            attempts: 1,
            ..self.policy
        };
        let result = self.call_with("getUpdates", &payload, &policy)?;
        Ok(parse_updates(&result))
    }

    fn call(&self, method: &str, payload: &Value) -> Result<Value> {
        self.call_with(method, payload, &self.policy)
    }

    fn call_with(&self, method: &str, payload: &Value, policy: &RetryPolicy) -> Result<Value> {
        let url = format!("{}/{method}", self.base_url);
        let raw = post_json_with_retries(&url, &payload.to_string(), policy)
            .map_err(|err| anyhow!("{method} failed: {}", self.redact(&err)))?;
        parse_api_response(method, &raw)
    }

    fn redact(&self, message: &str) -> String {
        if self.token.is_empty() {
            return message.to_string();
        }
        message.replace(&self.token, "<token>")
    }
}

pub(crate) fn parse_api_response(method: &str, raw: &str) -> Result<Value> {
    let parsed: Value = serde_json::from_str(raw)
        .with_context(|| format!("{method} returned a non-JSON response"))?;
    if parsed.get("ok").and_then(Value::as_bool) != Some(true) {
        let description = parsed
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description");
        bail!("{method} rejected: {description}");
    }
    Ok(parsed.get("result").cloned().unwrap_or(Value::Null))
}

pub(crate) fn keyboard_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| match &button.action {
                    ButtonAction::Callback(data) => {
                        json!({ "text": button.text, "callback_data": data })
                    }
                    ButtonAction::Url(url) => json!({ "text": button.text, "url": url }),
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn with_keyboard(mut payload: Map<String, Value>, keyboard: Option<&Keyboard>) -> Value {
    if let Some(keyboard) = keyboard {
        payload.insert("reply_markup".to_string(), keyboard_markup(keyboard));
    }
    Value::Object(payload)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl Transport for TelegramClient {
    fn copy_file(
        &self,
        destination: ChatId,
        source_chat_id: ChatId,
        source_message_id: MessageId,
    ) -> Result<()> {
        let payload = json!({
            "chat_id": destination,
            "from_chat_id": source_chat_id,
            "message_id": source_message_id,
        });
        self.call("copyMessage", &payload)?;
        Ok(())
    }

    fn send_text(&self, chat: ChatId, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        let payload = object(json!({
            "chat_id": chat,
            "text": text,
            "disable_web_page_preview": true,
        }));
        self.call("sendMessage", &with_keyboard(payload, keyboard))?;
        Ok(())
    }

    fn send_photo(
        &self,
        chat: ChatId,
        photo: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let payload = object(json!({
            "chat_id": chat,
            "photo": photo,
            "caption": caption,
        }));
        self.call("sendPhoto", &with_keyboard(payload, keyboard))?;
        Ok(())
    }

    fn edit_text(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let payload = object(json!({
            "chat_id": chat,
            "message_id": message_id,
            "text": text,
            "disable_web_page_preview": true,
        }));
        self.call("editMessageText", &with_keyboard(payload, keyboard))?;
        Ok(())
    }

    fn edit_caption(
        &self,
        chat: ChatId,
        message_id: MessageId,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let payload = object(json!({
            "chat_id": chat,
            "message_id": message_id,
            "caption": caption,
        }));
        self.call("editMessageCaption", &with_keyboard(payload, keyboard))?;
        Ok(())
    }

    fn delete_message(&self, chat: ChatId, message_id: MessageId) -> Result<()> {
        let payload = json!({ "chat_id": chat, "message_id": message_id });
        self.call("deleteMessage", &payload)?;
        Ok(())
    }

    fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let payload = json!({ "callback_query_id": callback_id });
        self.call("answerCallbackQuery", &payload)?;
        Ok(())
    }
}
