use anyhow::Result;

pub(crate) type UserId = i64;
pub(crate) type ChatId = i64;
pub(crate) type MessageId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ButtonAction {
    Callback(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Button {
    pub(crate) text: String,
    pub(crate) action: ButtonAction,
}

impl Button {
    pub(crate) fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub(crate) fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// Rows of inline buttons attached to a message.
pub(crate) type Keyboard = Vec<Vec<Button>>;

/// Chat network operations the bot needs. Every call is a single attempt from the
/// caller's point of view; any retrying happens inside the implementation.
pub(crate) trait Transport {
    /// Re-sends a previously received message (the file) into `destination`.
    fn copy_file(
        &self,
        destination: ChatId,
        source_chat_id: ChatId,
        source_message_id: MessageId,
    ) -> Result<()>;

    fn send_text(&self, chat: ChatId, text: &str, keyboard: Option<&Keyboard>) -> Result<()>;

    fn send_photo(
        &self,
        chat: ChatId,
        photo: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()>;

    fn edit_text(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()>;

    /// Same as `edit_text` for messages that carry a photo.
    fn edit_caption(
        &self,
        chat: ChatId,
        message_id: MessageId,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()>;

    fn delete_message(&self, chat: ChatId, message_id: MessageId) -> Result<()>;

    fn answer_callback(&self, callback_id: &str) -> Result<()>;
}
