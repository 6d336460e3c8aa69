//! Messaging gateway seam.
//!
//! [`Gateway`] is the narrow set of bot primitives the activities need:
//! send/edit/delete/pin, media groups, documents, callback acknowledgement
//! and file-link resolution. [`telegram::TelegramGateway`] implements it over
//! teloxide; tests substitute an in-memory recorder.
//!
//! Inbound events do not flow through this trait. The update dispatcher in
//! [`telegram`] pushes them into an [`EventRegistry`](crate::events::EventRegistry).

use std::fmt;

use async_trait::async_trait;

pub mod telegram;

/// Numeric id of a single user's chat with the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text formatting requested for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    /// No parse mode; the text is shown verbatim.
    #[default]
    Plain,
    /// Telegram HTML parse mode.
    Html,
    /// Telegram MarkdownV2 parse mode.
    MarkdownV2,
}

/// One inline button. The label doubles as the callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardButton {
    /// Caption rendered on the button.
    pub label: String,
    /// Token returned verbatim in the callback event when pressed.
    pub callback_data: String,
}

impl KeyboardButton {
    /// Button whose caption and callback token are both `id`.
    pub fn labelled(id: &str) -> Self {
        Self {
            label: id.to_owned(),
            callback_data: id.to_owned(),
        }
    }
}

/// Inline keyboard attached to a message, as rows of buttons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineKeyboard {
    /// Button rows, top to bottom.
    pub rows: Vec<Vec<KeyboardButton>>,
}

impl InlineKeyboard {
    /// Callback tokens of every button, row-major.
    pub fn callback_tokens(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.callback_data.as_str())
            .collect()
    }
}

/// Errors reported by gateway calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The API rejected the message text under the requested parse mode.
    #[error("message formatting rejected: {0}")]
    Formatting(String),
    /// The API returned any other error response.
    #[error("telegram API error: {0}")]
    Api(String),
    /// Transport failure talking to the API.
    #[error("network error: {0}")]
    Network(String),
    /// A media URL could not be parsed.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
        /// Parser message.
        reason: String,
    },
}

impl GatewayError {
    /// Whether the failure is attributable to the requested parse mode.
    pub fn is_formatting(&self) -> bool {
        matches!(self, Self::Formatting(_))
    }
}

/// Outbound bot primitives used by the activities.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send a text message, optionally with an inline keyboard.
    async fn send_message(
        &self,
        chat: ConversationId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, GatewayError>;

    /// Send a photo by URL with an optional caption and keyboard.
    async fn send_photo(
        &self,
        chat: ConversationId,
        image_url: &str,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, GatewayError>;

    /// Send photos as one media group. Returns one id per photo, in order.
    async fn send_media_group(
        &self,
        chat: ConversationId,
        image_urls: &[String],
    ) -> Result<Vec<MessageId>, GatewayError>;

    /// Upload raw bytes as a generic binary document.
    async fn send_document(
        &self,
        chat: ConversationId,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<MessageId, GatewayError>;

    /// Replace the text of an existing message.
    async fn edit_message_text(
        &self,
        chat: ConversationId,
        message: MessageId,
        text: &str,
    ) -> Result<(), GatewayError>;

    /// Delete a message.
    async fn delete_message(
        &self,
        chat: ConversationId,
        message: MessageId,
    ) -> Result<(), GatewayError>;

    /// Pin a message in its chat.
    async fn pin_message(&self, chat: ConversationId, message: MessageId)
        -> Result<(), GatewayError>;

    /// Acknowledge a button press, showing `text` as a toast.
    async fn answer_callback(&self, event_id: &str, text: &str) -> Result<(), GatewayError>;

    /// Resolve a downloadable URL for an uploaded file.
    async fn file_link(&self, file_id: &str) -> Result<String, GatewayError>;
}
