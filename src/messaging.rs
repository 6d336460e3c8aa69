//! Plain messaging: send, edit, delete, and wait for the user's next message.
//!
//! Sends prefer rich formatting and quietly fall back to plain text; the
//! path taken is reported in [`SentMessage::formatting`]. Edits and deletes
//! are best-effort. Pinning is the one side effect whose failure is returned.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::events::{EventRegistry, InboundContent};
use crate::gateway::{ConversationId, Gateway, GatewayError, MessageId, TextFormat};

/// Message id reported when no text message was produced.
pub const NO_MESSAGE: i32 = -1;

/// Errors surfaced by plain messaging.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// Pinning was requested and the gateway refused it.
    #[error("failed to pin message: {0}")]
    Pin(#[source] GatewayError),
    /// Pinning was requested but no message was sent.
    #[error("nothing to pin: the message was not sent")]
    NothingToPin,
    /// The photo's download link could not be resolved.
    #[error("failed to resolve photo link: {0}")]
    FileLink(#[source] GatewayError),
    /// The event registry dropped the waiter.
    #[error("message waiter closed before a message arrived")]
    Closed,
}

/// Base64-encoded file sent after the text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileAttachment {
    /// File contents, standard base64 alphabet.
    pub base64: String,
    /// File name shown to the user.
    pub name: String,
}

/// A text message to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Conversation to send to.
    pub user_id: i64,
    /// Message text.
    pub text: String,
    /// Optional document sent after the text.
    pub file: Option<FileAttachment>,
    /// Delete the text message after this delay.
    pub delete_after: Option<Duration>,
    /// Pin the text message.
    pub pin: bool,
}

/// Formatting path a send ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatting {
    /// Sent with the configured rich parse mode.
    Rich,
    /// Rich send failed; sent as plain text.
    Plain,
    /// Both attempts failed; nothing was sent.
    Failed,
}

/// Outcome of [`Messenger::send_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    /// Id of the text message, or [`NO_MESSAGE`].
    pub message_id: i32,
    /// Formatting path taken.
    pub formatting: Formatting,
}

/// The user's next message, as returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Reply {
    /// A text message.
    #[serde(rename = "text")]
    Text(String),
    /// A photo, as a download URL of its largest size.
    #[serde(rename = "imageURL")]
    Image(String),
}

/// Plain messaging operations.
pub struct Messenger {
    gateway: Arc<dyn Gateway>,
    registry: Arc<EventRegistry>,
    rich_format: TextFormat,
}

impl Messenger {
    /// Create a messenger sending rich text with `rich_format`.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        registry: Arc<EventRegistry>,
        rich_format: TextFormat,
    ) -> Self {
        Self {
            gateway,
            registry,
            rich_format,
        }
    }

    /// Send a text message, then optionally pin it, schedule its deletion,
    /// and upload an attachment.
    ///
    /// # Errors
    ///
    /// Only pinning fails the call: [`MessagingError::Pin`] when the gateway
    /// refuses, [`MessagingError::NothingToPin`] when no message was sent.
    pub async fn send_message(&self, message: OutgoingMessage) -> Result<SentMessage, MessagingError> {
        let chat = ConversationId(message.user_id);
        let (sent, formatting) = self.send_text(chat, &message.text).await;

        if message.pin {
            let id = sent.ok_or(MessagingError::NothingToPin)?;
            self.gateway
                .pin_message(chat, id)
                .await
                .map_err(MessagingError::Pin)?;
        }

        if let (Some(delay), Some(id)) = (message.delete_after, sent) {
            self.schedule_delete(chat, id, delay);
        }

        if let Some(ref file) = message.file {
            self.send_attachment(chat, file).await;
        }

        Ok(SentMessage {
            message_id: sent.map_or(NO_MESSAGE, |id| id.0),
            formatting,
        })
    }

    async fn send_text(&self, chat: ConversationId, text: &str) -> (Option<MessageId>, Formatting) {
        let first = self
            .gateway
            .send_message(chat, text, self.rich_format, None)
            .await;
        let err = match first {
            Ok(id) => return (Some(id), Formatting::Rich),
            Err(e) => e,
        };

        if self.rich_format == TextFormat::Plain {
            warn!(user_id = chat.0, error = %err, "failed to send message");
            return (None, Formatting::Failed);
        }

        debug!(
            user_id = chat.0,
            error = %err,
            formatting = err.is_formatting(),
            "rich send failed, retrying as plain text"
        );
        match self
            .gateway
            .send_message(chat, text, TextFormat::Plain, None)
            .await
        {
            Ok(id) => (Some(id), Formatting::Plain),
            Err(e) => {
                warn!(user_id = chat.0, error = %e, "failed to send message as plain text");
                (None, Formatting::Failed)
            }
        }
    }

    fn schedule_delete(&self, chat: ConversationId, id: MessageId, delay: Duration) {
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = gateway.delete_message(chat, id).await {
                debug!(user_id = chat.0, message_id = id.0, error = %e, "timed delete failed");
            }
        });
    }

    async fn send_attachment(&self, chat: ConversationId, file: &FileAttachment) {
        let bytes = match base64::engine::general_purpose::STANDARD.decode(file.base64.trim()) {
            Ok(b) => b,
            Err(e) => {
                warn!(user_id = chat.0, file = %file.name, error = %e, "attachment is not valid base64");
                return;
            }
        };

        let size = bytes.len();
        match self.gateway.send_document(chat, bytes, &file.name).await {
            Ok(_) => info!(user_id = chat.0, file = %file.name, size, "attachment sent"),
            Err(e) => warn!(user_id = chat.0, file = %file.name, error = %e, "failed to send attachment"),
        }
    }

    /// Replace the text of a message. Failures are logged and swallowed.
    pub async fn update_message(&self, user_id: i64, message_id: i32, text: &str) {
        let chat = ConversationId(user_id);
        if let Err(e) = self
            .gateway
            .edit_message_text(chat, MessageId(message_id), text)
            .await
        {
            debug!(user_id, message_id, error = %e, "failed to edit message");
        }
    }

    /// Delete a message. Failures are logged and swallowed.
    pub async fn delete_message(&self, user_id: i64, message_id: i32) {
        let chat = ConversationId(user_id);
        if let Err(e) = self.gateway.delete_message(chat, MessageId(message_id)).await {
            debug!(user_id, message_id, error = %e, "failed to delete message");
        }
    }

    /// Wait for the next text or photo message from `user_id`.
    ///
    /// # Errors
    ///
    /// [`MessagingError::FileLink`] if a photo's URL cannot be resolved,
    /// [`MessagingError::Closed`] if the registry drops the waiter.
    pub async fn wait_for_message(&self, user_id: i64) -> Result<Reply, MessagingError> {
        let chat = ConversationId(user_id);
        loop {
            let inbound = self
                .registry
                .wait_for_message(chat)
                .await
                .map_err(|_| MessagingError::Closed)?;

            match inbound.content {
                InboundContent::Text(text) => return Ok(Reply::Text(text)),
                InboundContent::Photo { file_id } => {
                    let url = self
                        .gateway
                        .file_link(&file_id)
                        .await
                        .map_err(MessagingError::FileLink)?;
                    return Ok(Reply::Image(url));
                }
                InboundContent::Other => continue,
            }
        }
    }
}
