//! Prompt rendering: message layout and inline keyboards for validations.
//!
//! A lone image (or plain text) goes out as one message with the keyboard
//! attached, one button per row. Several images go out as a media group,
//! which cannot carry buttons, followed by a separate keyboard message whose
//! first button sits alone on the top row and the rest are packed three per
//! row.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::gateway::{
    ConversationId, Gateway, GatewayError, InlineKeyboard, KeyboardButton, MessageId, TextFormat,
};

/// Platform limit on photos rendered per media group.
pub const MAX_MEDIA_GROUP: usize = 5;

/// Buttons per row after the first row of an album keyboard.
const ALBUM_ROW_WIDTH: usize = 3;

/// Outbound layout for one validation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPlan {
    /// Text message with the keyboard attached.
    Text {
        /// Prompt text.
        text: String,
        /// One button per row.
        keyboard: InlineKeyboard,
    },
    /// Single photo with the keyboard attached.
    Photo {
        /// Photo URL.
        url: String,
        /// Optional caption.
        caption: Option<String>,
        /// One button per row.
        keyboard: InlineKeyboard,
    },
    /// Media group followed by a separate keyboard message.
    Album {
        /// Photo URLs, at most the media group limit.
        urls: Vec<String>,
        /// Text of the keyboard message.
        text: String,
        /// First button alone, then rows of three.
        keyboard: InlineKeyboard,
    },
}

impl PromptPlan {
    /// Build the plan for a prompt.
    ///
    /// `images` beyond `max_media` are dropped. One image renders as a photo,
    /// none as text. `text` falls back to `default_text` wherever a message
    /// body is required.
    pub fn build(
        images: &[String],
        text: Option<&str>,
        buttons: &[String],
        default_text: &str,
        max_media: usize,
    ) -> Self {
        let images = &images[..images.len().min(max_media)];
        match images {
            [] => Self::Text {
                text: text.unwrap_or(default_text).to_owned(),
                keyboard: column_keyboard(buttons),
            },
            [url] => Self::Photo {
                url: url.clone(),
                caption: text.map(str::to_owned),
                keyboard: column_keyboard(buttons),
            },
            urls => Self::Album {
                urls: urls.to_vec(),
                text: text.unwrap_or(default_text).to_owned(),
                keyboard: album_keyboard(buttons),
            },
        }
    }

    /// Keyboard carried by the prompt.
    pub fn keyboard(&self) -> &InlineKeyboard {
        match self {
            Self::Text { keyboard, .. }
            | Self::Photo { keyboard, .. }
            | Self::Album { keyboard, .. } => keyboard,
        }
    }
}

/// One button per row, in order.
pub fn column_keyboard(buttons: &[String]) -> InlineKeyboard {
    InlineKeyboard {
        rows: buttons
            .iter()
            .map(|b| vec![KeyboardButton::labelled(b)])
            .collect(),
    }
}

/// First button alone on the top row, the rest three per row, in order.
pub fn album_keyboard(buttons: &[String]) -> InlineKeyboard {
    let Some((first, rest)) = buttons.split_first() else {
        return InlineKeyboard::default();
    };

    let mut rows = vec![vec![KeyboardButton::labelled(first)]];
    rows.extend(
        rest.chunks(ALBUM_ROW_WIDTH)
            .map(|chunk| chunk.iter().map(|b| KeyboardButton::labelled(b)).collect::<Vec<_>>()),
    );
    InlineKeyboard { rows }
}

/// Messages making up a rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// Message carrying the keyboard; callbacks are correlated against it.
    pub keyboard_message: MessageId,
    /// Media group messages, empty for single-message prompts.
    pub media_messages: Vec<MessageId>,
}

impl RenderedPrompt {
    /// Every message to delete when the prompt is torn down.
    pub fn all_messages(&self) -> Vec<MessageId> {
        let mut all = self.media_messages.clone();
        all.push(self.keyboard_message);
        all
    }
}

/// Send the messages described by `plan`.
///
/// If an album's keyboard message fails after the media group went out,
/// the media messages are deleted before the error is returned.
///
/// # Errors
///
/// Returns the first [`GatewayError`] from a send.
pub async fn render(
    gateway: &dyn Gateway,
    chat: ConversationId,
    plan: &PromptPlan,
) -> Result<RenderedPrompt, GatewayError> {
    match plan {
        PromptPlan::Text { text, keyboard } => {
            let id = gateway
                .send_message(chat, text, TextFormat::Plain, Some(keyboard))
                .await?;
            Ok(RenderedPrompt {
                keyboard_message: id,
                media_messages: Vec::new(),
            })
        }
        PromptPlan::Photo {
            url,
            caption,
            keyboard,
        } => {
            let id = gateway
                .send_photo(chat, url, caption.as_deref(), Some(keyboard))
                .await?;
            Ok(RenderedPrompt {
                keyboard_message: id,
                media_messages: Vec::new(),
            })
        }
        PromptPlan::Album {
            urls,
            text,
            keyboard,
        } => {
            let media = gateway.send_media_group(chat, urls).await?;
            debug!(user_id = chat.0, photos = media.len(), "media group sent");

            match gateway
                .send_message(chat, text, TextFormat::Plain, Some(keyboard))
                .await
            {
                Ok(id) => Ok(RenderedPrompt {
                    keyboard_message: id,
                    media_messages: media,
                }),
                Err(e) => {
                    delete_messages(gateway, chat, &media).await;
                    Err(e)
                }
            }
        }
    }
}

/// Delete `messages` concurrently. Each failure is logged and swallowed.
///
/// Returns the number of successful deletions.
pub async fn delete_messages(
    gateway: &dyn Gateway,
    chat: ConversationId,
    messages: &[MessageId],
) -> usize {
    let results = join_all(messages.iter().map(|&id| async move {
        let result = gateway.delete_message(chat, id).await;
        if let Err(ref e) = result {
            warn!(user_id = chat.0, message_id = id.0, error = %e, "failed to delete prompt message");
        }
        result
    }))
    .await;

    results.iter().filter(|r| r.is_ok()).count()
}
