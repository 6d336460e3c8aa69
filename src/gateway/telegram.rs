//! teloxide-backed gateway and update dispatcher.
//!
//! [`TelegramGateway`] maps the [`Gateway`] primitives onto Bot API calls.
//! [`run_dispatcher`] runs the long-polling loop and feeds inbound button
//! presses and messages into the [`EventRegistry`].

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto,
    MessageId as TgMessageId, ParseMode,
};
use teloxide::{ApiError, RequestError};
use tracing::{debug, info};
use url::Url;

use super::{ConversationId, Gateway, GatewayError, InlineKeyboard, MessageId, TextFormat};
use crate::events::{CallbackEvent, CallbackRouting, EventRegistry, InboundContent, InboundMessage};

/// [`Gateway`] over a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    /// Wrap an already configured bot.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn chat_id(chat: ConversationId) -> ChatId {
    ChatId(chat.0)
}

fn tg_message_id(message: MessageId) -> TgMessageId {
    TgMessageId(message.0)
}

fn markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
            .collect::<Vec<_>>()
    }))
}

fn parse_url(raw: &str) -> Result<Url, GatewayError> {
    Url::parse(raw).map_err(|e| GatewayError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })
}

/// Classify a teloxide error. Entity-parsing rejections become
/// [`GatewayError::Formatting`] so callers can tell them apart.
fn map_request_error(e: RequestError) -> GatewayError {
    match e {
        RequestError::Api(ApiError::CantParseEntities(reason)) => GatewayError::Formatting(reason),
        RequestError::Api(api) => GatewayError::Api(api.to_string()),
        RequestError::Network(net) => GatewayError::Network(net.to_string()),
        other => GatewayError::Api(other.to_string()),
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn send_message(
        &self,
        chat: ConversationId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, GatewayError> {
        let mut req = self.bot.send_message(chat_id(chat), text);
        match format {
            TextFormat::Plain => {}
            TextFormat::Html => req = req.parse_mode(ParseMode::Html),
            TextFormat::MarkdownV2 => req = req.parse_mode(ParseMode::MarkdownV2),
        }
        if let Some(kb) = keyboard {
            req = req.reply_markup(markup(kb));
        }

        let msg = req.await.map_err(map_request_error)?;
        Ok(MessageId(msg.id.0))
    }

    async fn send_photo(
        &self,
        chat: ConversationId,
        image_url: &str,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, GatewayError> {
        let url = parse_url(image_url)?;
        let mut req = self.bot.send_photo(chat_id(chat), InputFile::url(url));
        if let Some(text) = caption {
            req = req.caption(text);
        }
        if let Some(kb) = keyboard {
            req = req.reply_markup(markup(kb));
        }

        let msg = req.await.map_err(map_request_error)?;
        Ok(MessageId(msg.id.0))
    }

    async fn send_media_group(
        &self,
        chat: ConversationId,
        image_urls: &[String],
    ) -> Result<Vec<MessageId>, GatewayError> {
        let media = image_urls
            .iter()
            .map(|raw| {
                parse_url(raw).map(|url| InputMedia::Photo(InputMediaPhoto::new(InputFile::url(url))))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let messages = self
            .bot
            .send_media_group(chat_id(chat), media)
            .await
            .map_err(map_request_error)?;
        Ok(messages.iter().map(|m| MessageId(m.id.0)).collect())
    }

    async fn send_document(
        &self,
        chat: ConversationId,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<MessageId, GatewayError> {
        // In-memory uploads go out as application/octet-stream.
        let file = InputFile::memory(bytes).file_name(file_name.to_owned());
        let msg = self
            .bot
            .send_document(chat_id(chat), file)
            .await
            .map_err(map_request_error)?;
        Ok(MessageId(msg.id.0))
    }

    async fn edit_message_text(
        &self,
        chat: ConversationId,
        message: MessageId,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.bot
            .edit_message_text(chat_id(chat), tg_message_id(message), text)
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn delete_message(
        &self,
        chat: ConversationId,
        message: MessageId,
    ) -> Result<(), GatewayError> {
        self.bot
            .delete_message(chat_id(chat), tg_message_id(message))
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn pin_message(
        &self,
        chat: ConversationId,
        message: MessageId,
    ) -> Result<(), GatewayError> {
        self.bot
            .pin_chat_message(chat_id(chat), tg_message_id(message))
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn answer_callback(&self, event_id: &str, text: &str) -> Result<(), GatewayError> {
        self.bot
            .answer_callback_query(event_id.to_owned())
            .text(text)
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn file_link(&self, file_id: &str) -> Result<String, GatewayError> {
        let file = self
            .bot
            .get_file(file_id.to_owned())
            .await
            .map_err(map_request_error)?;
        let api = self.bot.api_url();
        Ok(format!(
            "{}/file/bot{}/{}",
            api.as_str().trim_end_matches('/'),
            self.bot.token(),
            file.path
        ))
    }
}

// ---------------------------------------------------------------------------
// Inbound dispatch
// ---------------------------------------------------------------------------

/// Run the long-polling dispatcher until Ctrl+C.
///
/// Button presses and text/photo messages are routed through `registry`.
/// Presses that match no armed prompt are answered without text so the
/// client stops its loading indicator.
pub async fn run_dispatcher(bot: Bot, registry: Arc<EventRegistry>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    info!("telegram dispatcher starting");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![registry])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, registry: Arc<EventRegistry>) -> ResponseResult<()> {
    let content = if let Some(text) = msg.text() {
        InboundContent::Text(text.to_owned())
    } else if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        // Sizes are ascending; the last one is the original resolution.
        InboundContent::Photo {
            file_id: photo.file.id.clone(),
        }
    } else {
        InboundContent::Other
    };

    let conversation = ConversationId(msg.chat.id.0);
    let delivered = registry.dispatch_message(InboundMessage {
        conversation,
        content,
    });
    debug!(user_id = conversation.0, delivered, "telegram message received");

    Ok(())
}

async fn handle_callback(
    bot: Bot,
    query: CallbackQuery,
    registry: Arc<EventRegistry>,
) -> ResponseResult<()> {
    let event = match (query.message.as_ref(), query.data.as_ref()) {
        (Some(message), Some(data)) => CallbackEvent {
            conversation: ConversationId(message.chat().id.0),
            message: MessageId(message.id().0),
            button: data.clone(),
            event_id: query.id.clone(),
        },
        _ => {
            bot.answer_callback_query(query.id.clone()).await?;
            return Ok(());
        }
    };

    let user_id = event.conversation.0;
    let message_id = event.message.0;
    match registry.dispatch_callback(event) {
        CallbackRouting::Delivered => {
            debug!(user_id, message_id, "callback delivered to prompt");
        }
        CallbackRouting::Held => {
            debug!(user_id, message_id, "callback held for a prompt being sent");
        }
        routing => {
            debug!(user_id, message_id, ?routing, "callback not consumed");
            bot.answer_callback_query(query.id.clone()).await?;
        }
    }

    Ok(())
}
