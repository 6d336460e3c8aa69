//! In-memory [`Gateway`] that records every call and fails on demand.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use telegram_activities::gateway::{
    ConversationId, Gateway, GatewayError, InlineKeyboard, MessageId, TextFormat,
};

/// Operation kinds that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SendMessage,
    SendRichMessage,
    SendPhoto,
    SendMediaGroup,
    SendDocument,
    Edit,
    Delete,
    Pin,
    Answer,
    FileLink,
}

/// A recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SendMessage {
        chat: ConversationId,
        text: String,
        format: TextFormat,
        keyboard: Option<InlineKeyboard>,
        id: MessageId,
    },
    SendPhoto {
        chat: ConversationId,
        url: String,
        caption: Option<String>,
        keyboard: Option<InlineKeyboard>,
        id: MessageId,
    },
    SendMediaGroup {
        chat: ConversationId,
        urls: Vec<String>,
        ids: Vec<MessageId>,
    },
    SendDocument {
        chat: ConversationId,
        bytes: Vec<u8>,
        name: String,
    },
    Edit {
        chat: ConversationId,
        message: MessageId,
        text: String,
    },
    Delete {
        chat: ConversationId,
        message: MessageId,
    },
    Pin {
        chat: ConversationId,
        message: MessageId,
    },
    Answer {
        event_id: String,
        text: String,
    },
}

pub struct FakeGateway {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI32,
    failing: Mutex<HashSet<Op>>,
    failing_deletes: Mutex<HashSet<MessageId>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(100),
            failing: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
        }
    }

    /// Make every call of kind `op` fail.
    pub fn fail(&self, op: Op) {
        self.failing.lock().expect("lock").insert(op);
    }

    /// Make deleting `message` fail.
    pub fn fail_delete_of(&self, message: MessageId) {
        self.failing_deletes.lock().expect("lock").insert(message);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }

    /// Messages targeted for deletion, in call order (including failed ones).
    pub fn deleted(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Ids of every message created so far.
    pub fn created(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .flat_map(|c| match c {
                Call::SendMessage { id, .. } | Call::SendPhoto { id, .. } => vec![id],
                Call::SendMediaGroup { ids, .. } => ids,
                _ => Vec::new(),
            })
            .collect()
    }

    /// Id of the most recently created message.
    pub fn last_created(&self) -> MessageId {
        *self.created().last().expect("no message created")
    }

    /// Keyboard of the most recent message that carried one.
    pub fn last_keyboard(&self) -> InlineKeyboard {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|c| match c {
                Call::SendMessage { keyboard, .. } | Call::SendPhoto { keyboard, .. } => keyboard,
                _ => None,
            })
            .expect("no keyboard sent")
    }

    fn fails(&self, op: Op) -> bool {
        self.failing.lock().expect("lock").contains(&op)
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("lock").push(call);
    }

    fn allocate(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn api_error(op: Op) -> GatewayError {
        GatewayError::Api(format!("{op:?} failed"))
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn send_message(
        &self,
        chat: ConversationId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, GatewayError> {
        if format != TextFormat::Plain && self.fails(Op::SendRichMessage) {
            return Err(GatewayError::Formatting("can't parse entities".to_owned()));
        }
        if self.fails(Op::SendMessage) {
            return Err(Self::api_error(Op::SendMessage));
        }
        let id = self.allocate();
        self.record(Call::SendMessage {
            chat,
            text: text.to_owned(),
            format,
            keyboard: keyboard.cloned(),
            id,
        });
        Ok(id)
    }

    async fn send_photo(
        &self,
        chat: ConversationId,
        image_url: &str,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, GatewayError> {
        if self.fails(Op::SendPhoto) {
            return Err(Self::api_error(Op::SendPhoto));
        }
        let id = self.allocate();
        self.record(Call::SendPhoto {
            chat,
            url: image_url.to_owned(),
            caption: caption.map(str::to_owned),
            keyboard: keyboard.cloned(),
            id,
        });
        Ok(id)
    }

    async fn send_media_group(
        &self,
        chat: ConversationId,
        image_urls: &[String],
    ) -> Result<Vec<MessageId>, GatewayError> {
        if self.fails(Op::SendMediaGroup) {
            return Err(Self::api_error(Op::SendMediaGroup));
        }
        let ids: Vec<MessageId> = image_urls.iter().map(|_| self.allocate()).collect();
        self.record(Call::SendMediaGroup {
            chat,
            urls: image_urls.to_vec(),
            ids: ids.clone(),
        });
        Ok(ids)
    }

    async fn send_document(
        &self,
        chat: ConversationId,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<MessageId, GatewayError> {
        if self.fails(Op::SendDocument) {
            return Err(Self::api_error(Op::SendDocument));
        }
        self.record(Call::SendDocument {
            chat,
            bytes,
            name: file_name.to_owned(),
        });
        Ok(self.allocate())
    }

    async fn edit_message_text(
        &self,
        chat: ConversationId,
        message: MessageId,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.record(Call::Edit {
            chat,
            message,
            text: text.to_owned(),
        });
        if self.fails(Op::Edit) {
            return Err(Self::api_error(Op::Edit));
        }
        Ok(())
    }

    async fn delete_message(
        &self,
        chat: ConversationId,
        message: MessageId,
    ) -> Result<(), GatewayError> {
        self.record(Call::Delete { chat, message });
        let targeted = self.failing_deletes.lock().expect("lock").contains(&message);
        if targeted || self.fails(Op::Delete) {
            return Err(Self::api_error(Op::Delete));
        }
        Ok(())
    }

    async fn pin_message(
        &self,
        chat: ConversationId,
        message: MessageId,
    ) -> Result<(), GatewayError> {
        self.record(Call::Pin { chat, message });
        if self.fails(Op::Pin) {
            return Err(Self::api_error(Op::Pin));
        }
        Ok(())
    }

    async fn answer_callback(&self, event_id: &str, text: &str) -> Result<(), GatewayError> {
        self.record(Call::Answer {
            event_id: event_id.to_owned(),
            text: text.to_owned(),
        });
        if self.fails(Op::Answer) {
            return Err(Self::api_error(Op::Answer));
        }
        Ok(())
    }

    async fn file_link(&self, file_id: &str) -> Result<String, GatewayError> {
        if self.fails(Op::FileLink) {
            return Err(Self::api_error(Op::FileLink));
        }
        Ok(format!("https://files.example/{file_id}"))
    }
}

/// Yield to spawned tasks until `cond` holds.
pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
