//! Inbound event correlation.
//!
//! The [`EventRegistry`] is the single place inbound gateway events are
//! routed to waiting activities. Button presses are correlated through a
//! table keyed by the `(conversation, message)` pair of the keyboard-bearing
//! message; a match is removed and fired inside one critical section, so a
//! press can resolve at most one prompt and each prompt resolves at most once.
//!
//! A prompt's keyboard message id is only known once the send returns, so
//! a press can reach the registry before the prompt is armed. Validations
//! take a [`PromptReservation`] before sending: while one is outstanding in
//! a conversation, presses with no armed prompt are held and replayed
//! against the prompt when it arms.
//!
//! Message waiters are kept per conversation and detached as soon as they
//! fire.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

use crate::gateway::{ConversationId, MessageId};

/// A button press on an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    /// Conversation the keyboard message lives in.
    pub conversation: ConversationId,
    /// Message carrying the pressed keyboard.
    pub message: MessageId,
    /// Callback token of the pressed button.
    pub button: String,
    /// Gateway id used to acknowledge the press.
    pub event_id: String,
}

/// Payload of an inbound user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundContent {
    /// Plain text message.
    Text(String),
    /// Photo message; `file_id` is the largest available size.
    Photo {
        /// Gateway file id of the highest-resolution variant.
        file_id: String,
    },
    /// Anything else (stickers, voice, service messages).
    Other,
}

/// An inbound message from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Conversation the message arrived in.
    pub conversation: ConversationId,
    /// Message payload.
    pub content: InboundContent,
}

/// What [`EventRegistry::dispatch_callback`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackRouting {
    /// Handed to the armed prompt, which is now detached.
    Delivered,
    /// A prompt is armed on that message but the button is not in its set.
    Ignored,
    /// No prompt is armed yet, but one is being sent in that conversation.
    /// The press is replayed when the prompt arms.
    Held,
    /// No live prompt is armed on that message.
    Unmatched,
}

struct ArmedPrompt {
    buttons: Vec<String>,
    tx: oneshot::Sender<CallbackEvent>,
}

#[derive(Default)]
struct HeldPresses {
    reservations: usize,
    events: Vec<CallbackEvent>,
}

/// An outstanding claim that a prompt is about to be armed in a conversation.
///
/// Dropping it releases the claim. Presses still held when the last claim
/// in a conversation is released are discarded.
pub struct PromptReservation<'a> {
    registry: &'a EventRegistry,
    conversation: ConversationId,
}

impl PromptReservation<'_> {
    /// Arm the reserved prompt on `message`, replaying held presses first.
    pub fn arm(self, message: MessageId, buttons: Vec<String>) -> oneshot::Receiver<CallbackEvent> {
        self.registry.arm(self.conversation, message, buttons)
    }
}

impl Drop for PromptReservation<'_> {
    fn drop(&mut self) {
        if let Ok(mut held) = self.registry.held.lock() {
            let released = match held.get_mut(&self.conversation) {
                Some(entry) => {
                    entry.reservations = entry.reservations.saturating_sub(1);
                    entry.reservations == 0
                }
                None => false,
            };
            if released {
                if let Some(entry) = held.remove(&self.conversation) {
                    if !entry.events.is_empty() {
                        debug!(
                            user_id = self.conversation.0,
                            discarded = entry.events.len(),
                            "held presses discarded"
                        );
                    }
                }
            }
        }
    }
}

/// Routes inbound button presses and messages to waiting activities.
///
/// Uses sync [`Mutex`]es since every critical section is short and never
/// awaits. When both are needed, `prompts` is locked before `held`.
#[derive(Default)]
pub struct EventRegistry {
    prompts: Mutex<HashMap<(ConversationId, MessageId), ArmedPrompt>>,
    held: Mutex<HashMap<ConversationId, HeldPresses>>,
    waiters: Mutex<HashMap<ConversationId, Vec<oneshot::Sender<InboundMessage>>>>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce that a prompt is about to be sent in `conversation`.
    ///
    /// Until the reservation is armed or dropped, presses in that
    /// conversation with no armed prompt are held instead of rejected.
    pub fn reserve(&self, conversation: ConversationId) -> PromptReservation<'_> {
        if let Ok(mut held) = self.held.lock() {
            let entry = held.entry(conversation).or_default();
            entry.reservations = entry.reservations.saturating_add(1);
        }
        PromptReservation {
            registry: self,
            conversation,
        }
    }

    /// Arm a prompt on the keyboard message `message`.
    ///
    /// The returned receiver yields the first press of a button in
    /// `buttons`, including one held while the prompt was being sent.
    /// Arming the same message twice replaces the earlier entry, whose
    /// receiver then observes a closed channel.
    pub fn arm(
        &self,
        conversation: ConversationId,
        message: MessageId,
        buttons: Vec<String>,
    ) -> oneshot::Receiver<CallbackEvent> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut prompts) = self.prompts.lock() {
            let replayed = self.take_held(conversation, message, &buttons);
            match replayed {
                Some(event) => {
                    prompts.remove(&(conversation, message));
                    debug!(
                        user_id = conversation.0,
                        message_id = message.0,
                        "held press replayed on arm"
                    );
                    // The receiver is still in hand, so this cannot fail.
                    let _ = tx.send(event);
                }
                None => {
                    prompts.insert((conversation, message), ArmedPrompt { buttons, tx });
                }
            }
        }
        debug!(user_id = conversation.0, message_id = message.0, "prompt armed");
        rx
    }

    /// Remove every held press on `message` and return the first one whose
    /// button is in `buttons`.
    fn take_held(
        &self,
        conversation: ConversationId,
        message: MessageId,
        buttons: &[String],
    ) -> Option<CallbackEvent> {
        let mut held = self.held.lock().ok()?;
        let entry = held.get_mut(&conversation)?;
        let (on_message, rest): (Vec<_>, Vec<_>) = entry
            .events
            .drain(..)
            .partition(|event| event.message == message);
        entry.events = rest;
        on_message
            .into_iter()
            .find(|event| buttons.iter().any(|b| *b == event.button))
    }

    /// Hold `event` if a prompt is being sent in its conversation.
    fn hold(&self, event: &CallbackEvent) -> bool {
        let Ok(mut held) = self.held.lock() else {
            return false;
        };
        match held.get_mut(&event.conversation) {
            Some(entry) if entry.reservations > 0 => {
                entry.events.push(event.clone());
                true
            }
            _ => false,
        }
    }

    /// Remove the prompt armed on `message`. Returns whether one was present.
    pub fn disarm(&self, conversation: ConversationId, message: MessageId) -> bool {
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.remove(&(conversation, message)).is_some(),
            Err(_) => false,
        }
    }

    /// Route a button press to the prompt armed on its message.
    pub fn dispatch_callback(&self, event: CallbackEvent) -> CallbackRouting {
        let key = (event.conversation, event.message);
        let armed = {
            let mut prompts = match self.prompts.lock() {
                Ok(p) => p,
                Err(_) => return CallbackRouting::Unmatched,
            };

            let state = prompts.get(&key).map(|entry| {
                let wanted = entry.buttons.iter().any(|b| *b == event.button);
                (entry.tx.is_closed(), wanted)
            });
            match state {
                None if self.hold(&event) => return CallbackRouting::Held,
                None => return CallbackRouting::Unmatched,
                Some((true, _)) => {
                    // Receiver gone: the awaiting validation was dropped.
                    prompts.remove(&key);
                    return CallbackRouting::Unmatched;
                }
                Some((false, false)) => return CallbackRouting::Ignored,
                Some((false, true)) => {}
            }

            match prompts.remove(&key) {
                Some(entry) => entry,
                None => return CallbackRouting::Unmatched,
            }
        };

        match armed.tx.send(event) {
            Ok(()) => CallbackRouting::Delivered,
            Err(_) => CallbackRouting::Unmatched,
        }
    }

    /// Register interest in the next text or photo message in `conversation`.
    pub fn wait_for_message(&self, conversation: ConversationId) -> oneshot::Receiver<InboundMessage> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.entry(conversation).or_default().push(tx);
        }
        rx
    }

    /// Deliver an inbound message to every waiter on its conversation.
    ///
    /// Only text and photo messages fire waiters. Returns the number of
    /// waiters that received the message.
    pub fn dispatch_message(&self, message: InboundMessage) -> usize {
        if matches!(message.content, InboundContent::Other) {
            return 0;
        }

        let senders = match self.waiters.lock() {
            Ok(mut waiters) => waiters.remove(&message.conversation).unwrap_or_default(),
            Err(_) => return 0,
        };

        senders
            .into_iter()
            .filter(|tx| !tx.is_closed())
            .filter_map(|tx| tx.send(message.clone()).ok())
            .count()
    }

    /// Number of prompts currently armed.
    pub fn armed_prompts(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Number of conversations with at least one message waiter.
    pub fn waiting_conversations(&self) -> usize {
        self.waiters.lock().map(|w| w.len()).unwrap_or(0)
    }
}
