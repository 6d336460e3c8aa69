//! Activity-provider surface exposed to the host task system.
//!
//! Five activities: `validate`, `sendMessage`, `updateMessage`,
//! `waitForMessage` and `deleteMessage`. Each has a typed method and is also
//! reachable by name through [`TelegramActivities::invoke`], which takes and
//! returns JSON in the host's camelCase shape.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::events::EventRegistry;
use crate::gateway::{Gateway, TextFormat};
use crate::messaging::{
    FileAttachment, Messenger, MessagingError, OutgoingMessage, Reply, SentMessage,
};
use crate::validation::{ValidationRequest, ValidationSettings, Validator, Verdict};

/// Activity names accepted by [`TelegramActivities::invoke`].
pub const ACTIVITY_NAMES: [&str; 5] = [
    "validate",
    "sendMessage",
    "updateMessage",
    "waitForMessage",
    "deleteMessage",
];

/// Errors returned to the host.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    /// Unknown activity name or malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A messaging side effect failed.
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

#[derive(Debug, Deserialize)]
struct SendMessageInput {
    message: String,
    #[serde(default)]
    file: Option<FileAttachment>,
    userid: i64,
    /// Milliseconds; zero or absent disables the timed delete.
    #[serde(rename = "deleteTimeout", default)]
    delete_timeout: Option<u64>,
    #[serde(default)]
    pin: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UpdateMessageInput {
    message: String,
    userid: i64,
    messageid: i32,
}

#[derive(Debug, Deserialize)]
struct WaitForMessageInput {
    userid: i64,
}

#[derive(Debug, Deserialize)]
struct DeleteMessageInput {
    messageid: i32,
    userid: i64,
}

fn parse_input<T: serde::de::DeserializeOwned>(activity: &str, input: Value) -> Result<T, ActivityError> {
    serde_json::from_value(input)
        .map_err(|e| ActivityError::InvalidInput(format!("{activity}: {e}")))
}

/// Telegram-backed activity provider.
pub struct TelegramActivities {
    validator: Validator,
    messenger: Messenger,
}

impl TelegramActivities {
    /// Build the provider from configuration.
    pub fn new(gateway: Arc<dyn Gateway>, registry: Arc<EventRegistry>, config: &Config) -> Self {
        Self::with_settings(
            gateway,
            registry,
            config.validation.settings(),
            config.telegram.parse_mode.into(),
        )
    }

    /// Build the provider from explicit settings.
    pub fn with_settings(
        gateway: Arc<dyn Gateway>,
        registry: Arc<EventRegistry>,
        settings: ValidationSettings,
        rich_format: TextFormat,
    ) -> Self {
        Self {
            validator: Validator::new(Arc::clone(&gateway), Arc::clone(&registry), settings),
            messenger: Messenger::new(gateway, registry, rich_format),
        }
    }

    /// Ask the user to pick a button.
    pub async fn validate(&self, request: ValidationRequest) -> Verdict {
        self.validator.validate(request).await
    }

    /// Send a text message with optional pin, timed delete and attachment.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::Messaging`] if a requested pin fails.
    pub async fn send_message(&self, message: OutgoingMessage) -> Result<SentMessage, ActivityError> {
        Ok(self.messenger.send_message(message).await?)
    }

    /// Edit a message in place, best-effort.
    pub async fn update_message(&self, user_id: i64, message_id: i32, text: &str) {
        self.messenger.update_message(user_id, message_id, text).await;
    }

    /// Wait for the user's next text or photo message.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::Messaging`] if a photo link cannot be resolved.
    pub async fn wait_for_message(&self, user_id: i64) -> Result<Reply, ActivityError> {
        Ok(self.messenger.wait_for_message(user_id).await?)
    }

    /// Delete a message, best-effort.
    pub async fn delete_message(&self, user_id: i64, message_id: i32) {
        self.messenger.delete_message(user_id, message_id).await;
    }

    /// Run an activity by name with JSON input.
    ///
    /// Results: `validate` returns the chosen button string, `sendMessage`
    /// the message id (`-1` when none), `waitForMessage` `{"text": ...}` or
    /// `{"imageURL": ...}`, the others `null`.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::InvalidInput`] for unknown activities or
    /// input that does not deserialize, and propagates activity errors.
    pub async fn invoke(&self, activity: &str, input: Value) -> Result<Value, ActivityError> {
        debug!(activity, "activity invoked");
        match activity {
            "validate" => {
                let request: ValidationRequest = parse_input(activity, input)?;
                let verdict = self.validate(request).await;
                Ok(Value::String(verdict.choice))
            }
            "sendMessage" => {
                let input: SendMessageInput = parse_input(activity, input)?;
                let message = OutgoingMessage {
                    user_id: input.userid,
                    text: input.message,
                    file: input.file,
                    delete_after: input
                        .delete_timeout
                        .filter(|ms| *ms > 0)
                        .map(Duration::from_millis),
                    pin: input.pin.unwrap_or(false),
                };
                let sent = self.send_message(message).await?;
                Ok(Value::from(sent.message_id))
            }
            "updateMessage" => {
                let input: UpdateMessageInput = parse_input(activity, input)?;
                self.update_message(input.userid, input.messageid, &input.message)
                    .await;
                Ok(Value::Null)
            }
            "waitForMessage" => {
                let input: WaitForMessageInput = parse_input(activity, input)?;
                let reply = self.wait_for_message(input.userid).await?;
                serde_json::to_value(reply).map_err(|e| {
                    ActivityError::InvalidInput(format!("failed to encode reply: {e}"))
                })
            }
            "deleteMessage" => {
                let input: DeleteMessageInput = parse_input(activity, input)?;
                self.delete_message(input.userid, input.messageid).await;
                Ok(Value::Null)
            }
            other => Err(ActivityError::InvalidInput(format!(
                "unknown activity: {other} (expected one of {})",
                ACTIVITY_NAMES.join(", ")
            ))),
        }
    }
}
