//! Interactive button validation.
//!
//! A validation renders a prompt, arms it in the [`EventRegistry`], and
//! waits for the first press of one of its buttons. On a press the callback
//! is acknowledged, every prompt message is deleted, and the pressed button
//! is returned. Send failures, timeouts and abandoned prompts all resolve to
//! [`STOP`]; a validation never returns an error.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::events::{CallbackEvent, EventRegistry};
use crate::gateway::{ConversationId, Gateway};
use crate::render::{delete_messages, render, PromptPlan, RenderedPrompt, MAX_MEDIA_GROUP};

/// Choice returned whenever a validation ends without a button press.
pub const STOP: &str = "stop";

/// Buttons used when a request names none.
pub const DEFAULT_BUTTONS: [&str; 3] = ["like", "dislike", STOP];

/// Default prompt text when a request carries none.
pub const DEFAULT_PROMPT_TEXT: &str = "What do you choose?";

/// Image payload of a request: one URL or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    /// A single image URL.
    One(String),
    /// Several image URLs, rendered as a media group.
    Many(Vec<String>),
}

impl ImageSource {
    /// Flatten into a list of URLs. Blank entries are dropped, so an empty
    /// `imageUrl` yields a text prompt.
    pub fn into_urls(self) -> Vec<String> {
        let urls = match self {
            Self::One(url) => vec![url],
            Self::Many(urls) => urls,
        };
        urls.into_iter()
            .filter(|url| !url.trim().is_empty())
            .collect()
    }
}

/// A request to have a user pick one of several buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ValidationRequest {
    /// Image(s) to show.
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<ImageSource>,
    /// Prompt text.
    #[serde(default)]
    pub text: Option<String>,
    /// Conversation to prompt in.
    #[serde(rename = "userid", alias = "userId")]
    pub user_id: i64,
    /// Button ids; each is both caption and callback token.
    #[serde(default)]
    pub buttons: Option<Vec<String>>,
}

impl ValidationRequest {
    /// Buttons to render, falling back to [`DEFAULT_BUTTONS`] when none are given.
    pub fn effective_buttons(&self) -> Vec<String> {
        match self.buttons {
            Some(ref b) if !b.is_empty() => b.clone(),
            _ => DEFAULT_BUTTONS.iter().map(|b| (*b).to_owned()).collect(),
        }
    }
}

/// How a validation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The user pressed one of the request's buttons.
    Chosen,
    /// Sending the prompt failed.
    SendFailed,
    /// No press arrived within the configured timeout.
    TimedOut,
    /// The armed prompt was dropped from the registry.
    Abandoned,
}

/// Result of a validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Pressed button, or [`STOP`].
    pub choice: String,
    /// Which path produced the choice.
    pub resolution: Resolution,
}

impl Verdict {
    fn chosen(button: String) -> Self {
        Self {
            choice: button,
            resolution: Resolution::Chosen,
        }
    }

    fn stop(resolution: Resolution) -> Self {
        Self {
            choice: STOP.to_owned(),
            resolution,
        }
    }

    /// Whether the choice is [`STOP`].
    pub fn is_stop(&self) -> bool {
        self.choice == STOP
    }
}

/// Tunables for validations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSettings {
    /// Text used when a request carries none.
    pub default_text: String,
    /// Give up and resolve [`STOP`] after this long. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Photos rendered per media group.
    pub max_media: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            default_text: DEFAULT_PROMPT_TEXT.to_owned(),
            timeout: None,
            max_media: MAX_MEDIA_GROUP,
        }
    }
}

/// Runs validations against a gateway.
pub struct Validator {
    gateway: Arc<dyn Gateway>,
    registry: Arc<EventRegistry>,
    settings: ValidationSettings,
}

impl Validator {
    /// Create a validator.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        registry: Arc<EventRegistry>,
        settings: ValidationSettings,
    ) -> Self {
        Self {
            gateway,
            registry,
            settings,
        }
    }

    /// Present `request` and wait for the user's choice.
    ///
    /// The conversation is reserved in the registry before anything is sent,
    /// so a press that arrives between the keyboard send completing and the
    /// prompt arming is held and replayed rather than dropped.
    pub async fn validate(&self, request: ValidationRequest) -> Verdict {
        let chat = ConversationId(request.user_id);
        let buttons = request.effective_buttons();
        let images = request
            .image_url
            .map(ImageSource::into_urls)
            .unwrap_or_default();
        let plan = PromptPlan::build(
            &images,
            request.text.as_deref(),
            &buttons,
            &self.settings.default_text,
            self.settings.max_media,
        );

        let reservation = self.registry.reserve(chat);
        let rendered = match render(&*self.gateway, chat, &plan).await {
            Ok(r) => r,
            Err(e) => {
                warn!(user_id = chat.0, error = %e, "failed to send validation prompt");
                return Verdict::stop(Resolution::SendFailed);
            }
        };

        let mut rx = reservation.arm(rendered.keyboard_message, buttons);
        info!(
            user_id = chat.0,
            message_id = rendered.keyboard_message.0,
            media = rendered.media_messages.len(),
            "validation prompt armed"
        );

        let received = match self.settings.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, &mut rx).await;
                match waited {
                    Ok(result) => result,
                    Err(_) => return self.expire(chat, &rendered, rx).await,
                }
            }
            None => rx.await,
        };

        match received {
            Ok(event) => self.resolve(chat, &rendered, event).await,
            Err(_) => {
                warn!(
                    user_id = chat.0,
                    message_id = rendered.keyboard_message.0,
                    "validation prompt abandoned"
                );
                self.registry.disarm(chat, rendered.keyboard_message);
                Verdict::stop(Resolution::Abandoned)
            }
        }
    }

    /// Acknowledge the press, tear down the prompt, and report the button.
    async fn resolve(
        &self,
        chat: ConversationId,
        rendered: &RenderedPrompt,
        event: CallbackEvent,
    ) -> Verdict {
        let ack = format!("You chose {}!", event.button);
        if let Err(e) = self.gateway.answer_callback(&event.event_id, &ack).await {
            debug!(error = %e, "failed to acknowledge callback");
        }

        let messages = rendered.all_messages();
        let deleted = delete_messages(&*self.gateway, chat, &messages).await;
        info!(
            user_id = chat.0,
            button = %event.button,
            deleted,
            targeted = messages.len(),
            "validation resolved"
        );

        Verdict::chosen(event.button)
    }

    /// Detach a prompt whose timeout elapsed and clear its messages.
    async fn expire(
        &self,
        chat: ConversationId,
        rendered: &RenderedPrompt,
        mut rx: oneshot::Receiver<CallbackEvent>,
    ) -> Verdict {
        self.registry.disarm(chat, rendered.keyboard_message);

        // A press may have been delivered between the deadline and the disarm.
        if let Ok(event) = rx.try_recv() {
            return self.resolve(chat, rendered, event).await;
        }

        info!(
            user_id = chat.0,
            message_id = rendered.keyboard_message.0,
            "validation prompt timed out"
        );
        delete_messages(&*self.gateway, chat, &rendered.all_messages()).await;
        Verdict::stop(Resolution::TimedOut)
    }
}
