//! Chat session state: messages, the composer and the single in-flight turn.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::attachment::PendingAttachment;
use crate::gateway::{Citation, GatewayError, ModelReply};
use crate::location::LatLon;

pub const GREETING: &str = "Hola! Soy tu asistente de agronomía. ¿En qué puedo ayudarte hoy sobre \
                            el control de malezas en cereales? Puedes subir una foto de una maleza \
                            para identificarla.";
pub const ERROR_REPLY: &str = "Lo siento, ocurrió un error. Por favor, intenta de nuevo.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

/// Correlates a gateway reply with the send that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Bot,
}

impl Role {
    #[must_use]
    pub const fn wire_role(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePreview {
    pub uri: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: Option<String>,
    pub image: Option<ImagePreview>,
    pub citations: Vec<Citation>,
    /// The seeded greeting is shown but never sent as history.
    pub is_greeting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

/// Everything the gateway needs for one send.
#[derive(Debug, Clone)]
pub struct OutgoingTurn {
    pub turn: TurnId,
    /// Prior messages, computed before the new user message was appended.
    pub history: Vec<HistoryTurn>,
    pub text: Option<String>,
    pub attachment: Option<PendingAttachment>,
    pub location: Option<LatLon>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatPhase {
    Closed,
    OpenEmpty,
    OpenIdle,
    OpenSending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// First open: the greeting was seeded.
    Seeded,
    Reopened,
}

impl OpenOutcome {
    #[must_use]
    pub const fn needs_location(self) -> bool {
        matches!(self, OpenOutcome::Seeded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
    #[error("chat panel is closed")]
    Closed,
    #[error("nothing to send")]
    Empty,
    #[error("a reply is still pending")]
    Busy,
}

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
    input: String,
    attachment: Option<PendingAttachment>,
    attachment_error: Option<String>,
    location: Option<LatLon>,
    is_open: bool,
    in_flight: Option<TurnId>,
    next_message_id: u64,
    next_turn_id: u64,
}

impl Conversation {
    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&ConversationMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    #[must_use]
    pub fn attachment(&self) -> Option<&PendingAttachment> {
        self.attachment.as_ref()
    }

    /// Why the last picked image was not staged, until the next attach, clear or send.
    #[must_use]
    pub fn attachment_error(&self) -> Option<&str> {
        self.attachment_error.as_deref()
    }

    #[must_use]
    pub fn location(&self) -> Option<LatLon> {
        self.location
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub fn phase(&self) -> ChatPhase {
        let has_turns = self.messages.iter().any(|m| !m.is_greeting);
        match (self.is_open, has_turns, self.in_flight) {
            (false, _, _) => ChatPhase::Closed,
            (true, _, Some(_)) => ChatPhase::OpenSending,
            (true, false, None) => ChatPhase::OpenEmpty,
            (true, true, None) => ChatPhase::OpenIdle,
        }
    }

    /// Whether the composer holds something sendable.
    #[must_use]
    pub fn has_draft(&self) -> bool {
        !self.input.trim().is_empty() || self.attachment.is_some()
    }

    /// Open the panel, seeding the greeting on the very first open.
    pub fn open(&mut self) -> OpenOutcome {
        self.is_open = true;
        if !self.messages.is_empty() {
            return OpenOutcome::Reopened;
        }
        let id = self.next_message_id();
        self.messages.push(ConversationMessage {
            id,
            role: Role::Bot,
            text: Some(GREETING.to_string()),
            image: None,
            citations: Vec::new(),
            is_greeting: true,
        });
        OpenOutcome::Seeded
    }

    /// Hide the panel. Messages and any pending reply survive.
    pub fn close(&mut self) {
        self.is_open = false;
    }

    pub fn set_input(&mut self, text: String) {
        self.input = text;
    }

    /// Stage an image, replacing any previous one.
    pub fn attach(&mut self, attachment: PendingAttachment) {
        self.attachment = Some(attachment);
        self.attachment_error = None;
    }

    /// Record a picked image that could not be staged. Any staged image is kept.
    pub fn reject_attachment(&mut self, reason: impl Into<String>) {
        self.attachment_error = Some(reason.into());
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
        self.attachment_error = None;
    }

    pub fn set_location(&mut self, location: LatLon) {
        self.location = Some(location);
    }

    /// Append the user's message and hand back what must be sent.
    ///
    /// On rejection the composer is left untouched.
    pub fn begin_send(&mut self) -> Result<OutgoingTurn, SendRejected> {
        if !self.is_open {
            return Err(SendRejected::Closed);
        }
        let text = self.input.trim().to_string();
        if text.is_empty() && self.attachment.is_none() {
            return Err(SendRejected::Empty);
        }
        if self.in_flight.is_some() {
            return Err(SendRejected::Busy);
        }

        let history = self.history();
        let attachment = self.attachment.take();
        let text = (!text.is_empty()).then_some(text);
        self.input.clear();
        self.attachment_error = None;

        let id = self.next_message_id();
        self.messages.push(ConversationMessage {
            id,
            role: Role::User,
            text: text.clone(),
            image: attachment.as_ref().map(|a| ImagePreview {
                uri: a.preview_uri.clone(),
                mime_type: a.mime_type.clone(),
            }),
            citations: Vec::new(),
            is_greeting: false,
        });

        let turn = TurnId(self.next_turn_id);
        self.next_turn_id += 1;
        self.in_flight = Some(turn);

        Ok(OutgoingTurn {
            turn,
            history,
            text,
            attachment,
            location: self.location,
        })
    }

    /// Append the outcome of `turn` as a bot message and release the busy flag.
    ///
    /// Returns false when `turn` is not the pending one; such replies are dropped.
    pub fn complete_send(&mut self, turn: TurnId, outcome: Result<ModelReply, GatewayError>) -> bool {
        if self.in_flight != Some(turn) {
            debug!(turn = turn.0, "dropping reply for a turn that is not pending");
            return false;
        }
        self.in_flight = None;

        let (text, citations) = match outcome {
            Ok(reply) => (reply.text, reply.citations),
            Err(e) => {
                error!(error = %e, turn = turn.0, "assistant request failed");
                (ERROR_REPLY.to_string(), Vec::new())
            }
        };

        let id = self.next_message_id();
        self.messages.push(ConversationMessage {
            id,
            role: Role::Bot,
            text: Some(text),
            image: None,
            citations,
            is_greeting: false,
        });
        true
    }

    /// Text of a bot message suitable for reading aloud.
    #[must_use]
    pub fn speakable_text(&self, id: MessageId) -> Option<&str> {
        self.message(id)
            .filter(|m| m.role == Role::Bot)
            .and_then(|m| m.text.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// Typing indicator: a reply is pending for the latest user message.
    #[must_use]
    pub fn shows_typing_indicator(&self) -> bool {
        self.in_flight.is_some() && self.messages.last().is_some_and(|m| m.role == Role::User)
    }

    fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .filter(|m| !m.is_greeting)
            .filter_map(|m| {
                m.text
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .map(|t| HistoryTurn {
                        role: m.role,
                        text: t.to_string(),
                    })
            })
            .collect()
    }

    fn next_message_id(&mut self) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;
        id
    }
}
