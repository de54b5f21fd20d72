use serde::{Deserialize, Serialize};

use crate::capabilities::{GeolocationResult, PickerResult};
use crate::config::ShellConfig;
use crate::conversation::{MessageId, TurnId};
use crate::gateway::{GatewayError, GenerateContentResponse};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum Event {
    Noop,

    // Shell
    Configure(ShellConfig),

    // Guide
    TabSelected { name: String },
    StageToggled { index: usize },

    // Chat
    ChatOpened,
    ChatClosed,
    InputChanged { text: String },
    AttachImageRequested,
    AttachmentCleared,
    SendRequested,
    ReadAloudRequested { message_id: MessageId },

    // Capability callbacks
    #[serde(skip)]
    LocationResolved(GeolocationResult),
    #[serde(skip)]
    ImagePicked(PickerResult),
    #[serde(skip)]
    ReplyReceived {
        turn: TurnId,
        result: Result<GenerateContentResponse, GatewayError>,
    },
    #[serde(skip)]
    SpeechReceived {
        message_id: MessageId,
        result: Result<GenerateContentResponse, GatewayError>,
    },
}

impl Default for Event {
    fn default() -> Self {
        Self::Noop
    }
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Configure(_) => "configure",
            Self::TabSelected { .. } => "tab_selected",
            Self::StageToggled { .. } => "stage_toggled",
            Self::ChatOpened => "chat_opened",
            Self::ChatClosed => "chat_closed",
            Self::InputChanged { .. } => "input_changed",
            Self::AttachImageRequested => "attach_image_requested",
            Self::AttachmentCleared => "attachment_cleared",
            Self::SendRequested => "send_requested",
            Self::ReadAloudRequested { .. } => "read_aloud_requested",
            Self::LocationResolved(_) => "location_resolved",
            Self::ImagePicked(_) => "image_picked",
            Self::ReplyReceived { .. } => "reply_received",
            Self::SpeechReceived { .. } => "speech_received",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::TabSelected { .. }
                | Self::StageToggled { .. }
                | Self::ChatOpened
                | Self::ChatClosed
                | Self::InputChanged { .. }
                | Self::AttachImageRequested
                | Self::AttachmentCleared
                | Self::SendRequested
                | Self::ReadAloudRequested { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_events_roundtrip_json() {
        let event = Event::TabSelected { name: "Avena".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"TabSelected":{"name":"Avena"}}"#);
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name(), "tab_selected");
    }

    #[test]
    fn test_callbacks_not_user_initiated() {
        assert!(Event::SendRequested.is_user_initiated());
        assert!(!Event::LocationResolved(Err(crate::capabilities::GeolocationError::Timeout))
            .is_user_initiated());
        assert!(!Event::Configure(ShellConfig::default()).is_user_initiated());
    }
}
