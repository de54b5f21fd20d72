#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod attachment;
pub mod audio;
pub mod capabilities;
pub mod config;
pub mod conversation;
pub mod event;
pub mod gateway;
pub mod guide;
pub mod location;
pub mod model;
pub mod presenter;
pub mod rich_text;

use serde::{Deserialize, Serialize};

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use crux_core::App as CruxApp;
pub use event::Event;
pub use model::Model;

use crate::conversation::{ChatPhase, ImagePreview, MessageId, Role};
use crate::gateway::CitationKind;
use crate::rich_text::RichText;

pub const APP_TITLE: &str = "Guía de Herbicidas para Cereales";
pub const CHAT_TITLE: &str = "Asistente Agrónomo";
pub const SOURCES_LABEL: &str = "Fuentes:";
pub const INPUT_PLACEHOLDER: &str = "Escribe tu pregunta...";
pub const IMAGE_INPUT_PLACEHOLDER: &str = "Describe la imagen...";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabView {
    pub label: String,
    pub active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageSectionView {
    pub index: usize,
    /// `"{bbch} - {title}"`
    pub label: String,
    pub expanded: bool,
    pub body: RichText,
    /// Escaped HTML restricted to `<strong>`, `<em>` and `<br>`.
    pub body_html: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegendLineView {
    pub code: String,
    pub desc: String,
    /// `"{code} = {desc}"`
    pub line: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum GuideView {
    Crop {
        name: String,
        sections: Vec<StageSectionView>,
        note: Option<String>,
    },
    Legend {
        heading: String,
        entries: Vec<LegendLineView>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceView {
    pub title: String,
    pub uri: String,
    pub kind: CitationKind,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub role: Role,
    pub text: Option<String>,
    /// Markdown rendered to sanitized HTML.
    pub html: Option<String>,
    pub image: Option<ImagePreview>,
    pub sources: Vec<SourceView>,
    pub can_read_aloud: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentView {
    pub preview_uri: String,
    pub mime_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatView {
    pub title: String,
    pub is_open: bool,
    pub phase: ChatPhase,
    pub messages: Vec<MessageView>,
    pub show_typing_indicator: bool,
    pub is_busy: bool,
    pub input: String,
    pub placeholder: String,
    pub attachment: Option<AttachmentView>,
    /// Why the last picked image was not attached.
    pub attachment_error: Option<String>,
    pub can_send: bool,
    pub sources_label: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewModel {
    pub title: String,
    pub tabs: Vec<TabView>,
    pub guide: GuideView,
    pub chat: ChatView,
    pub is_configured: bool,
}

pub mod app {
    use tracing::{debug, info, warn};

    use super::{
        AttachmentView, ChatView, MessageView, SourceView, ViewModel, APP_TITLE, CHAT_TITLE,
        IMAGE_INPUT_PLACEHOLDER, INPUT_PLACEHOLDER, SOURCES_LABEL,
    };
    use crate::attachment::prepare_attachment;
    use crate::audio::decode_speech_payload;
    use crate::capabilities::{Capabilities, PickConfig, PickerError};
    use crate::config::{GatewayConfig, API_KEY_HEADER};
    use crate::conversation::{ConversationMessage, OutgoingTurn, Role, SendRejected};
    use crate::event::Event;
    use crate::gateway::{self, GatewayError, GenerateContentResponse};
    use crate::location::LatLon;
    use crate::model::Model;
    use crate::presenter::{build_guide_view, build_tabs};
    use crate::rich_text::render_markdown;

    #[derive(Default)]
    pub struct App;

    impl App {
        fn send_converse_request(
            turn: &OutgoingTurn,
            config: &GatewayConfig,
            caps: &Capabilities,
        ) -> Result<(), GatewayError> {
            let request = gateway::build_converse_request(turn, config.place_triggers());
            let body =
                serde_json::to_vec(&request).map_err(|e| GatewayError::Encode(e.to_string()))?;

            debug!(
                turn = turn.turn.0,
                history = turn.history.len(),
                has_image = turn.attachment.is_some(),
                place_tool = !request.tools.is_empty(),
                "sending assistant request"
            );

            let turn_id = turn.turn;
            caps.http
                .post(config.text_url())
                .header("Content-Type", "application/json")
                .header(API_KEY_HEADER, config.api_key())
                .body(body)
                .expect_json::<GenerateContentResponse>()
                .send(move |result| Event::ReplyReceived {
                    turn: turn_id,
                    result: gateway::response_body(result),
                });
            Ok(())
        }

        fn send_speech_request(
            text: &str,
            config: &GatewayConfig,
            caps: &Capabilities,
            message_id: crate::conversation::MessageId,
        ) -> Result<(), GatewayError> {
            let request = gateway::build_speech_request(text, config.voice_name());
            let body =
                serde_json::to_vec(&request).map_err(|e| GatewayError::Encode(e.to_string()))?;

            caps.http
                .post(config.speech_url())
                .header("Content-Type", "application/json")
                .header(API_KEY_HEADER, config.api_key())
                .body(body)
                .expect_json::<GenerateContentResponse>()
                .send(move |result| Event::SpeechReceived {
                    message_id,
                    result: gateway::response_body(result),
                });
            Ok(())
        }

        fn play_speech(
            result: Result<GenerateContentResponse, GatewayError>,
            caps: &Capabilities,
        ) {
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "speech request failed");
                    return;
                }
            };
            let Some(payload) = gateway::extract_audio(&response) else {
                warn!("speech response carried no audio");
                return;
            };
            match decode_speech_payload(payload) {
                Ok(buffer) => {
                    debug!(duration_ms = buffer.duration_ms(), "playing speech");
                    caps.audio.play(buffer);
                }
                Err(e) => warn!(error = %e, "speech payload could not be decoded"),
            }
        }

        fn build_message_view(message: &ConversationMessage) -> MessageView {
            let sources = message
                .citations
                .iter()
                .filter_map(|c| {
                    let uri = c.link()?;
                    Some(SourceView {
                        title: c.display_title().unwrap_or(uri).to_string(),
                        uri: uri.to_string(),
                        kind: c.kind,
                    })
                })
                .collect();

            MessageView {
                id: message.id,
                role: message.role,
                html: message.text.as_deref().map(render_markdown),
                text: message.text.clone(),
                image: message.image.clone(),
                sources,
                can_read_aloud: message.role == Role::Bot
                    && message.text.as_deref().is_some_and(|t| !t.trim().is_empty()),
            }
        }

        fn build_chat_view(model: &Model) -> ChatView {
            let conversation = &model.conversation;
            let attachment = conversation.attachment().map(|a| AttachmentView {
                preview_uri: a.preview_uri.clone(),
                mime_type: a.mime_type.clone(),
            });

            ChatView {
                title: CHAT_TITLE.to_string(),
                is_open: conversation.is_open(),
                phase: conversation.phase(),
                messages: conversation
                    .messages()
                    .iter()
                    .map(Self::build_message_view)
                    .collect(),
                show_typing_indicator: conversation.shows_typing_indicator(),
                is_busy: model.is_busy(),
                input: conversation.input().to_string(),
                placeholder: if attachment.is_some() {
                    IMAGE_INPUT_PLACEHOLDER
                } else {
                    INPUT_PLACEHOLDER
                }
                .to_string(),
                can_send: conversation.has_draft() && !conversation.is_sending(),
                attachment,
                attachment_error: conversation.attachment_error().map(str::to_string),
                sources_label: SOURCES_LABEL.to_string(),
            }
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            debug!(
                event = event.name(),
                user = event.is_user_initiated(),
                "update"
            );

            match event {
                Event::Noop => {}

                Event::Configure(shell) => {
                    match GatewayConfig::from_shell(shell) {
                        Ok(config) => {
                            info!(
                                text_model = config.text_model(),
                                voice_model = config.voice_model(),
                                "assistant configured"
                            );
                            model.config = Some(config);
                        }
                        Err(e) => {
                            warn!(error = %e, "rejected shell configuration");
                            model.config = None;
                        }
                    }
                    caps.render.render();
                }

                Event::TabSelected { name } => {
                    model.selection.select_tab(name);
                    caps.render.render();
                }

                Event::StageToggled { index } => {
                    model.selection.toggle_stage(index);
                    caps.render.render();
                }

                Event::ChatOpened => {
                    if model.conversation.open().needs_location() {
                        caps.geolocation.current_position(Event::LocationResolved);
                    }
                    caps.render.render();
                }

                Event::ChatClosed => {
                    model.conversation.close();
                    caps.render.render();
                }

                Event::LocationResolved(result) => match result {
                    Ok(position) => match LatLon::try_from(position) {
                        Ok(location) => model.conversation.set_location(location),
                        Err(e) => warn!(error = %e, "device returned an invalid position"),
                    },
                    Err(e) => warn!(error = %e, "location unavailable"),
                },

                Event::InputChanged { text } => {
                    model.conversation.set_input(text);
                    caps.render.render();
                }

                Event::AttachImageRequested => {
                    caps.picker.pick_image(PickConfig::default(), Event::ImagePicked);
                }

                Event::ImagePicked(result) => {
                    match result {
                        Ok(picked) => match prepare_attachment(picked) {
                            Ok(attachment) => {
                                debug!(?attachment, "attachment staged");
                                model.conversation.attach(attachment);
                            }
                            Err(e) => {
                                warn!(error = %e, "attachment rejected");
                                model.conversation.reject_attachment(e.notice());
                            }
                        },
                        Err(PickerError::Cancelled) => debug!("image picker cancelled"),
                        Err(e) => {
                            warn!(error = %e, "image picker failed");
                            if let Some(notice) = e.notice() {
                                model.conversation.reject_attachment(notice);
                            }
                        }
                    }
                    caps.render.render();
                }

                Event::AttachmentCleared => {
                    model.conversation.clear_attachment();
                    caps.render.render();
                }

                Event::SendRequested => match model.conversation.begin_send() {
                    Ok(turn) => {
                        let issued = match model.config.as_ref() {
                            Some(config) => Self::send_converse_request(&turn, config, caps),
                            None => Err(GatewayError::MissingCredential),
                        };
                        if let Err(e) = issued {
                            model.conversation.complete_send(turn.turn, Err(e));
                        }
                        caps.render.render();
                    }
                    Err(SendRejected::Empty) => {}
                    Err(e @ (SendRejected::Busy | SendRejected::Closed)) => {
                        debug!(reason = %e, "send rejected");
                    }
                },

                Event::ReplyReceived { turn, result } => {
                    let reply = result.and_then(|response| gateway::parse_converse_reply(&response));
                    if model.conversation.complete_send(turn, reply) {
                        caps.render.render();
                    }
                }

                Event::ReadAloudRequested { message_id } => {
                    let Some(text) = model.conversation.speakable_text(message_id) else {
                        debug!(message = message_id.0, "nothing to read aloud");
                        return;
                    };
                    let Some(config) = model.config.as_ref() else {
                        warn!(error = %GatewayError::MissingCredential, "speech request skipped");
                        return;
                    };
                    match Self::send_speech_request(text, config, caps, message_id) {
                        Ok(()) => {
                            model.pending_speech += 1;
                            caps.render.render();
                        }
                        Err(e) => warn!(error = %e, "speech request failed"),
                    }
                }

                Event::SpeechReceived { message_id, result } => {
                    model.pending_speech = model.pending_speech.saturating_sub(1);
                    debug!(message = message_id.0, "speech response received");
                    Self::play_speech(result, caps);
                    caps.render.render();
                }
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            ViewModel {
                title: APP_TITLE.to_string(),
                tabs: build_tabs(&model.selection),
                guide: build_guide_view(&model.selection),
                chat: Self::build_chat_view(model),
                is_configured: model.config.is_some(),
            }
        }
    }
}
