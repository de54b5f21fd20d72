//! Wire format and translation for the hosted generative model.
//!
//! A conversation turn becomes one `generateContent` request carrying the
//! system instruction, the prior history, the new user content and, when the
//! message asks about local suppliers, the place-lookup tool. Replies are
//! reduced to text plus grounding citations. The read-aloud request uses the
//! same endpoint against the voice model.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::conversation::{OutgoingTurn, Role};
use crate::guide::guide;
use crate::location::LatLon;
use crate::rich_text::is_safe_link;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GatewayError {
    #[error("no API credential configured")]
    MissingCredential,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}")]
    Provider { status: u16 },

    #[error("request blocked by provider: {0}")]
    Blocked(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("could not encode request: {0}")]
    Encode(String),
}

// ---- request ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
    /// Set on reasoning parts, which are not part of the answer.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub thought: bool,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            inline_data: Some(Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
            ..Self::default()
        }
    }
}

/// Base64 payload with its media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_maps: Option<GoogleMaps>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleMaps {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub retrieval_config: RetrievalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    pub lat_lng: LatLng,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<LatLon> for LatLng {
    fn from(ll: LatLon) -> Self {
        Self {
            latitude: ll.latitude(),
            longitude: ll.longitude(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

// ---- response ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub web: Option<GroundingSource>,
    #[serde(default)]
    pub maps: Option<GroundingSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

// ---- domain ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Web,
    Maps,
}

/// A grounding source attached to a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub kind: CitationKind,
    pub title: Option<String>,
    pub uri: Option<String>,
}

impl Citation {
    /// The URI, if it is an absolute http(s) link.
    #[must_use]
    pub fn link(&self) -> Option<&str> {
        self.uri
            .as_deref()
            .filter(|u| is_safe_link(u) && (u.starts_with("http://") || u.starts_with("https://")))
    }

    /// Title for display, falling back to the URI.
    #[must_use]
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or(self.uri.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub citations: Vec<Citation>,
}

static SYSTEM_INSTRUCTION: LazyLock<String> = LazyLock::new(|| {
    let table = guide().to_json().unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize guide for system instruction");
        String::from("{}")
    });
    format!(
        "Eres un asistente experto en agronomía, especializado en el control de malezas en \
         cereales en Chile. Tu base de conocimiento principal es la siguiente información: \
         {table}. Responde las preguntas de los usuarios de forma concisa y precisa, en español. \
         Si el usuario sube una imagen, identifica la maleza (si es posible) y sugiere métodos de \
         control relevantes para Chile. Si se pregunta por proveedores o información local, \
         utiliza la herramienta de Google Maps. No respondas preguntas fuera de este tema."
    )
});

/// Persona, scope and the full guide serialized as reference material.
#[must_use]
pub fn system_instruction() -> &'static str {
    &SYSTEM_INSTRUCTION
}

/// Whether the message asks for something the place-lookup tool can answer.
///
/// Triggers are expected lower-cased.
#[must_use]
pub fn wants_place_lookup(text: &str, triggers: &[String]) -> bool {
    let lower = text.to_lowercase();
    triggers
        .iter()
        .any(|t| !t.is_empty() && lower.contains(t.as_str()))
}

#[must_use]
pub fn build_converse_request(turn: &OutgoingTurn, place_triggers: &[String]) -> GenerateContentRequest {
    let mut contents: Vec<Content> = turn
        .history
        .iter()
        .map(|h| Content {
            role: Some(h.role.wire_role().to_string()),
            parts: vec![Part::text(h.text.clone())],
        })
        .collect();

    let mut parts = Vec::with_capacity(2);
    if let Some(attachment) = &turn.attachment {
        parts.push(Part::inline(attachment.mime_type.clone(), attachment.to_base64()));
    }
    if let Some(text) = &turn.text {
        parts.push(Part::text(text.clone()));
    }
    contents.push(Content {
        role: Some(Role::User.wire_role().to_string()),
        parts,
    });

    let place_lookup = turn
        .text
        .as_deref()
        .is_some_and(|t| wants_place_lookup(t, place_triggers));

    let (tools, tool_config) = if place_lookup {
        let tool = Tool {
            google_maps: Some(GoogleMaps {}),
        };
        let config = turn.location.map(|ll| ToolConfig {
            retrieval_config: RetrievalConfig { lat_lng: ll.into() },
        });
        (vec![tool], config)
    } else {
        (Vec::new(), None)
    };

    GenerateContentRequest {
        system_instruction: Some(Content {
            role: None,
            parts: vec![Part::text(system_instruction())],
        }),
        contents,
        tools,
        tool_config,
        generation_config: None,
    }
}

fn citation_from_chunk(chunk: &GroundingChunk) -> Option<Citation> {
    let (kind, source) = match (&chunk.maps, &chunk.web) {
        (Some(maps), _) => (CitationKind::Maps, maps),
        (None, Some(web)) => (CitationKind::Web, web),
        (None, None) => return None,
    };
    if source.uri.is_none() && source.title.is_none() {
        return None;
    }
    Some(Citation {
        kind,
        title: source.title.clone(),
        uri: source.uri.clone(),
    })
}

/// Reduce a provider response to reply text and citations.
pub fn parse_converse_reply(response: &GenerateContentResponse) -> Result<ModelReply, GatewayError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_ref())
    {
        return Err(GatewayError::Blocked(reason.clone()));
    }

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| GatewayError::Malformed("no candidates".into()))?;

    let text: String = candidate
        .content
        .iter()
        .flat_map(|c| c.parts.iter())
        .filter(|p| !p.thought)
        .filter_map(|p| p.text.as_deref())
        .collect();

    if text.trim().is_empty() {
        return Err(match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => {
                GatewayError::Blocked(reason.to_string())
            }
            _ => GatewayError::Malformed("empty reply".into()),
        });
    }

    let citations = candidate
        .grounding_metadata
        .iter()
        .flat_map(|g| g.grounding_chunks.iter())
        .filter_map(citation_from_chunk)
        .collect();

    Ok(ModelReply { text, citations })
}

#[must_use]
pub fn build_speech_request(text: &str, voice_name: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: None,
            parts: vec![Part::text(text)],
        }],
        generation_config: Some(GenerationConfig {
            response_modalities: vec!["AUDIO".to_string()],
            speech_config: Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice_name.to_string(),
                    },
                },
            }),
        }),
        ..GenerateContentRequest::default()
    }
}

/// Base64 audio from the first candidate, if the voice model returned any.
#[must_use]
pub fn extract_audio(response: &GenerateContentResponse) -> Option<&str> {
    response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .find_map(|p| p.inline_data.as_ref())
        .map(|blob| blob.data.as_str())
        .filter(|data| !data.is_empty())
}

/// Unwrap an HTTP result into the decoded body.
///
/// Non-2xx statuses are provider failures even when the error body happens
/// to decode as a reply.
pub fn response_body<T>(result: crux_http::Result<crux_http::Response<T>>) -> Result<T, GatewayError> {
    let mut response = result.map_err(|e| match e {
        crux_http::Error::Http(e) => GatewayError::Provider {
            status: e.code.into(),
        },
        crux_http::Error::Json(reason) => GatewayError::Malformed(reason),
        other => GatewayError::Transport(other.to_string()),
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::Provider {
            status: status.into(),
        });
    }
    response
        .take_body()
        .ok_or_else(|| GatewayError::Malformed("missing response body".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::PendingAttachment;
    use crate::conversation::{HistoryTurn, TurnId};
    use serde_json::json;

    fn triggers() -> Vec<String> {
        vec!["cerca".into(), "comprar".into()]
    }

    fn turn(text: Option<&str>) -> OutgoingTurn {
        OutgoingTurn {
            turn: TurnId(0),
            history: Vec::new(),
            text: text.map(str::to_string),
            attachment: None,
            location: None,
        }
    }

    #[test]
    fn test_system_instruction_embeds_guide() {
        let instruction = system_instruction();
        assert!(instruction.starts_with("Eres un asistente experto en agronomía"));
        assert!(instruction.contains("\"Cebada\""));
        assert!(instruction.contains("\"legend\""));
        assert!(instruction.ends_with("No respondas preguntas fuera de este tema."));
    }

    #[test]
    fn test_plain_request_shape() {
        let req = build_converse_request(&turn(Some("¿Qué uso en trigo?")), &triggers());
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value["contents"],
            json!([{ "role": "user", "parts": [{ "text": "¿Qué uso en trigo?" }] }])
        );
        assert!(value["systemInstruction"]["parts"][0]["text"].is_string());
        assert!(value.get("tools").is_none());
        assert!(value.get("toolConfig").is_none());
        assert!(value.get("generationConfig").is_none());
    }

    #[test]
    fn test_history_precedes_new_turn() {
        let mut t = turn(Some("¿y en cebada?"));
        t.history = vec![
            HistoryTurn { role: Role::User, text: "hola".into() },
            HistoryTurn { role: Role::Bot, text: "¿en qué ayudo?".into() },
        ];
        let req = build_converse_request(&t, &triggers());
        let roles: Vec<_> = req.contents.iter().map(|c| c.role.clone().unwrap()).collect();
        assert_eq!(roles, ["user", "model", "user"]);
    }

    #[test]
    fn test_image_part_before_text() {
        let mut t = turn(Some("¿qué maleza es?"));
        t.attachment = Some(PendingAttachment {
            preview_uri: "blob:1".into(),
            mime_type: "image/png".into(),
            data: vec![0xFF, 0x00, 0x10],
            width: 1,
            height: 1,
        });
        let value = serde_json::to_value(build_converse_request(&t, &triggers())).unwrap();
        assert_eq!(
            value["contents"][0]["parts"],
            json!([
                { "inlineData": { "mimeType": "image/png", "data": "/wAQ" } },
                { "text": "¿qué maleza es?" }
            ])
        );
    }

    #[test]
    fn test_place_tool_with_location() {
        let mut t = turn(Some("¿Dónde comprar herbicidas CERCA de mí?"));
        t.location = Some(LatLon::new(-36.6, -72.1).unwrap());
        let value = serde_json::to_value(build_converse_request(&t, &triggers())).unwrap();
        assert_eq!(value["tools"], json!([{ "googleMaps": {} }]));
        assert_eq!(
            value["toolConfig"],
            json!({ "retrievalConfig": { "latLng": { "latitude": -36.6, "longitude": -72.1 } } })
        );
    }

    #[test]
    fn test_place_tool_without_location() {
        let req = build_converse_request(&turn(Some("distribuidor cerca")), &triggers());
        assert_eq!(req.tools.len(), 1);
        assert!(req.tool_config.is_none());
    }

    #[test]
    fn test_place_tool_needs_trigger() {
        let mut t = turn(Some("dosis de MCPA"));
        t.location = Some(LatLon::new(-36.6, -72.1).unwrap());
        let req = build_converse_request(&t, &triggers());
        assert!(req.tools.is_empty());
        assert!(req.tool_config.is_none());
    }

    #[test]
    fn test_parse_reply_with_citations() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "razonando", "thought": true },
                    { "text": "Use " },
                    { "text": "**MCPA**." }
                ]},
                "groundingMetadata": { "groundingChunks": [
                    { "web": { "uri": "https://www.sag.gob.cl", "title": "SAG" } },
                    { "maps": { "uri": "https://maps.google.com/?cid=7", "title": "Agrícola Sur" } },
                    { "retrievedContext": { "uri": "x" } }
                ]}
            }]
        }))
        .unwrap();
        let reply = parse_converse_reply(&response).unwrap();
        assert_eq!(reply.text, "Use **MCPA**.");
        assert_eq!(reply.citations.len(), 2);
        assert_eq!(reply.citations[0].kind, CitationKind::Web);
        assert_eq!(reply.citations[1].kind, CitationKind::Maps);
        assert_eq!(reply.citations[1].display_title(), Some("Agrícola Sur"));
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).unwrap();
        assert_eq!(
            parse_converse_reply(&response),
            Err(GatewayError::Blocked("SAFETY".into()))
        );
    }

    #[test]
    fn test_parse_empty_reply_is_error() {
        let none = GenerateContentResponse::default();
        assert!(matches!(parse_converse_reply(&none), Err(GatewayError::Malformed(_))));

        let blank: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "  " }] }, "finishReason": "STOP" }]
        }))
        .unwrap();
        assert!(matches!(parse_converse_reply(&blank), Err(GatewayError::Malformed(_))));
    }

    #[test]
    fn test_citation_link_filter() {
        let unsafe_link = Citation {
            kind: CitationKind::Web,
            title: None,
            uri: Some("javascript:alert(1)".into()),
        };
        assert_eq!(unsafe_link.link(), None);
        assert_eq!(unsafe_link.display_title(), Some("javascript:alert(1)"));

        let ok = Citation {
            kind: CitationKind::Maps,
            title: Some("  ".into()),
            uri: Some("https://maps.google.com/?cid=1".into()),
        };
        assert_eq!(ok.link(), Some("https://maps.google.com/?cid=1"));
        assert_eq!(ok.display_title(), Some("https://maps.google.com/?cid=1"));
    }

    #[test]
    fn test_speech_request_shape() {
        let value = serde_json::to_value(build_speech_request("Hola", "Kore")).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{ "parts": [{ "text": "Hola" }] }],
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": { "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Kore" } } }
                }
            })
        );
    }

    #[test]
    fn test_extract_audio() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "audio/L16;rate=24000", "data": "AEAAwA==" } }
            ]}}]
        }))
        .unwrap();
        assert_eq!(extract_audio(&response), Some("AEAAwA=="));
        assert_eq!(extract_audio(&GenerateContentResponse::default()), None);
    }

    #[test]
    fn test_response_body_status_checked() {
        use crux_http::http::StatusCode;
        use crux_http::testing::ResponseBuilder;

        let ok = ResponseBuilder::ok()
            .body(GenerateContentResponse::default())
            .build();
        assert_eq!(response_body(Ok(ok)), Ok(GenerateContentResponse::default()));

        let quota = ResponseBuilder::with_status(StatusCode::TooManyRequests)
            .body(GenerateContentResponse::default())
            .build();
        assert_eq!(
            response_body(Ok(quota)),
            Err(GatewayError::Provider { status: 429 })
        );
    }

    #[test]
    fn test_response_body_maps_errors() {
        let garbled: crux_http::Result<crux_http::Response<GenerateContentResponse>> =
            Err(crux_http::Error::Json("expected value".into()));
        assert_eq!(
            response_body(garbled),
            Err(GatewayError::Malformed("expected value".into()))
        );
        let timeout: crux_http::Result<crux_http::Response<GenerateContentResponse>> =
            Err(crux_http::Error::Timeout);
        assert!(matches!(response_body(timeout), Err(GatewayError::Transport(_))));
    }
}
