//! Typed assistant configuration and the normalized invoker contract.

use serde::{Deserialize, Serialize};

use crate::core::error::{GenError, Result};
use crate::database::models::AssistantConfigRecord;

// ============================================================================
// Capability
// ============================================================================

/// One AI backend generation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Text,
    Image,
    Audio,
    Video,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Image => "image",
            Capability::Audio => "audio",
            Capability::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Capability::Text),
            "image" => Some(Capability::Image),
            "audio" => Some(Capability::Audio),
            "video" => Some(Capability::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Per-capability parameters
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageParams {
    pub size: String,
    pub quality: String,
    pub response_format: String,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
            response_format: "url".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioParams {
    /// Concrete voice name, or "random" to have the executor pin one per
    /// work unit.
    pub voice: String,
    pub speed: f32,
    pub response_format: String,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            voice: "random".to_string(),
            speed: 1.0,
            response_format: "mp3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoParams {
    pub size: String,
    pub seconds: u32,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            size: "1280x720".to_string(),
            seconds: 4,
        }
    }
}

/// Capability-tagged parameter set, stored as JSON on the config row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "lowercase")]
pub enum CapabilityParams {
    Text(TextParams),
    Image(ImageParams),
    Audio(AudioParams),
    Video(VideoParams),
}

impl CapabilityParams {
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityParams::Text(_) => Capability::Text,
            CapabilityParams::Image(_) => Capability::Image,
            CapabilityParams::Audio(_) => Capability::Audio,
            CapabilityParams::Video(_) => Capability::Video,
        }
    }
}

// ============================================================================
// Assistant Config (validated)
// ============================================================================

/// A validated assistant configuration, ready to build an invoker from.
///
/// Construction fails with a `ConfigurationError` when the endpoint, key or
/// model is missing or the stored params do not match the capability;
/// those are operator mistakes no retry can fix.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub id: String,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub params: CapabilityParams,
}

impl AssistantConfig {
    pub fn from_record(record: &AssistantConfigRecord) -> Result<Self> {
        if record.endpoint.trim().is_empty() {
            return Err(GenError::Config(format!(
                "assistant {} has no endpoint URL",
                record.id
            )));
        }
        if record.api_key.trim().is_empty() {
            return Err(GenError::Config(format!(
                "assistant {} has no API key",
                record.id
            )));
        }
        if record.model.trim().is_empty() {
            return Err(GenError::Config(format!(
                "assistant {} has no model",
                record.id
            )));
        }

        let params: CapabilityParams = serde_json::from_str(&record.params).map_err(|e| {
            GenError::Config(format!("assistant {} has invalid params: {e}", record.id))
        })?;

        if Some(params.capability()) != Capability::parse(&record.capability) {
            return Err(GenError::Config(format!(
                "assistant {} params do not match capability {}",
                record.id, record.capability
            )));
        }

        Ok(Self {
            id: record.id.clone(),
            endpoint: record.endpoint.trim().to_string(),
            api_key: record.api_key.trim().to_string(),
            model: record.model.clone(),
            params,
        })
    }

    pub fn capability(&self) -> Capability {
        self.params.capability()
    }
}

// ============================================================================
// Invoker contract
// ============================================================================

/// One composed request to an AI backend.
#[derive(Debug, Clone)]
pub struct AiRequest {
    pub prompt: String,
    /// Pinned voice override for audio calls; None uses the config's voice.
    pub voice: Option<String>,
}

impl AiRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            voice: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

/// Payload returned by a backend: text for chat, bytes for audio, a URL or
/// base64 blob for images and video.
#[derive(Debug, Clone, PartialEq)]
pub enum AiPayload {
    Text(String),
    Binary(Vec<u8>),
}

impl AiPayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AiPayload::Text(s) => Some(s),
            AiPayload::Binary(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AiPayload::Text(s) => s.trim().is_empty(),
            AiPayload::Binary(b) => b.is_empty(),
        }
    }
}

/// Normalized backend result: at most one of `data`/`error` is meaningful.
/// Transport failures and `error.message` bodies both land in `error`.
#[derive(Debug, Clone, Default)]
pub struct AiOutcome {
    pub data: Option<AiPayload>,
    pub error: Option<String>,
}

impl AiOutcome {
    pub fn data(payload: AiPayload) -> Self {
        Self {
            data: Some(payload),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
        }
    }

    /// Collapse into the pipeline's error taxonomy: a reported error is a
    /// retryable transport failure, a missing or blank payload is
    /// `EmptyResults`.
    pub fn into_result(self) -> Result<AiPayload> {
        if let Some(message) = self.error {
            return Err(GenError::Transport(message));
        }
        match self.data {
            Some(payload) if !payload.is_empty() => Ok(payload),
            _ => Err(GenError::EmptyResults),
        }
    }
}

/// Seam between the executor and the concrete HTTP backends.
#[async_trait::async_trait]
pub trait AiInvoker: Send + Sync {
    fn capability(&self) -> Capability;

    /// Perform one outbound request. `Err` is reserved for local failures
    /// (bad config); backend trouble is normalized into the outcome.
    async fn generate(&self, request: &AiRequest) -> Result<AiOutcome>;
}
