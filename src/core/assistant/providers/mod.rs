//! Concrete backend invokers, one per capability.
//!
//! Dispatch is a static match on the typed capability params: adding a
//! capability means a new enum variant and a new invoker file, never
//! runtime class-name assembly.

mod chat;
mod image;
mod speech;
mod video;

pub use chat::ChatInvoker;
pub use image::ImageInvoker;
pub use speech::{pick_voice, SpeechInvoker, RANDOM_VOICE, VOICES};
pub use video::VideoInvoker;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use super::types::{AiInvoker, AssistantConfig, CapabilityParams};
use crate::core::error::Result;

/// Seam between the executor and the HTTP backends; tests substitute a
/// scripted factory here.
pub trait InvokerFactory: Send + Sync {
    fn invoker_for(&self, config: &AssistantConfig) -> Result<Arc<dyn AiInvoker>>;
}

/// Default factory building real HTTP invokers.
pub struct HttpInvokerFactory {
    timeout: Duration,
}

impl HttpInvokerFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(&self) -> Client {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .expect("Failed to create HTTP client")
    }
}

impl Default for HttpInvokerFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl InvokerFactory for HttpInvokerFactory {
    fn invoker_for(&self, config: &AssistantConfig) -> Result<Arc<dyn AiInvoker>> {
        let invoker: Arc<dyn AiInvoker> = match &config.params {
            CapabilityParams::Text(params) => {
                Arc::new(ChatInvoker::new(config, params.clone(), self.client()))
            }
            CapabilityParams::Image(params) => {
                Arc::new(ImageInvoker::new(config, params.clone(), self.client()))
            }
            CapabilityParams::Audio(params) => {
                Arc::new(SpeechInvoker::new(config, params.clone(), self.client()))
            }
            CapabilityParams::Video(params) => {
                Arc::new(VideoInvoker::new(config, params.clone(), self.client()))
            }
        };
        Ok(invoker)
    }
}

/// Pull a human-readable message out of a failed response body.
///
/// JSON bodies yield `error.message` when present; anything else is
/// reported raw, prefixed with the HTTP status.
pub(crate) fn api_error_message(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = json["error"]["message"].as_str() {
            return message.to_string();
        }
    }
    format!("HTTP {status}: {}", body.trim())
}
