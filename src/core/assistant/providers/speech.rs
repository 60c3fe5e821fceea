//! Audio capability: text-to-speech endpoint.
//!
//! A config may name a concrete voice or "random". Random selection is NOT
//! done here per call: the executor pins one voice per work unit (stored on
//! the unit row) and passes it through `AiRequest::voice`, so repeated
//! calls for the same unit always speak with the same voice.

use rand::seq::SliceRandom;
use reqwest::Client;

use super::api_error_message;
use crate::core::assistant::types::{
    AiInvoker, AiOutcome, AiPayload, AiRequest, AssistantConfig, AudioParams, Capability,
};
use crate::core::error::Result;

/// Voices accepted by the speech endpoint.
pub const VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Sentinel meaning "pin one concrete voice per unit".
pub const RANDOM_VOICE: &str = "random";

/// Pick one concrete voice. Used once per work unit by the executor, never
/// per call.
pub fn pick_voice<R: rand::Rng + ?Sized>(rng: &mut R) -> &'static str {
    VOICES.choose(rng).copied().unwrap_or("alloy")
}

pub struct SpeechInvoker {
    endpoint: String,
    api_key: String,
    model: String,
    params: AudioParams,
    client: Client,
}

impl SpeechInvoker {
    pub fn new(config: &AssistantConfig, params: AudioParams, client: Client) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            params,
            client,
        }
    }
}

#[async_trait::async_trait]
impl AiInvoker for SpeechInvoker {
    fn capability(&self) -> Capability {
        Capability::Audio
    }

    async fn generate(&self, request: &AiRequest) -> Result<AiOutcome> {
        let voice = request.voice.as_deref().unwrap_or(&self.params.voice);

        let body = serde_json::json!({
            "model": self.model,
            "input": request.prompt,
            "voice": voice,
            "speed": self.params.speed,
            "response_format": self.params.response_format,
        });

        let resp = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return Ok(AiOutcome::error(e.to_string())),
        };

        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Ok(AiOutcome::error(api_error_message(status.as_u16(), &text)));
        }

        // Success is raw audio bytes; an error sneaking through with a 200
        // arrives as a JSON body instead.
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.contains("application/json") {
            let text = resp.text().await.unwrap_or_default();
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                if let Some(message) = json["error"]["message"].as_str() {
                    return Ok(AiOutcome::error(message.to_string()));
                }
            }
            return Ok(AiOutcome::data(AiPayload::Text(text)));
        }

        match resp.bytes().await {
            Ok(bytes) => Ok(AiOutcome::data(AiPayload::Binary(bytes.to_vec()))),
            Err(e) => Ok(AiOutcome::error(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assistant::types::CapabilityParams;
    use rand::SeedableRng;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_pick_voice_is_from_the_known_set() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert!(VOICES.contains(&pick_voice(&mut rng)));
        }
    }

    #[test]
    fn test_pick_voice_deterministic_for_seed() {
        let mut a = rand::rngs::StdRng::seed_from_u64(42);
        let mut b = rand::rngs::StdRng::seed_from_u64(42);
        assert_eq!(pick_voice(&mut a), pick_voice(&mut b));
    }

    #[tokio::test]
    async fn test_request_voice_overrides_config_voice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "voice": "nova" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![0u8, 1, 2, 3]),
            )
            .mount(&server)
            .await;

        let config = AssistantConfig {
            id: "tts1".into(),
            endpoint: format!("{}/v1/audio/speech", server.uri()),
            api_key: "sk-test".into(),
            model: "tts-1".into(),
            params: CapabilityParams::Audio(AudioParams::default()),
        };
        let invoker = SpeechInvoker::new(&config, AudioParams::default(), Client::new());

        let outcome = invoker
            .generate(&AiRequest::new("apple").with_voice("nova"))
            .await
            .unwrap();
        assert_eq!(outcome.data, Some(AiPayload::Binary(vec![0, 1, 2, 3])));
    }
}
