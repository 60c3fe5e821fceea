//! Video capability: short-clip generation endpoint.

use reqwest::Client;

use super::api_error_message;
use crate::core::assistant::types::{
    AiInvoker, AiOutcome, AiPayload, AiRequest, AssistantConfig, Capability, VideoParams,
};
use crate::core::error::Result;

pub struct VideoInvoker {
    endpoint: String,
    api_key: String,
    model: String,
    params: VideoParams,
    client: Client,
}

impl VideoInvoker {
    pub fn new(config: &AssistantConfig, params: VideoParams, client: Client) -> Self {
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
impl AiInvoker for VideoInvoker {
    fn capability(&self) -> Capability {
        Capability::Video
    }

    async fn generate(&self, request: &AiRequest) -> Result<AiOutcome> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "size": self.params.size,
            "seconds": self.params.seconds,
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
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Ok(AiOutcome::error(api_error_message(status.as_u16(), &text)));
        }

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => {
                if let Some(message) = json["error"]["message"].as_str() {
                    return Ok(AiOutcome::error(message.to_string()));
                }
                let url = json["data"][0]["url"].as_str().unwrap_or_default();
                Ok(AiOutcome::data(AiPayload::Text(url.to_string())))
            }
            Err(_) => Ok(AiOutcome::data(AiPayload::Text(text))),
        }
    }
}
