//! Text capability: chat-completions style backend.

use reqwest::Client;

use super::api_error_message;
use crate::core::assistant::types::{
    AiInvoker, AiOutcome, AiPayload, AiRequest, AssistantConfig, Capability, TextParams,
};
use crate::core::error::Result;

pub struct ChatInvoker {
    endpoint: String,
    api_key: String,
    model: String,
    params: TextParams,
    client: Client,
}

impl ChatInvoker {
    pub fn new(config: &AssistantConfig, params: TextParams, client: Client) -> Self {
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
impl AiInvoker for ChatInvoker {
    fn capability(&self) -> Capability {
        Capability::Text
    }

    async fn generate(&self, request: &AiRequest) -> Result<AiOutcome> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": self.params.temperature,
            "max_tokens": self.params.max_tokens,
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

        // Chat-completions shape first; fall back to treating the body as
        // the payload when it is not JSON.
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => {
                if let Some(message) = json["error"]["message"].as_str() {
                    return Ok(AiOutcome::error(message.to_string()));
                }
                let content = json["choices"]
                    .as_array()
                    .and_then(|arr| arr.first())
                    .and_then(|c| c["message"]["content"].as_str())
                    .unwrap_or_default();
                Ok(AiOutcome::data(AiPayload::Text(content.to_string())))
            }
            Err(_) => Ok(AiOutcome::data(AiPayload::Text(text))),
        }
    }
}
