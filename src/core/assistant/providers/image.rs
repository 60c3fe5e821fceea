//! Image capability: DALL-E/Imagen style generation endpoint.

use reqwest::Client;

use super::api_error_message;
use crate::core::assistant::types::{
    AiInvoker, AiOutcome, AiPayload, AiRequest, AssistantConfig, Capability, ImageParams,
};
use crate::core::error::Result;

pub struct ImageInvoker {
    endpoint: String,
    api_key: String,
    model: String,
    params: ImageParams,
    client: Client,
}

impl ImageInvoker {
    pub fn new(config: &AssistantConfig, params: ImageParams, client: Client) -> Self {
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
impl AiInvoker for ImageInvoker {
    fn capability(&self) -> Capability {
        Capability::Image
    }

    async fn generate(&self, request: &AiRequest) -> Result<AiOutcome> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "n": 1,
            "size": self.params.size,
            "quality": self.params.quality,
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
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Ok(AiOutcome::error(api_error_message(status.as_u16(), &text)));
        }

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => {
                if let Some(message) = json["error"]["message"].as_str() {
                    return Ok(AiOutcome::error(message.to_string()));
                }
                let item = &json["data"][0];
                let payload = item["url"]
                    .as_str()
                    .or_else(|| item["b64_json"].as_str())
                    .unwrap_or_default();
                Ok(AiOutcome::data(AiPayload::Text(payload.to_string())))
            }
            Err(_) => Ok(AiOutcome::data(AiPayload::Text(text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assistant::types::CapabilityParams;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_image_url_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "size": "1024x1024" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "url": "https://cdn.example.com/apple.png" }]
            })))
            .mount(&server)
            .await;

        let config = AssistantConfig {
            id: "img1".into(),
            endpoint: format!("{}/v1/images/generations", server.uri()),
            api_key: "sk-test".into(),
            model: "dall-e-3".into(),
            params: CapabilityParams::Image(ImageParams::default()),
        };
        let invoker = ImageInvoker::new(&config, ImageParams::default(), Client::new());

        let outcome = invoker
            .generate(&AiRequest::new("an apple on a table"))
            .await
            .unwrap();
        assert_eq!(
            outcome.data.unwrap().as_text(),
            Some("https://cdn.example.com/apple.png")
        );
    }
}
