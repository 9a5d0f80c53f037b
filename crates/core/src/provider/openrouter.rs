use super::{
    chat_request_body, check_models_listing, endpoint, read_image_response, require_key, ImageProvider, Provider,
    StylizedImage,
};
use crate::error::{AppError, Result};
use crate::image_processing::EncodedImage;
use async_trait::async_trait;

const APP_TITLE: &str = "restyle";

/// Client for OpenRouter's chat-completions API with an image-output model.
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: url::Url,
    model: String,
}

impl OpenRouterClient {
    pub fn new(http: reqwest::Client, base_url: url::Url, model: String) -> Self {
        Self { http, base_url, model }
    }
}

#[async_trait]
impl ImageProvider for OpenRouterClient {
    fn provider(&self) -> Provider {
        Provider::OpenRouter
    }

    async fn stylize(&self, image: &EncodedImage, prompt: &str, api_key: &str) -> Result<StylizedImage> {
        let key = require_key(Provider::OpenRouter, api_key)?;
        if image.bytes().is_empty() {
            return Err(AppError::EmptyImage);
        }

        let response = self
            .http
            .post(endpoint(Provider::OpenRouter, &self.base_url, "chat/completions")?)
            .bearer_auth(key)
            .header("X-Title", APP_TITLE)
            .json(&chat_request_body(&self.model, image, prompt))
            .send()
            .await?;
        read_image_response(Provider::OpenRouter, response).await
    }

    async fn validate_key(&self, api_key: &str) -> Result<bool> {
        check_models_listing(&self.http, Provider::OpenRouter, &self.base_url, api_key).await
    }
}
