use super::{
    chat_request_body, check_models_listing, endpoint, read_image_response, require_key, ImageProvider, Provider,
    StylizedImage,
};
use crate::error::{AppError, Result};
use crate::image_processing::EncodedImage;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

/// Client for Gemini image models through Google's OpenAI-compatible endpoint.
///
/// The image is first sent as a multipart `images/edits` upload. If that is
/// rejected or yields no image, a single `chat/completions` request with the
/// image as a data URL is attempted, and its outcome is final.
pub struct GoogleClient {
    http: reqwest::Client,
    base_url: url::Url,
    model: String,
}

impl GoogleClient {
    pub fn new(http: reqwest::Client, base_url: url::Url, model: String) -> Self {
        Self { http, base_url, model }
    }

    async fn send_multipart(&self, image: &EncodedImage, prompt: &str, key: &str) -> Result<StylizedImage> {
        let file_name = format!("image.{}", image.extension());
        // Some deployments read `image`, others `image[]`; send both.
        let form = Form::new()
            .text("model", self.model.clone())
            .text("prompt", prompt.to_string())
            .part(
                "image",
                Part::bytes(image.bytes().to_vec())
                    .file_name(file_name.clone())
                    .mime_str(image.mime_type())?,
            )
            .part(
                "image[]",
                Part::bytes(image.bytes().to_vec())
                    .file_name(file_name)
                    .mime_str(image.mime_type())?,
            );

        let response = self
            .http
            .post(endpoint(Provider::Google, &self.base_url, "images/edits")?)
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;
        read_image_response(Provider::Google, response).await
    }

    async fn send_chat(&self, image: &EncodedImage, prompt: &str, key: &str) -> Result<StylizedImage> {
        let response = self
            .http
            .post(endpoint(Provider::Google, &self.base_url, "chat/completions")?)
            .bearer_auth(key)
            .json(&chat_request_body(&self.model, image, prompt))
            .send()
            .await?;
        read_image_response(Provider::Google, response).await
    }
}

#[async_trait]
impl ImageProvider for GoogleClient {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn stylize(&self, image: &EncodedImage, prompt: &str, api_key: &str) -> Result<StylizedImage> {
        let key = require_key(Provider::Google, api_key)?;
        if image.bytes().is_empty() {
            return Err(AppError::EmptyImage);
        }

        match self.send_multipart(image, prompt, key).await {
            Ok(result) => Ok(result),
            Err(err @ (AppError::ProviderRejected { .. } | AppError::NoImageReturned(_))) => {
                tracing::warn!(error = %err, "multipart edit failed, retrying as chat completion");
                self.send_chat(image, prompt, key).await
            }
            Err(err) => Err(err),
        }
    }

    async fn validate_key(&self, api_key: &str) -> Result<bool> {
        check_models_listing(&self.http, Provider::Google, &self.base_url, api_key).await
    }
}
