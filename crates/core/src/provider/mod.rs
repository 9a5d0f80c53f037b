//! Image-generation provider clients.
//!
//! Both providers implement the same [`ImageProvider`] contract: take an
//! encoded image, a prompt and an API key, make a single outbound request
//! (the Google client may make one fallback request), and hand back the
//! stylized image.
//!
//! There is no retry, no timeout and no backoff. A blank key fails with
//! [`AppError::MissingCredential`] before any network activity.

mod google;
mod openrouter;
mod response;

pub use google::GoogleClient;
pub use openrouter::OpenRouterClient;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::image_processing::EncodedImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// One of the two interchangeable image-generation services.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Google,
    OpenRouter,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::OpenRouter];

    /// Stable identifier used in storage and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Google => f.write_str("Google"),
            Provider::OpenRouter => f.write_str("OpenRouter"),
        }
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gemini" => Ok(Provider::Google),
            "openrouter" => Ok(Provider::OpenRouter),
            other => Err(AppError::config(format!(
                "Unknown provider {other:?} (expected \"google\" or \"openrouter\")"
            ))),
        }
    }
}

/// An image returned by a provider, with any text it sent alongside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StylizedImage {
    pub image: EncodedImage,
    pub text: Option<String>,
}

impl StylizedImage {
    pub fn to_base64(&self) -> String {
        self.image.to_base64()
    }
}

/// Contract shared by every provider client.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Restyles `image` according to `prompt`.
    ///
    /// # Errors
    ///
    /// - [`AppError::MissingCredential`] if `api_key` is blank (no request is made)
    /// - [`AppError::ProviderRejected`] on a non-success HTTP status
    /// - [`AppError::NoImageReturned`] if the response carries no usable image
    async fn stylize(&self, image: &EncodedImage, prompt: &str, api_key: &str) -> Result<StylizedImage>;

    /// Checks a key against the provider's models listing. `Ok(true)` on a success status.
    async fn validate_key(&self, api_key: &str) -> Result<bool>;
}

/// Builds the client for `provider`, sharing one connection pool.
pub fn client_for(provider: Provider, config: &Config, http: reqwest::Client) -> Box<dyn ImageProvider> {
    match provider {
        Provider::Google => Box::new(GoogleClient::new(
            http,
            config.google_base_url.clone(),
            config.google_model.clone(),
        )),
        Provider::OpenRouter => Box::new(OpenRouterClient::new(
            http,
            config.openrouter_base_url.clone(),
            config.openrouter_model.clone(),
        )),
    }
}

fn require_key(provider: Provider, api_key: &str) -> Result<&str> {
    let key = api_key.trim();
    if key.is_empty() {
        return Err(AppError::MissingCredential(provider));
    }
    Ok(key)
}

fn endpoint(provider: Provider, base: &url::Url, path: &str) -> Result<url::Url> {
    base.join(path)
        .map_err(|e| AppError::config(format!("Invalid {provider} endpoint {path:?}: {e}")))
}

/// Chat-completions body carrying the image as a data URL.
fn chat_request_body(model: &str, image: &EncodedImage, prompt: &str) -> Value {
    json!({
        "model": model,
        "modalities": ["image", "text"],
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": image.to_data_url() } }
            ]
        }]
    })
}

/// Turns an HTTP response into a stylized image or the matching error.
async fn read_image_response(provider: Provider, response: reqwest::Response) -> Result<StylizedImage> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        tracing::debug!(%provider, status = status.as_u16(), "provider returned an error status");
        return Err(AppError::ProviderRejected {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    let value: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(%provider, error = %e, "response body is not JSON");
            return Err(AppError::NoImageReturned(provider));
        }
    };

    response::extract_image(&value).ok_or(AppError::NoImageReturned(provider))
}

async fn check_models_listing(
    http: &reqwest::Client,
    provider: Provider,
    base: &url::Url,
    api_key: &str,
) -> Result<bool> {
    let key = require_key(provider, api_key)?;
    let response = http
        .get(endpoint(provider, base, "models")?)
        .bearer_auth(key)
        .send()
        .await?;
    tracing::debug!(%provider, status = response.status().as_u16(), "validated key");
    Ok(response.status().is_success())
}
