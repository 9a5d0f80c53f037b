//! Error types for the restyle-core library.
//!
//! This module provides granular error variants for the different failure
//! modes of the generation path, the encrypted store and the image pipeline.
//! Decryption failures are deliberately absent: the store reports them as
//! "no data" instead of raising.

use crate::provider::Provider;
use thiserror::Error;

/// Errors that can occur within the restyle-core library.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (invalid values, unknown provider names).
    #[error("Configuration error: {0}")]
    Config(String),

    /// No API key is configured for the provider that was asked to run.
    #[error("No API key configured for {0}")]
    MissingCredential(Provider),

    /// The provider answered with a non-success HTTP status.
    #[error("{provider} rejected the request (HTTP {status}): {body}")]
    ProviderRejected {
        provider: Provider,
        status: u16,
        body: String,
    },

    /// The provider answered successfully but no image could be found in the payload.
    #[error("{0} returned no image")]
    NoImageReturned(Provider),

    /// The input image has no bytes.
    #[error("Input image is empty")]
    EmptyImage,

    /// Image decoding, editing or encoding failed.
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    /// Key derivation or encryption failed while sealing data.
    #[error("Encryption failed: {0}")]
    Crypto(String),

    /// The persistent key/value storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// No history entry exists at the given index.
    #[error("No history entry at index {0}")]
    HistoryIndex(usize),

    /// Transport-level HTTP failure (connection refused, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 payload could not be decoded.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an image processing error with the given message.
    pub fn image(msg: impl Into<String>) -> Self {
        Self::ImageProcessing(msg.into())
    }

    /// Creates an encryption error with the given message.
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Creates a storage error with the given message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
