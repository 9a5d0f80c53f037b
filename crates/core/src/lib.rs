//! Restyle Core Library
//!
//! This library provides the core functionality for the restyle photo tool:
//! reading a photo, optionally marking it up or cropping it, and sending it
//! to an image-generation provider together with a style theme.
//!
//! # Overview
//!
//! - **Image Acquisition**: reading and encoding photos via [`image_processing`]
//! - **Providers**: the Google and OpenRouter clients behind one contract in [`provider`]
//! - **Encrypted Store**: API keys, history and usage sealed under a passphrase via [`store`]
//! - **Usage Estimate**: token and cost arithmetic in [`usage`]
//! - **Editor**: freehand markup and cropping at source resolution via [`editor`]
//!
//! # Quick Start
//!
//! The simplest way to use the library is through the [`Restyle`] facade:
//!
//! ```ignore
//! use restyle_core::{Config, EncodedImage, Provider, Restyle};
//!
//! let mut app = Restyle::open(Config::load()?)?;
//! app.unlock(Some("my passphrase"));
//! app.set_key(Provider::Google, "AIza...")?;
//!
//! let photo = EncodedImage::read_file("portrait.jpg")?;
//! let item = app.generate(&photo, "oil painting", &[]).await?;
//! item.save_to("portrait-oil")?;
//! ```
//!
//! # Module Structure
//!
//! - [`config`]: Configuration loading
//! - [`crypto`]: PBKDF2 key derivation and AES-GCM sealing
//! - [`editor`]: Annotation and crop editor
//! - [`error`]: Error types and result aliases
//! - [`history`]: Generation history
//! - [`image_processing`]: Image encoding utilities
//! - [`prompt`]: Prompt construction
//! - [`provider`]: Provider clients
//! - [`store`]: Storage backends and encrypted slots
//! - [`usage`]: Usage estimate

pub mod config;
pub mod crypto;
pub mod editor;
pub mod error;
pub mod history;
pub mod image_processing;
pub mod prompt;
pub mod provider;
pub mod store;
pub mod usage;

// Re-export primary types for convenience
pub use config::Config;
pub use editor::{Annotations, Editor, EditorMode};
pub use error::{AppError, Result};
pub use history::{History, HistoryItem};
pub use image_processing::EncodedImage;
pub use provider::{ImageProvider, Provider, StylizedImage};
pub use store::{AppState, FileStorage, MemoryStorage, Storage, Store, StoredKeys};
pub use usage::Usage;

use image::DynamicImage;

/// Main entry point for the restyle application.
///
/// This struct coordinates user actions: it holds the unlocked keys, the
/// selected provider, history and usage, routes each request to the right
/// provider client, and persists state after every change.
///
/// Generation borrows the coordinator mutably for the duration of the
/// request, so only one request can be outstanding at a time. There is no
/// cancellation: a started request runs to completion or failure.
pub struct Restyle<S: Storage> {
    config: Config,
    http: reqwest::Client,
    store: Store<S>,
    passphrase: Option<String>,
    keys: StoredKeys,
    provider: Provider,
    history: History,
    usage: Usage,
    last_error: Option<String>,
}

impl Restyle<FileStorage> {
    /// Opens the coordinator over the storage file named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage file exists but cannot be parsed,
    /// or if the HTTP client cannot be built.
    pub fn open(config: Config) -> Result<Self> {
        let storage = FileStorage::open(config.storage_path())?;
        Self::new(config, Store::new(storage))
    }
}

impl<S: Storage> Restyle<S> {
    /// Creates a coordinator over an existing store.
    ///
    /// Nothing is decrypted yet; call [`unlock`](Self::unlock) to load
    /// persisted keys and state.
    pub fn new(config: Config, store: Store<S>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        let provider = store.provider();
        Ok(Self {
            config,
            http,
            store,
            passphrase: None,
            keys: StoredKeys::default(),
            provider,
            history: History::default(),
            usage: Usage::default(),
            last_error: None,
        })
    }

    /// Sets the passphrase and loads whatever it can decrypt.
    ///
    /// Slots that cannot be read (absent, or a wrong passphrase) leave the
    /// in-memory values untouched. Returns whether anything was loaded.
    pub fn unlock(&mut self, passphrase: Option<&str>) -> bool {
        self.passphrase = passphrase.filter(|p| !p.is_empty()).map(str::to_string);
        let pass = self.passphrase.as_deref();

        let keys = self.store.load_keys(pass);
        let state = self.store.load_state(pass);
        let loaded = keys.is_some() || state.is_some();

        if let Some(keys) = keys {
            self.keys = keys;
        }
        if let Some(state) = state {
            self.history = History::from_items(state.history);
            self.usage = state.usage;
        }
        tracing::debug!(loaded, encrypted = pass.is_some(), "unlocked store");
        loaded
    }

    /// Whether stored data exists that the current passphrase could not open.
    ///
    /// While locked, changes stay in memory and saving them fails, so the
    /// data sealed under the real passphrase is not overwritten.
    pub fn is_locked(&self) -> bool {
        self.store.is_locked()
    }

    /// Deletes all persisted keys, history and usage, and resets them in memory.
    pub fn forget(&mut self) -> Result<()> {
        self.store.clear()?;
        self.keys = StoredKeys::default();
        self.history.clear();
        self.usage.reset();
        Ok(())
    }

    /// Whether state is being persisted (a passphrase is set).
    pub fn is_persistent(&self) -> bool {
        self.passphrase.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a mutable reference to the configuration.
    ///
    /// Allows overriding settings like model names after initialization.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    // Credentials

    pub fn key(&self, provider: Provider) -> Option<&str> {
        self.keys.get(provider)
    }

    pub fn has_key(&self, provider: Provider) -> bool {
        self.keys.get(provider).is_some()
    }

    /// Stores the key for `provider` and persists the credential slot.
    pub fn set_key(&mut self, provider: Provider, key: &str) -> Result<()> {
        self.keys.set(provider, key);
        self.store.save_keys(&self.keys, self.passphrase.as_deref())
    }

    pub fn clear_keys(&mut self) -> Result<()> {
        self.keys = StoredKeys::default();
        self.store.save_keys(&self.keys, self.passphrase.as_deref())
    }

    /// Checks the stored key for `provider` against the provider's models listing.
    pub async fn validate_key(&self, provider: Provider) -> Result<bool> {
        let key = self.keys.get(provider).unwrap_or_default();
        self.client(provider).validate_key(key).await
    }

    // Provider selection

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn set_provider(&mut self, provider: Provider) -> Result<()> {
        self.provider = provider;
        self.store.set_provider(provider)
    }

    /// Builds the client for `provider` from the current configuration.
    pub fn client(&self, provider: Provider) -> Box<dyn ImageProvider> {
        provider::client_for(provider, &self.config, self.http.clone())
    }

    // Generation

    /// Restyles `image` with the selected provider.
    ///
    /// On success the result is put at the front of the history, the usage
    /// estimate is updated, and state is persisted.
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] if the theme is blank
    /// - [`AppError::MissingCredential`] if no key is stored for the provider
    /// - [`AppError::ProviderRejected`] / [`AppError::NoImageReturned`] from the provider
    pub async fn generate(&mut self, image: &EncodedImage, theme: &str, notes: &[&str]) -> Result<HistoryItem> {
        let prompt = prompt::build_prompt(theme, notes)?;
        let provider = self.provider;
        let key = self.keys.get(provider).unwrap_or_default();

        let result = self.client(provider).stylize(image, &prompt, key).await?;

        let item = HistoryItem::new(&result.image, theme.trim());
        self.history.push(item.clone());
        self.usage
            .record_exchange(&prompt, result.text.as_deref().unwrap_or_default());
        tracing::info!(
            %provider,
            mime = result.image.mime_type(),
            bytes = result.image.bytes().len(),
            history = self.history.len(),
            "generated image"
        );

        if let Err(e) = self.persist_state() {
            tracing::warn!(error = %e, "failed to persist state after generation");
        }
        Ok(item)
    }

    /// [`generate`](Self::generate), with failures turned into a display string.
    ///
    /// The message is kept in [`last_error`](Self::last_error) until the next
    /// successful submission. No failure is fatal; the caller may retry immediately.
    pub async fn submit(&mut self, image: &EncodedImage, theme: &str, notes: &[&str]) -> Option<HistoryItem> {
        match self.generate(image, theme, notes).await {
            Ok(item) => {
                self.last_error = None;
                Some(item)
            }
            Err(e) => {
                tracing::warn!(error = %e, "generation failed");
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // History and usage

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn remove_history(&mut self, index: usize) -> Result<HistoryItem> {
        let removed = self.history.remove(index)?;
        self.persist_state()?;
        Ok(removed)
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.history.clear();
        self.persist_state()
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn reset_usage(&mut self) -> Result<()> {
        self.usage.reset();
        self.persist_state()
    }

    // Editing

    /// Creates an editor for `image` using the configured preview size.
    pub fn editor_for(&self, image: &DynamicImage) -> Result<Editor> {
        Editor::for_image(image, self.config.preview_max_side)
    }

    // Persistence

    /// Saves both credential and state slots.
    pub fn persist(&mut self) -> Result<()> {
        self.store.save_keys(&self.keys, self.passphrase.as_deref())?;
        self.persist_state()
    }

    fn persist_state(&mut self) -> Result<()> {
        let state = AppState {
            history: self.history.items().to_vec(),
            usage: self.usage,
        };
        self.store.save_state(&state, self.passphrase.as_deref())
    }

    pub fn store(&self) -> &Store<S> {
        &self.store
    }
}

/// Initializes the library by loading environment variables.
///
/// Call this once at application startup before using any other functions.
/// This loads `.env` files if present.
pub fn init() {
    let _ = dotenvy::dotenv();
}
