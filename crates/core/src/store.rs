//! Credential and application-state persistence.
//!
//! Persistent storage is a flat map of string keys to string values (see
//! [`Storage`]). Two independent encrypted slots live in it, one for API keys
//! and one for history plus usage, each written as a ciphertext/nonce/salt
//! triple. The selected provider is stored in plain text beside them.
//!
//! Without a passphrase nothing is persisted: data is kept in the slot's
//! session cache only, and any previously persisted triple is removed. A
//! failed decryption is reported as "no data", never as an error, so a wrong
//! passphrase looks the same as empty storage.
//!
//! A slot whose complete triple could not be decrypted is left alone: saving
//! into it under a passphrase fails until the slot is cleared, so a mistyped
//! passphrase cannot overwrite data sealed under the real one.

use crate::crypto::{self, SealedBlob, PBKDF2_ITERATIONS};
use crate::error::{AppError, Result};
use crate::history::HistoryItem;
use crate::provider::Provider;
use crate::usage::Usage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Storage key of the plain-text provider selection.
pub const PROVIDER_KEY: &str = "restyle.provider";

/// The three storage keys that make up one encrypted slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotKeys {
    pub ciphertext: &'static str,
    pub nonce: &'static str,
    pub salt: &'static str,
}

impl SlotKeys {
    fn all(&self) -> [&'static str; 3] {
        [self.ciphertext, self.nonce, self.salt]
    }
}

pub const CREDENTIALS_SLOT: SlotKeys = SlotKeys {
    ciphertext: "restyle.keys.ciphertext",
    nonce: "restyle.keys.nonce",
    salt: "restyle.keys.salt",
};

pub const STATE_SLOT: SlotKeys = SlotKeys {
    ciphertext: "restyle.state.ciphertext",
    nonce: "restyle.state.nonce",
    salt: "restyle.state.salt",
};

/// String key/value storage, the on-disk stand-in for browser local storage.
///
/// Multi-entry writes and removals must be all-or-nothing so a slot's triple
/// is never left half-updated.
pub trait Storage: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set_all(&mut self, entries: &[(&str, String)]) -> Result<()>;
    fn remove_all(&mut self, keys: &[&str]) -> Result<()>;
}

/// Volatile storage, used for session-only runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set_all(&mut self, entries: &[(&str, String)]) -> Result<()> {
        for (key, value) in entries {
            self.entries.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_all(&mut self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.entries.remove(*key);
        }
        Ok(())
    }
}

/// Storage backed by a single JSON object file.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so readers see either the old or the new map.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStorage {
    /// Opens (or lazily creates) the storage file at `path`.
    ///
    /// A file that is not a JSON string map is moved aside to
    /// `<name>.corrupt` and storage starts empty.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    let aside = path.with_extension("json.corrupt");
                    tracing::warn!(path = %path.display(), error = %e, "storage file is unreadable, starting empty");
                    if let Err(e) = fs::rename(&path, &aside) {
                        tracing::warn!(path = %aside.display(), error = %e, "failed to move unreadable storage file aside");
                    }
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set_all(&mut self, entries: &[(&str, String)]) -> Result<()> {
        let mut next = self.entries.clone();
        for (key, value) in entries {
            next.insert((*key).to_string(), value.clone());
        }
        self.flush(&next)?;
        self.entries = next;
        Ok(())
    }

    fn remove_all(&mut self, keys: &[&str]) -> Result<()> {
        if !keys.iter().any(|key| self.entries.contains_key(*key)) {
            return Ok(());
        }
        let mut next = self.entries.clone();
        for key in keys {
            next.remove(*key);
        }
        self.flush(&next)?;
        self.entries = next;
        Ok(())
    }
}

/// API keys, at most one per provider.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKeys {
    #[serde(default)]
    pub google: Option<String>,
    #[serde(default)]
    pub openrouter: Option<String>,
}

impl StoredKeys {
    /// The key for `provider`, ignoring blank values.
    pub fn get(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::Google => self.google.as_deref(),
            Provider::OpenRouter => self.openrouter.as_deref(),
        };
        key.filter(|k| !k.trim().is_empty())
    }

    /// Replaces the key for `provider`. A blank key clears it.
    pub fn set(&mut self, provider: Provider, key: impl Into<String>) {
        let key = key.into();
        let value = (!key.trim().is_empty()).then(|| key.trim().to_string());
        match provider {
            Provider::Google => self.google = value,
            Provider::OpenRouter => self.openrouter = value,
        }
    }
}

impl fmt::Debug for StoredKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("StoredKeys")
            .field("google", &mask(&self.google))
            .field("openrouter", &mask(&self.openrouter))
            .finish()
    }
}

/// History and usage, persisted together.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default)]
    pub usage: Usage,
}

/// One encrypted slot plus its session-only cache.
pub struct EncryptedSlot<T> {
    keys: SlotKeys,
    iterations: u32,
    session: Option<T>,
    /// A complete triple is persisted but the last passphrase could not open it.
    sealed_elsewhere: bool,
}

impl<T> EncryptedSlot<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn new(keys: SlotKeys, iterations: u32) -> Self {
        Self {
            keys,
            iterations,
            session: None,
            sealed_elsewhere: false,
        }
    }

    /// Stores `data`, encrypted under `passphrase` if one is given.
    ///
    /// Without a passphrase the data stays in memory and any persisted copy
    /// is removed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] when a passphrase is given but the last
    /// load found data this passphrase could not open. Nothing is changed.
    pub fn save(&mut self, storage: &mut dyn Storage, data: &T, passphrase: Option<&str>) -> Result<()> {
        let passphrase = passphrase.filter(|p| !p.is_empty());
        if passphrase.is_some() && self.sealed_elsewhere {
            return Err(AppError::storage(format!(
                "{} holds data sealed under a different passphrase; clear it before saving",
                self.keys.ciphertext
            )));
        }
        self.session = Some(data.clone());

        let Some(passphrase) = passphrase else {
            storage.remove_all(&self.keys.all())?;
            self.sealed_elsewhere = false;
            tracing::debug!(slot = self.keys.ciphertext, "kept slot in session memory only");
            return Ok(());
        };

        let plaintext = serde_json::to_vec(data)?;
        let sealed = crypto::seal(&plaintext, passphrase, self.iterations)?;
        storage.set_all(&[
            (self.keys.ciphertext, sealed.ciphertext),
            (self.keys.nonce, sealed.nonce),
            (self.keys.salt, sealed.salt),
        ])?;
        tracing::debug!(slot = self.keys.ciphertext, "persisted encrypted slot");
        Ok(())
    }

    /// Loads the slot.
    ///
    /// Without a passphrase this returns the session cache. With one, the
    /// persisted triple is decrypted; any failure yields `None`.
    pub fn load(&mut self, storage: &dyn Storage, passphrase: Option<&str>) -> Option<T> {
        let Some(passphrase) = passphrase.filter(|p| !p.is_empty()) else {
            return self.session.clone();
        };

        let data = self.read_sealed(storage, passphrase);
        self.sealed_elsewhere = data.is_none() && self.is_persisted(storage);
        if data.is_none() {
            tracing::debug!(
                slot = self.keys.ciphertext,
                sealed_elsewhere = self.sealed_elsewhere,
                "no readable data in slot"
            );
        }
        if let Some(data) = &data {
            self.session = Some(data.clone());
        }
        data
    }

    fn is_persisted(&self, storage: &dyn Storage) -> bool {
        self.keys
            .all()
            .iter()
            .all(|key| matches!(storage.get(key), Ok(Some(_))))
    }

    /// Whether the slot holds data the last passphrase could not open.
    pub fn is_sealed_elsewhere(&self) -> bool {
        self.sealed_elsewhere
    }

    fn read_sealed(&self, storage: &dyn Storage, passphrase: &str) -> Option<T> {
        let blob = SealedBlob {
            ciphertext: storage.get(self.keys.ciphertext).ok()??,
            nonce: storage.get(self.keys.nonce).ok()??,
            salt: storage.get(self.keys.salt).ok()??,
        };
        let plaintext = crypto::open(&blob, passphrase, self.iterations)?;
        serde_json::from_slice(&plaintext).ok()
    }

    /// Drops the session cache and the persisted triple.
    pub fn clear(&mut self, storage: &mut dyn Storage) -> Result<()> {
        storage.remove_all(&self.keys.all())?;
        self.session = None;
        self.sealed_elsewhere = false;
        Ok(())
    }
}

/// Storage plus the credential slot, the state slot and the provider selection.
pub struct Store<S: Storage> {
    storage: S,
    credentials: EncryptedSlot<StoredKeys>,
    state: EncryptedSlot<AppState>,
}

impl<S: Storage> Store<S> {
    pub fn new(storage: S) -> Self {
        Self::with_iterations(storage, PBKDF2_ITERATIONS)
    }

    /// Builds a store whose key derivation uses `iterations` rounds.
    ///
    /// Data saved with one round count can only be loaded with the same count.
    pub fn with_iterations(storage: S, iterations: u32) -> Self {
        Self {
            storage,
            credentials: EncryptedSlot::new(CREDENTIALS_SLOT, iterations),
            state: EncryptedSlot::new(STATE_SLOT, iterations),
        }
    }

    pub fn save_keys(&mut self, keys: &StoredKeys, passphrase: Option<&str>) -> Result<()> {
        self.credentials.save(&mut self.storage, keys, passphrase)
    }

    pub fn load_keys(&mut self, passphrase: Option<&str>) -> Option<StoredKeys> {
        self.credentials.load(&self.storage, passphrase)
    }

    pub fn save_state(&mut self, state: &AppState, passphrase: Option<&str>) -> Result<()> {
        self.state.save(&mut self.storage, state, passphrase)
    }

    pub fn load_state(&mut self, passphrase: Option<&str>) -> Option<AppState> {
        self.state.load(&self.storage, passphrase)
    }

    /// Whether either slot holds data the last passphrase could not open.
    pub fn is_locked(&self) -> bool {
        self.credentials.is_sealed_elsewhere() || self.state.is_sealed_elsewhere()
    }

    /// Removes both slots from memory and storage.
    pub fn clear(&mut self) -> Result<()> {
        self.credentials.clear(&mut self.storage)?;
        self.state.clear(&mut self.storage)
    }

    /// The persisted provider selection, `Google` when absent or unrecognized.
    pub fn provider(&self) -> Provider {
        self.storage
            .get(PROVIDER_KEY)
            .ok()
            .flatten()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_provider(&mut self, provider: Provider) -> Result<()> {
        self.storage
            .set_all(&[(PROVIDER_KEY, provider.as_str().to_string())])
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUNDS: u32 = 1_000;

    fn keys() -> StoredKeys {
        let mut keys = StoredKeys::default();
        keys.set(Provider::Google, "g-key");
        keys.set(Provider::OpenRouter, "or-key");
        keys
    }

    #[test]
    fn roundtrip_with_passphrase() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        store.save_keys(&keys(), Some("pw")).unwrap();

        // A fresh store over the same storage models a page reload.
        let storage = store.storage().clone();
        let mut reloaded = Store::with_iterations(storage, ROUNDS);
        assert_eq!(reloaded.load_keys(Some("pw")), Some(keys()));
    }

    #[test]
    fn wrong_passphrase_loads_nothing() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        store.save_keys(&keys(), Some("pw")).unwrap();
        let mut reloaded = Store::with_iterations(store.storage().clone(), ROUNDS);
        assert_eq!(reloaded.load_keys(Some("not-pw")), None);
    }

    #[test]
    fn absent_data_loads_nothing() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        assert_eq!(store.load_keys(Some("pw")), None);
        assert_eq!(store.load_state(None), None);
    }

    #[test]
    fn without_passphrase_data_is_session_only() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        store.save_keys(&keys(), Some("pw")).unwrap();
        assert_eq!(store.storage().len(), 3);

        store.save_keys(&keys(), None).unwrap();
        assert!(store.storage().is_empty());
        assert_eq!(store.load_keys(None), Some(keys()));

        let mut reloaded = Store::with_iterations(store.storage().clone(), ROUNDS);
        assert_eq!(reloaded.load_keys(None), None);
    }

    #[test]
    fn empty_passphrase_counts_as_absent() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        store.save_keys(&keys(), Some("")).unwrap();
        assert!(store.storage().is_empty());
    }

    #[test]
    fn slots_are_independent() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        store.save_keys(&keys(), Some("pw")).unwrap();
        store.save_state(&AppState::default(), Some("pw")).unwrap();

        let storage = store.storage();
        assert_eq!(storage.len(), 6);
        assert_ne!(
            storage.get(CREDENTIALS_SLOT.salt).unwrap(),
            storage.get(STATE_SLOT.salt).unwrap()
        );
        assert_ne!(
            storage.get(CREDENTIALS_SLOT.nonce).unwrap(),
            storage.get(STATE_SLOT.nonce).unwrap()
        );
    }

    #[test]
    fn wrong_passphrase_cannot_overwrite_sealed_data() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        store.save_state(&AppState::default(), Some("pw")).unwrap();
        let before = store.storage().get(STATE_SLOT.ciphertext).unwrap();

        let mut reloaded = Store::with_iterations(store.storage().clone(), ROUNDS);
        assert_eq!(reloaded.load_state(Some("typo")), None);
        assert!(reloaded.is_locked());
        let err = reloaded.save_state(&AppState::default(), Some("typo")).unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(reloaded.storage().get(STATE_SLOT.ciphertext).unwrap(), before);

        // The right passphrase still opens it and unlocks saving.
        assert_eq!(reloaded.load_state(Some("pw")), Some(AppState::default()));
        assert!(!reloaded.is_locked());
        reloaded.save_state(&AppState::default(), Some("pw")).unwrap();
    }

    #[test]
    fn clearing_a_locked_store_allows_a_new_passphrase() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        store.save_keys(&keys(), Some("pw")).unwrap();
        let mut reloaded = Store::with_iterations(store.storage().clone(), ROUNDS);
        assert_eq!(reloaded.load_keys(Some("other")), None);

        reloaded.clear().unwrap();
        assert!(!reloaded.is_locked());
        reloaded.save_keys(&keys(), Some("other")).unwrap();
        assert_eq!(reloaded.load_keys(Some("other")), Some(keys()));
    }

    #[test]
    fn corrupt_storage_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{ not json").unwrap();

        let mut storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get(PROVIDER_KEY).unwrap(), None);
        assert!(dir.path().join("storage.json.corrupt").exists());

        storage.set_all(&[(PROVIDER_KEY, "google".to_string())]).unwrap();
        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(PROVIDER_KEY).unwrap().as_deref(), Some("google"));
    }

    #[test]
    fn partial_triple_loads_nothing() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        store.save_keys(&keys(), Some("pw")).unwrap();
        let mut storage = store.storage().clone();
        storage.remove_all(&[CREDENTIALS_SLOT.nonce]).unwrap();
        let mut reloaded = Store::with_iterations(storage, ROUNDS);
        assert_eq!(reloaded.load_keys(Some("pw")), None);
    }

    #[test]
    fn provider_selection_defaults_to_google() {
        let mut store = Store::with_iterations(MemoryStorage::new(), ROUNDS);
        assert_eq!(store.provider(), Provider::Google);
        store.set_provider(Provider::OpenRouter).unwrap();
        assert_eq!(store.provider(), Provider::OpenRouter);
        assert_eq!(
            store.storage().get(PROVIDER_KEY).unwrap().as_deref(),
            Some("openrouter")
        );
    }

    #[test]
    fn blank_keys_are_cleared() {
        let mut keys = keys();
        keys.set(Provider::Google, "  ");
        assert_eq!(keys.get(Provider::Google), None);
        assert_eq!(keys.get(Provider::OpenRouter), Some("or-key"));
    }

    #[test]
    fn debug_output_hides_keys() {
        let rendered = format!("{:?}", keys());
        assert!(!rendered.contains("g-key"));
        assert!(rendered.contains("redacted"));
    }
}
