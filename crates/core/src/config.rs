use crate::error::{AppError, Result};
use directories::ProjectDirs;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1/";
pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_OPENROUTER_MODEL: &str = "google/gemini-2.5-flash-image-preview";

/// Longest side of the editor preview, in display pixels.
pub const DEFAULT_PREVIEW_MAX_SIDE: u32 = 1024;

#[derive(Clone, Debug)]
pub struct Config {
    pub google_base_url: url::Url,
    pub openrouter_base_url: url::Url,
    pub google_model: String,
    pub openrouter_model: String,
    pub data_dir: PathBuf,
    pub preview_max_side: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let google_base_url = parse_base_url(&var("RESTYLE_GOOGLE_BASE_URL", DEFAULT_GOOGLE_BASE_URL))?;
        let openrouter_base_url =
            parse_base_url(&var("RESTYLE_OPENROUTER_BASE_URL", DEFAULT_OPENROUTER_BASE_URL))?;

        let google_model = var("RESTYLE_GOOGLE_MODEL", DEFAULT_GOOGLE_MODEL);
        let openrouter_model = var("RESTYLE_OPENROUTER_MODEL", DEFAULT_OPENROUTER_MODEL);

        let data_dir = match lookup("RESTYLE_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let preview_max_side = match lookup("RESTYLE_PREVIEW_MAX_SIDE") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|side| *side > 0)
                .ok_or_else(|| AppError::config(format!("RESTYLE_PREVIEW_MAX_SIDE must be a positive integer, got {raw:?}")))?,
            None => DEFAULT_PREVIEW_MAX_SIDE,
        };

        Ok(Self {
            google_base_url,
            openrouter_base_url,
            google_model,
            openrouter_model,
            data_dir,
            preview_max_side,
        })
    }

    /// Configuration pointing both providers at the same base URL.
    ///
    /// Used to aim the clients at a local stand-in server.
    pub fn with_base_url(base_url: &str, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let base = parse_base_url(base_url)?;
        Ok(Self {
            google_base_url: base.clone(),
            openrouter_base_url: base,
            google_model: DEFAULT_GOOGLE_MODEL.to_string(),
            openrouter_model: DEFAULT_OPENROUTER_MODEL.to_string(),
            data_dir: data_dir.into(),
            preview_max_side: DEFAULT_PREVIEW_MAX_SIDE,
        })
    }

    /// Path of the key/value file backing persistent storage.
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }
}

/// Parses a base URL, forcing a trailing slash so `Url::join` appends rather than replaces.
fn parse_base_url(raw: &str) -> Result<url::Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    url::Url::parse(&normalized).map_err(|e| AppError::config(format!("Invalid base URL {raw:?}: {e}")))
}

fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "restyle", "restyle")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| AppError::config("Could not determine a config directory; set RESTYLE_DATA_DIR"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = parse_base_url("http://127.0.0.1:8080/v1").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/v1/");
        assert_eq!(url.join("models").unwrap().as_str(), "http://127.0.0.1:8080/v1/models");
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn overrides_are_read_from_the_environment() {
        let config = Config::from_lookup(lookup(&[
            ("RESTYLE_DATA_DIR", "/tmp/restyle-test"),
            ("RESTYLE_PREVIEW_MAX_SIDE", "512"),
            ("RESTYLE_OPENROUTER_BASE_URL", "http://127.0.0.1:9000/api"),
            ("RESTYLE_GOOGLE_MODEL", "custom-model"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/restyle-test"));
        assert_eq!(config.storage_path(), PathBuf::from("/tmp/restyle-test/storage.json"));
        assert_eq!(config.preview_max_side, 512);
        assert_eq!(config.openrouter_base_url.as_str(), "http://127.0.0.1:9000/api/");
        assert_eq!(config.google_model, "custom-model");
        assert_eq!(config.google_base_url.as_str(), DEFAULT_GOOGLE_BASE_URL);
        assert_eq!(config.openrouter_model, DEFAULT_OPENROUTER_MODEL);
    }

    #[test]
    fn invalid_preview_size_is_rejected() {
        for raw in ["0", "-3", "big", ""] {
            let result = Config::from_lookup(lookup(&[
                ("RESTYLE_DATA_DIR", "/tmp/restyle-test"),
                ("RESTYLE_PREVIEW_MAX_SIDE", raw),
            ]));
            assert!(matches!(result, Err(AppError::Config(_))), "{raw:?} was accepted");
        }
    }

    #[test]
    fn invalid_base_url_from_environment_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("RESTYLE_DATA_DIR", "/tmp/restyle-test"),
            ("RESTYLE_GOOGLE_BASE_URL", "::nope"),
        ]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        assert!(matches!(parse_base_url("not a url"), Err(AppError::Config(_))));
    }
}
