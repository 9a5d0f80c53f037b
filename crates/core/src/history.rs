//! Generation history, newest first.
//!
//! Items are never deduplicated and the list has no size cap.

use crate::error::{AppError, Result};
use crate::image_processing::EncodedImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A generated image and the theme that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Base64 image payload (no data-URL prefix).
    pub image: String,
    pub mime_type: String,
    pub theme: String,
}

impl HistoryItem {
    pub fn new(image: &EncodedImage, theme: impl Into<String>) -> Self {
        Self {
            image: image.to_base64(),
            mime_type: image.mime_type().to_string(),
            theme: theme.into(),
        }
    }

    /// Decodes the stored payload back into encoded bytes.
    pub fn to_encoded(&self) -> Result<EncodedImage> {
        EncodedImage::from_base64(&format!("data:{};base64,{}", self.mime_type, self.image))
    }

    /// Writes the image to `path`. A path without an extension gets one from the mime type.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let encoded = self.to_encoded()?;
        let mut path = path.as_ref().to_path_buf();
        if path.extension().is_none() {
            path.set_extension(encoded.extension());
        }
        encoded.save(&path)?;
        Ok(path)
    }

    /// Writes the image to `base` with the mime type's extension always appended.
    ///
    /// Use this for generated names, where dots in `base` (as in `my.photo-restyled`)
    /// are part of the name and not an extension.
    pub fn save_with_extension(&self, base: impl AsRef<Path>) -> Result<PathBuf> {
        let encoded = self.to_encoded()?;
        let mut name = base.as_ref().as_os_str().to_owned();
        name.push(".");
        name.push(encoded.extension());
        let path = PathBuf::from(name);
        encoded.save(&path)?;
        Ok(path)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    items: Vec<HistoryItem>,
}

impl History {
    pub fn from_items(items: Vec<HistoryItem>) -> Self {
        Self { items }
    }

    /// Puts `item` at the front.
    pub fn push(&mut self, item: HistoryItem) {
        self.items.insert(0, item);
    }

    pub fn get(&self, index: usize) -> Option<&HistoryItem> {
        self.items.get(index)
    }

    pub fn latest(&self) -> Option<&HistoryItem> {
        self.items.first()
    }

    /// Removes the entry at `index`, keeping the others in order.
    pub fn remove(&mut self, index: usize) -> Result<HistoryItem> {
        if index >= self.items.len() {
            return Err(AppError::HistoryIndex(index));
        }
        Ok(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryItem> {
        self.items.iter()
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }
}
