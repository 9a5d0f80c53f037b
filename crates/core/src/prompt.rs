//! Generation prompt built from a theme and optional annotation notes.

use crate::error::{AppError, Result};

/// Builds the instruction sent with the photo.
///
/// `notes` are free-text remarks the user attached to marked areas; each
/// becomes a numbered line after the main instruction.
pub fn build_prompt(theme: &str, notes: &[&str]) -> Result<String> {
    let theme = theme.trim();
    if theme.is_empty() {
        return Err(AppError::config("Theme must not be empty"));
    }

    let mut prompt = format!(
        "Restyle this photo in the following style: {theme}. \
         Keep the composition, the subjects and their poses recognizable, \
         and return the restyled image."
    );

    let notes: Vec<&str> = notes.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).collect();
    if !notes.is_empty() {
        prompt.push_str("\nThe photo has hand-drawn marks. Follow these notes about the marked areas, then remove the marks:");
        for (i, note) in notes.iter().enumerate() {
            prompt.push_str(&format!("\n{}. {}", i + 1, note));
        }
    }

    Ok(prompt)
}
