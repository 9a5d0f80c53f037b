//! Extraction of the result image from the response shapes providers use.
//!
//! Shapes are tried in a fixed order and the first usable image wins:
//!
//! 1. `data[].b64_json`, or `data[].url` holding a data URL (images API)
//! 2. `choices[0].message.images[].image_url.url` (OpenRouter)
//! 3. `choices[0].message.content[]` parts of type `image_url`
//! 4. a data URL embedded in a string `choices[0].message.content`
//! 5. `candidates[0].content.parts[].inlineData` (native Gemini)
//!
//! Candidates that fail to decode are skipped rather than treated as errors.

use super::StylizedImage;
use crate::image_processing::{parse_data_url, EncodedImage};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;

const DATA_URL_MARKER: &str = "data:image/";

pub(super) fn extract_image(body: &Value) -> Option<StylizedImage> {
    let image = from_data_array(body)
        .or_else(|| from_message_images(body))
        .or_else(|| from_content_parts(body))
        .or_else(|| from_content_string(body))
        .or_else(|| from_inline_data(body))?;

    Some(StylizedImage {
        image,
        text: extract_text(body),
    })
}

fn decode_candidate(payload: &str, mime_type: Option<&str>) -> Option<EncodedImage> {
    if parse_data_url(payload).is_some() {
        return EncodedImage::from_base64(payload).ok();
    }
    let bytes = BASE64.decode(payload.trim()).ok()?;
    match mime_type {
        Some(mime) => EncodedImage::with_mime_type(bytes, mime).ok(),
        None => EncodedImage::from_bytes(bytes).ok(),
    }
}

fn from_data_array(body: &Value) -> Option<EncodedImage> {
    body.get("data")?.as_array()?.iter().find_map(|item| {
        if let Some(b64) = item.get("b64_json").and_then(Value::as_str) {
            return decode_candidate(b64, None);
        }
        item.get("url")
            .and_then(Value::as_str)
            .filter(|url| url.starts_with("data:"))
            .and_then(|url| decode_candidate(url, None))
    })
}

fn from_message_images(body: &Value) -> Option<EncodedImage> {
    body.pointer("/choices/0/message/images")?
        .as_array()?
        .iter()
        .find_map(|item| {
            let url = item
                .pointer("/image_url/url")
                .or_else(|| item.get("image_url"))
                .or_else(|| item.get("url"))
                .and_then(Value::as_str)?;
            decode_candidate(url, None)
        })
}

fn from_content_parts(body: &Value) -> Option<EncodedImage> {
    body.pointer("/choices/0/message/content")?
        .as_array()?
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("image_url"))
        .find_map(|part| {
            let url = part
                .pointer("/image_url/url")
                .or_else(|| part.get("image_url"))
                .and_then(Value::as_str)?;
            decode_candidate(url, None)
        })
}

fn from_content_string(body: &Value) -> Option<EncodedImage> {
    let content = body.pointer("/choices/0/message/content")?.as_str()?;
    let start = content.find(DATA_URL_MARKER)?;
    let tail = &content[start..];
    let end = tail
        .find(|c: char| c.is_whitespace() || matches!(c, ')' | '"' | '\'' | ']' | '>'))
        .unwrap_or(tail.len());
    decode_candidate(&tail[..end], None)
}

fn from_inline_data(body: &Value) -> Option<EncodedImage> {
    body.pointer("/candidates/0/content/parts")?
        .as_array()?
        .iter()
        .find_map(|part| {
            let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
            let data = inline.get("data").and_then(Value::as_str)?;
            let mime = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str);
            decode_candidate(data, mime)
        })
}

/// Collects text that came back alongside the image, if any.
fn extract_text(body: &Value) -> Option<String> {
    let mut pieces: Vec<String> = Vec::new();

    match body.pointer("/choices/0/message/content") {
        Some(Value::String(text)) if !text.contains(DATA_URL_MARKER) => pieces.push(text.clone()),
        Some(Value::Array(parts)) => pieces.extend(
            parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .map(str::to_string),
        ),
        _ => {}
    }

    if let Some(parts) = body.pointer("/candidates/0/content/parts").and_then(Value::as_array) {
        pieces.extend(
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .map(str::to_string),
        );
    }

    let joined = pieces.join("\n");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 1x1 transparent PNG
    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn data_url() -> String {
        format!("data:image/png;base64,{PNG_B64}")
    }

    #[test]
    fn images_api_b64_json() {
        let body = json!({ "data": [{ "b64_json": PNG_B64 }] });
        let result = extract_image(&body).unwrap();
        assert_eq!(result.image.mime_type(), "image/png");
        assert_eq!(result.to_base64(), PNG_B64);
        assert_eq!(result.text, None);
    }

    #[test]
    fn images_api_data_url() {
        let body = json!({ "data": [{ "url": data_url() }] });
        assert!(extract_image(&body).is_some());
    }

    #[test]
    fn images_api_remote_url_is_not_an_image() {
        let body = json!({ "data": [{ "url": "https://cdn.example.com/out.png" }] });
        assert!(extract_image(&body).is_none());
    }

    #[test]
    fn openrouter_message_images() {
        let body = json!({
            "choices": [{ "message": {
                "content": "Here is your picture.",
                "images": [{ "type": "image_url", "image_url": { "url": data_url() } }]
            }}]
        });
        let result = extract_image(&body).unwrap();
        assert_eq!(result.to_base64(), PNG_B64);
        assert_eq!(result.text.as_deref(), Some("Here is your picture."));
    }

    #[test]
    fn content_parts_with_image_url() {
        let body = json!({
            "choices": [{ "message": { "content": [
                { "type": "text", "text": "done" },
                { "type": "image_url", "image_url": { "url": data_url() } }
            ]}}]
        });
        let result = extract_image(&body).unwrap();
        assert_eq!(result.text.as_deref(), Some("done"));
    }

    #[test]
    fn data_url_inside_markdown_content() {
        let body = json!({
            "choices": [{ "message": { "content": format!("![result]({})", data_url()) } }]
        });
        let result = extract_image(&body).unwrap();
        assert_eq!(result.to_base64(), PNG_B64);
        assert_eq!(result.text, None);
    }

    #[test]
    fn native_inline_data() {
        let body = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "styled" },
                { "inlineData": { "mimeType": "image/png", "data": PNG_B64 } }
            ]}}]
        });
        let result = extract_image(&body).unwrap();
        assert_eq!(result.image.mime_type(), "image/png");
        assert_eq!(result.text.as_deref(), Some("styled"));
    }

    #[test]
    fn earlier_shape_wins() {
        let body = json!({
            "data": [{ "b64_json": PNG_B64 }],
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/jpeg", "data": "AAAA" } }
            ]}}]
        });
        assert_eq!(extract_image(&body).unwrap().image.mime_type(), "image/png");
    }

    #[test]
    fn text_only_response_has_no_image() {
        let body = json!({ "choices": [{ "message": { "content": "I cannot edit photos." } }] });
        assert!(extract_image(&body).is_none());
    }

    #[test]
    fn undecodable_candidate_is_skipped() {
        let body = json!({
            "data": [{ "b64_json": "%%%not base64%%%" }, { "b64_json": PNG_B64 }]
        });
        assert!(extract_image(&body).is_some());
    }
}
