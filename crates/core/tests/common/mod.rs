//! Local stand-in for the provider HTTP APIs.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use image::{DynamicImage, Rgba, RgbaImage};
use restyle_core::EncodedImage;
use std::sync::{Arc, Mutex};

/// 1x1 transparent PNG
pub const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// What the stand-in server saw for one request.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub path: String,
    pub content_type: String,
    pub authorization: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Recorded>>>);

impl Recorder {
    pub fn record(&self, path: &str, headers: &axum::http::HeaderMap, body: &[u8]) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        self.0.lock().unwrap().push(Recorded {
            path: path.to_string(),
            content_type: header("content-type"),
            authorization: header("authorization"),
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.0.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

/// Serves `router` on an ephemeral port and returns its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/")
}

pub fn photo() -> EncodedImage {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([200, 100, 50, 255])));
    EncodedImage::encode_png(&img).unwrap()
}

pub fn openrouter_image_body() -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": {
            "content": "Here you go",
            "images": [{ "type": "image_url", "image_url": { "url": format!("data:image/png;base64,{PNG_B64}") } }]
        }}]
    })
}

/// POST handler that records the request and answers with JSON.
pub fn reply_json(recorder: &Recorder, path: &'static str, status: StatusCode, body: serde_json::Value) -> MethodRouter {
    let recorder = recorder.clone();
    post(move |headers: HeaderMap, bytes: Bytes| {
        let recorder = recorder.clone();
        let body = body.clone();
        async move {
            recorder.record(path, &headers, &bytes);
            (status, Json(body))
        }
    })
}

/// POST handler that records the request and answers with plain text.
pub fn reply_text(recorder: &Recorder, path: &'static str, status: StatusCode, body: &'static str) -> MethodRouter {
    let recorder = recorder.clone();
    post(move |headers: HeaderMap, bytes: Bytes| {
        let recorder = recorder.clone();
        async move {
            recorder.record(path, &headers, &bytes);
            (status, body)
        }
    })
}

/// GET handler for the models listing that accepts only `Bearer good-key`.
pub fn models_listing(recorder: &Recorder) -> MethodRouter {
    let recorder = recorder.clone();
    get(move |headers: HeaderMap| {
        let recorder = recorder.clone();
        async move {
            recorder.record("models", &headers, &[]);
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer good-key");
            if authorized {
                (StatusCode::OK, Json(serde_json::json!({ "data": [{ "id": "m" }] })))
            } else {
                (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "invalid key" })))
            }
        }
    })
}
