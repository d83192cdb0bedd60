use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use base64::Engine as _;
use serde_json::Value;

pub const API_KEY: &str = "stub-key";

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with a text part.
    Text(String),
    /// 200 with an inline-data part.
    Inline { mime_type: Option<String>, data: Vec<u8> },
    /// Error status with a service-style error body.
    Error { status: u16, message: String },
}

/// Replies per request kind, chosen from `generationConfig.responseModalities`.
#[derive(Debug, Clone)]
pub struct GenaiStubConfig {
    pub text: Reply,
    pub speech: Reply,
    pub image: Reply,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub api_key: Option<String>,
    pub body: Value,
}

pub struct GenaiStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl GenaiStub {
    pub fn spawn(config: GenaiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start genai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1beta");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post
                    || !path.starts_with("/v1beta/models/")
                    || !path.ends_with(":generateContent")
                {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let api_key = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("x-goog-api-key"))
                    .map(|h| h.value.as_str().to_owned());

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                recorded.lock().unwrap().push(RecordedRequest {
                    path,
                    api_key: api_key.clone(),
                    body: parsed.clone(),
                });

                if api_key.as_deref() != Some(API_KEY) {
                    respond_json(
                        request,
                        403,
                        serde_json::json!({ "error": { "message": "API key not valid" } }),
                    );
                    continue;
                }

                let modalities = parsed
                    .pointer("/generationConfig/responseModalities")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .unwrap_or_default();
                let reply = if modalities.contains("AUDIO") {
                    &config.speech
                } else if modalities.contains("IMAGE") {
                    &config.image
                } else {
                    &config.text
                };

                match reply {
                    Reply::Text(text) => respond_json(
                        request,
                        200,
                        serde_json::json!({
                            "candidates": [{
                                "content": { "role": "model", "parts": [{ "text": text }] },
                                "finishReason": "STOP",
                            }]
                        }),
                    ),
                    Reply::Inline { mime_type, data } => {
                        let mut inline = serde_json::json!({
                            "data": base64::engine::general_purpose::STANDARD.encode(data),
                        });
                        if let Some(mime_type) = mime_type {
                            inline["mimeType"] = Value::String(mime_type.clone());
                        }
                        respond_json(
                            request,
                            200,
                            serde_json::json!({
                                "candidates": [{
                                    "content": {
                                        "role": "model",
                                        "parts": [{ "inlineData": inline }]
                                    },
                                    "finishReason": "STOP",
                                }]
                            }),
                        );
                    }
                    Reply::Error { status, message } => respond_json(
                        request,
                        *status,
                        serde_json::json!({ "error": { "code": status, "message": message } }),
                    ),
                }
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Settings pointing every service at this stub.
    pub fn settings(&self) -> reelsmith::config::Settings {
        let base_url = self.base_url.clone();
        reelsmith::config::Settings::from_lookup(move |key| match key {
            "REELSMITH_API_KEY" => Some(API_KEY.to_owned()),
            "REELSMITH_API_BASE_URL" => Some(base_url.clone()),
            "REELSMITH_HTTP_TIMEOUT_SECS" => Some("10".to_owned()),
            _ => None,
        })
    }
}

impl Drop for GenaiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn respond_json(request: tiny_http::Request, status: u16, body: Value) {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    let response = tiny_http::Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(header);
    let _ = request.respond(response);
}

/// A service-shaped manifest with `scene_count` scenes.
#[allow(dead_code)]
pub fn manifest_json(title: &str, scene_count: u32) -> String {
    let scenes: Vec<Value> = (1..=scene_count)
        .map(|id| {
            serde_json::json!({
                "id": id,
                "narration": format!("Narration for scene {id}."),
                "caption": format!("Caption {id}"),
                "image_prompt": format!("Illustration {id}"),
                "duration_estimate": 2.0 + f64::from(id),
                "effect": "zoom_in",
                "transition": "fade",
            })
        })
        .collect();
    serde_json::json!({
        "title": title,
        "cover_caption": "Cover",
        "hook": format!("{title}: the hook."),
        "music_mood": "dramatic",
        "voice_gender": "male",
        "character_description": null,
        "scenes": scenes,
        "total_duration_estimate": 0,
    })
    .to_string()
}

/// `secs` of 16-bit mono silence at 24 kHz.
#[allow(dead_code)]
pub fn silence_pcm(secs: f64) -> Vec<u8> {
    let samples = (24_000.0 * secs).round() as usize;
    vec![0u8; samples * 2]
}
