use anyhow::Context as _;
use base64::Engine as _;

use crate::config::Settings;

pub fn generate_endpoint(base_url: &str, model: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/models/{model}:generateContent")
}

/// Binary part of a response (`inlineData`), already base64-decoded.
#[derive(Debug, Clone)]
pub struct InlineData {
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

/// Client for the `generateContent` family of endpoints used for manifests,
/// speech and images.
#[derive(Debug, Clone)]
pub struct GenaiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GenaiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_api_key()?;
        Self::new(&settings.api_base_url, api_key, settings.http_timeout)
    }

    /// Text generation constrained to a JSON response body.
    pub async fn generate_json(
        &self,
        model: &str,
        instructions: &str,
        input: &str,
    ) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": instructions }] },
            "contents": [{ "role": "user", "parts": [{ "text": input }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.8,
            },
        });
        let value = self.post(model, &body).await?;
        extract_text(&value).context("extract output text")
    }

    /// Single-voice speech synthesis; the payload is raw PCM without a container.
    pub async fn generate_speech(
        &self,
        model: &str,
        voice: &str,
        text: &str,
    ) -> anyhow::Result<InlineData> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
                },
            },
        });
        let value = self.post(model, &body).await?;
        extract_inline_data(&value).context("extract audio data")
    }

    pub async fn generate_image(&self, model: &str, prompt: &str) -> anyhow::Result<InlineData> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
        });
        let value = self.post(model, &body).await?;
        extract_inline_data(&value).context("extract image data")
    }

    async fn post(
        &self,
        model: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let endpoint = generate_endpoint(&self.base_url, model);
        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {endpoint}"))?;

        let status = response.status();
        let raw = response.text().await.context("read response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("generative API error ({status}): {message}");
        }

        serde_json::from_str(&raw).context("parse generative API response")
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn candidate_parts(value: &serde_json::Value) -> anyhow::Result<&Vec<serde_json::Value>> {
    let candidate = value
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| {
            let reason = value
                .pointer("/promptFeedback/blockReason")
                .and_then(|v| v.as_str())
                .unwrap_or("no candidates");
            anyhow::anyhow!("response has no candidates ({reason})")
        })?;
    candidate
        .pointer("/content/parts")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `content.parts` in candidate"))
}

fn extract_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let mut text = String::new();
    for part in candidate_parts(value)? {
        if let Some(part_text) = part.get("text").and_then(|v| v.as_str()) {
            text.push_str(part_text);
        }
    }

    if text.trim().is_empty() {
        anyhow::bail!("output text is empty");
    }
    Ok(text)
}

fn extract_inline_data(value: &serde_json::Value) -> anyhow::Result<InlineData> {
    for part in candidate_parts(value)? {
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let encoded = inline
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("inline data part has no `data`"))?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("decode base64 inline data")?;
        if data.is_empty() {
            anyhow::bail!("inline data is empty");
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        return Ok(InlineData { mime_type, data });
    }
    anyhow::bail!("response has no inline data part")
}
