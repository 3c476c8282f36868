//! OpenAI-compatible HTTP backend.
//!
//! Talks to any local server exposing the OpenAI API shape (llama.cpp,
//! vLLM, Ollama, LM Studio): vision chat-completions for captions and
//! `/v1/embeddings` for text and image vectors. Images travel as base64
//! data URLs, so image embedding requires a server hosting a multimodal
//! embedding model (e.g. a CLIP variant).
//!
//! Construction is cheap and never touches the network; weights live on the
//! server side, so "loading" this backend is just building the HTTP client.

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::InferenceBackend;
use crate::config::OpenAiSettings;

const CAPTION_PROMPT: &str =
    "Describe this image in one short sentence. Reply with the caption only, no preamble.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug)]
pub struct OpenAiCompatBackend {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    caption_model: String,
    embedding_model: String,
}

impl OpenAiCompatBackend {
    pub fn new(settings: &OpenAiSettings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            caption_model: settings.caption_model.clone(),
            embedding_model: settings.embedding_model.clone(),
        })
    }

    fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{endpoint}", self.base_url);
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let resp = req.send().with_context(|| format!("POST {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            bail!("provider error {status}: {text}");
        }
        resp.json().context("decode provider response")
    }

    fn embed(&self, input: serde_json::Value) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.embedding_model,
            "input": input,
        });
        let resp = self.post("embeddings", body)?;
        let embedding = resp
            .pointer("/data/0/embedding")
            .and_then(|v| v.as_array())
            .context("provider response has no embedding")?;
        let mut out = Vec::with_capacity(embedding.len());
        for component in embedding {
            let value = component
                .as_f64()
                .context("embedding component is not a number")?;
            out.push(value as f32);
        }
        if out.is_empty() {
            bail!("provider returned an empty embedding");
        }
        Ok(out)
    }
}

impl InferenceBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        super::registry::OPENAI_COMPAT_BACKEND
    }

    fn generate_caption(&self, image_path: &Path) -> Result<String> {
        let data_url = image_to_data_url(image_path)?;
        let body = json!({
            "model": self.caption_model,
            "stream": false,
            "temperature": 0.2,
            "messages": [
                {"role": "user", "content": [
                    {"type": "text", "text": CAPTION_PROMPT},
                    {"type": "image_url", "image_url": {"url": data_url}}
                ]}
            ]
        });
        let resp = self.post("chat/completions", body)?;
        let caption = resp
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .context("provider response has no caption content")?
            .trim()
            .to_string();
        if caption.is_empty() {
            bail!("provider returned an empty caption for {}", image_path.display());
        }
        debug!(path = %image_path.display(), caption = %caption, "caption generated");
        Ok(caption)
    }

    fn encode_image(&self, image_path: &Path) -> Result<Vec<f32>> {
        let data_url = image_to_data_url(image_path)?;
        self.embed(json!([data_url]))
            .with_context(|| format!("embed image {}", image_path.display()))
    }

    fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            bail!("cannot embed empty text");
        }
        self.embed(json!([text])).context("embed text query")
    }
}

fn image_to_data_url(image_path: &Path) -> Result<String> {
    let bytes =
        fs::read(image_path).with_context(|| format!("read image {}", image_path.display()))?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{};base64,{b64}", mime_for(image_path)))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tiff") => "image/tiff",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_falls_back_to_jpeg() {
        assert_eq!(mime_for(Path::new("x.png")), "image/png");
        assert_eq!(mime_for(Path::new("x.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("x")), "image/jpeg");
    }

    #[test]
    fn data_url_fails_for_missing_file() {
        assert!(image_to_data_url(Path::new("/no/such/image.png")).is_err());
    }
}
