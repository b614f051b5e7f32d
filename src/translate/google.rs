// src/translate/google.rs
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::Translator;
use crate::error::TranslationError;

pub const DEFAULT_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Google web translation endpoint (`client=gtx`, source language auto-detected).
pub struct GoogleTranslator {
    http: Client,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(endpoint: Option<&str>, timeout_secs: u64) -> Result<Self, TranslationError> {
        let http = Client::builder()
            .user_agent("hf-papers-feed/0.1")
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TranslationError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
        })
    }
}

/// The response is a nested array; segment `i` carries its translation at `[0][i][0]`.
pub fn parse_response(body: &str) -> Result<String, TranslationError> {
    let v: serde_json::Value =
        serde_json::from_str(body).map_err(|e| TranslationError::Malformed(e.to_string()))?;
    let segments = v
        .get(0)
        .and_then(|s| s.as_array())
        .ok_or_else(|| TranslationError::Malformed("missing segment array".to_string()))?;

    let mut out = String::new();
    for seg in segments {
        if let Some(piece) = seg.get(0).and_then(|p| p.as_str()) {
            out.push_str(piece);
        }
    }
    let out = out.trim().to_string();
    if out.is_empty() {
        Err(TranslationError::Empty)
    } else {
        Ok(out)
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, lang: &str) -> Result<String, TranslationError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| TranslationError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TranslationError::Status(status.as_u16()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| TranslationError::Transport(e.to_string()))?;
        parse_response(&body)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}
