//! Generation backend — turns a completed answer map into one
//! recommendation request against Ollama.
//!
//! Stateless by design: one outbound request per call, no retry, no
//! caching. The backend is non-deterministic, so identical answer maps
//! may produce different text across calls.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::catalog::Catalog;
use crate::error::LlmError;

/// Anything that can turn a completed answer map into recommendation text.
#[async_trait]
pub trait SuggestionBackend: Send + Sync {
    async fn recommend(
        &self,
        answers: &HashMap<String, String>,
        catalog: &Catalog,
    ) -> Result<String, LlmError>;
}

/// Build the single deterministic prompt: one `"<id>: <label>"` line per
/// answered catalog question, in catalog order, wrapped in fixed
/// instructional text.
pub fn build_prompt(answers: &HashMap<String, String>, catalog: &Catalog) -> String {
    let lines: Vec<String> = catalog
        .definitions()
        .iter()
        .filter_map(|q| answers.get(&q.id).map(|label| format!("{}: {label}", q.id)))
        .collect();

    format!(
        "با توجه به پاسخ‌های کاربر، لطفا یک فیلم یا سریال یا انیمه پیشنهاد بده \
         و دلیل پیشنهادت رو توضیح بده.\n\
         پاسخ‌های کاربر:\n\
         {}\n\n\
         لطفا پاسخ رو به این صورت بده:\n\
         عنوان:\n\
         نوع: (فیلم/سریال/انیمه)\n\
         سال ساخت:\n\
         خلاصه:\n\
         چرا این پیشنهاد:",
        lines.join("\n")
    )
}

/// Client for Ollama's `/api/generate` endpoint.
pub struct OllamaClient {
    host: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(host: String, model: String) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.host)
    }
}

#[async_trait]
impl SuggestionBackend for OllamaClient {
    async fn recommend(
        &self,
        answers: &HashMap<String, String>,
        catalog: &Catalog,
    ) -> Result<String, LlmError> {
        let prompt = build_prompt(answers, catalog);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let resp = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(LlmError::RequestFailed {
                reason: format!("generate returned {}", resp.status()),
            });
        }

        let data: GenerateResponse =
            resp.json().await.map_err(|e| LlmError::InvalidResponse {
                reason: e.to_string(),
            })?;

        Ok(data.response)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
