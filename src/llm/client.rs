// HTTP client for a generateContent-style vision endpoint

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::LlmConfig;
use crate::domain::{PipelineError, Result};

use super::{ExtractionRequest, ExtractionResponse, VisionModel};

/// JSON-mode vision client. The response schema rides along in the
/// generation config so the provider constrains decoding server-side.
pub struct HttpVisionClient {
    http: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl HttpVisionClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| PipelineError::config(format!("http client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl VisionModel for HttpVisionClient {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse> {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&request.image_png);

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.prompt },
                    { "inline_data": { "mime_type": "image/png", "data": image_b64 } }
                ]
            }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_output_tokens,
                "responseMimeType": "application/json",
                "responseSchema": request.response_schema,
            }
        });

        let mut http_request = self.http.post(self.request_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            http_request = http_request.header("x-goog-api-key", key);
        }

        let response = http_request.send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::DeadlineExceeded(format!("model call timed out: {}", e))
            } else {
                PipelineError::ModelTransport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PipelineError::Throttled(format!(
                "model rate limited: {}",
                status
            )));
        }
        if status.is_server_error() {
            return Err(PipelineError::ModelTransport(format!(
                "model returned {}",
                status
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::ModelResponse(format!(
                "model rejected request: {} {}",
                status, detail
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ModelResponse(format!("response body: {}", e)))?;

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PipelineError::ModelResponse(
                "model returned no text candidates".to_string(),
            ));
        }

        debug!(
            model = %self.config.model,
            response_chars = text.len(),
            "Model responded"
        );

        Ok(ExtractionResponse {
            text,
            model: self.config.model.clone(),
        })
    }
}
