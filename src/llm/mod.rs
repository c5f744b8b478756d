//! Vision model port and HTTP client.

pub mod client;
pub mod prompts;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::Result;

pub use client::HttpVisionClient;
pub use prompts::prompt_for;

/// One extraction call: a rendered page plus the instructions and the JSON
/// schema the model must conform to.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub prompt: String,
    pub image_png: Bytes,
    pub response_schema: serde_json::Value,
}

/// Raw model output; the extractor parses and validates `text`.
#[derive(Debug, Clone)]
pub struct ExtractionResponse {
    pub text: String,
    pub model: String,
}

/// Abstract vision LLM.
///
/// Transport problems, timeouts, and rate limiting are transient; a
/// response that is not the requested JSON is permanent.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse>;
}
