//! Structured-output generation backend.
//!
//! The backend is treated as an opaque function: a fixed instruction plus the
//! normalized request in, `{html, reasoning}` out. Failures are not retried here.

mod openai;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::GenerationRequest;

pub use openai::OpenAiGenerator;
pub use prompt::ModelOutput;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub output: ModelOutput,
    pub usage: Option<Usage>,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request to generation backend failed: {0}")]
    Http(reqwest::Error),
    #[error("generation backend timed out")]
    Timeout,
    #[error("generation backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation backend returned an empty response")]
    EmptyResponse,
    #[error("generation backend refused: {0}")]
    Refused(String),
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        // 客户端自身的超时与外层超时同等对待
        if e.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Http(e)
        }
    }
}

#[async_trait]
pub trait ButtonGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError>;

    fn model(&self) -> &str;
}
