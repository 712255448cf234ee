//! OpenAI Responses API backend with JSON-schema structured output.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error};

use super::prompt::{SCHEMA_NAME, SYSTEM_INSTRUCTION, parse_model_output, response_schema};
use super::{ButtonGenerator, Generation, GenerationError, Usage};
use crate::normalize::GenerationRequest;

pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    /// `timeout` bounds the whole HTTP exchange; the caller applies its own
    /// deadline on top.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build HTTP client with custom timeout, using default client");
                Client::new()
            });

        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn responses_url(&self) -> String {
        format!("{}/responses", self.base_url)
    }

    fn to_request_body(&self, request: &GenerationRequest) -> ResponsesRequest {
        ResponsesRequest {
            model: self.model.clone(),
            instructions: SYSTEM_INSTRUCTION,
            input: request.to_prompt_payload().to_string(),
            text: json!({
                "format": {
                    "type": "json_schema",
                    "name": SCHEMA_NAME,
                    "strict": true,
                    "schema": response_schema(),
                }
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    instructions: &'static str,
    input: String,
    text: Value,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
    refusal: Option<String>,
}

/// Concatenated `output_text` of all message items.
fn extract_output_text(response: &ResponsesResponse) -> Result<String, GenerationError> {
    let mut text = String::new();
    for item in response.output.iter().filter(|i| i.kind == "message") {
        for part in &item.content {
            match part.kind.as_str() {
                "output_text" => text.push_str(part.text.as_deref().unwrap_or_default()),
                "refusal" => {
                    return Err(GenerationError::Refused(
                        part.refusal.clone().unwrap_or_default(),
                    ));
                }
                _ => {}
            }
        }
    }
    Ok(text)
}

#[async_trait]
impl ButtonGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let body = self.to_request_body(request);
        debug!(model = %body.model, "Sending request to OpenAI Responses API");

        let response = self
            .client
            .post(self.responses_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let parsed: ResponsesResponse = response.json().await?;
        let text = extract_output_text(&parsed)?;
        let output = parse_model_output(&text)?;

        Ok(Generation {
            output,
            usage: parsed.usage,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
