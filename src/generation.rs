//! Text-generation service used to judge which practices a template applies.
//!
//! The service is a black box: it receives one prompt and returns text that is expected
//! to contain `[<exact practice name>]: <justification>` lines.

use crate::artifact::Artifact;
use crate::config::Config;
use crate::error::{Result, WaReviewError};
use crate::taxonomy::Taxonomy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Messages-style completion client
pub struct MessagesClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    anthropic_version: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    anthropic_version: &'a str,
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
struct ContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesClient {
    pub fn new(
        endpoint: String,
        model: String,
        max_tokens: u32,
        anthropic_version: String,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| WaReviewError::Generation {
            message: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self {
            client,
            endpoint,
            model,
            max_tokens,
            anthropic_version,
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.generation.endpoint.clone(),
            config.generation.model.clone(),
            config.generation.max_tokens,
            config.generation.anthropic_version.clone(),
            config.runtime.generation_api_key.clone(),
            config.runtime.request_timeout_ms.map(Duration::from_millis),
        )
    }
}

#[async_trait]
impl TextGenerator for MessagesClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting analysis (model={}, prompt chars={})",
            self.model,
            prompt.len()
        );

        let body = MessagesRequest {
            anthropic_version: &self.anthropic_version,
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: vec![ContentBlock {
                    kind: "text",
                    text: prompt,
                }],
            }],
        };

        let mut rb = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }
        let response = rb.send().await.map_err(|e| WaReviewError::Generation {
            message: format!("request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WaReviewError::Generation {
                message: format!("service error {}: {}", status, error_text),
            });
        }

        let parsed: MessagesResponse =
            response.json().await.map_err(|e| WaReviewError::Generation {
                message: format!("malformed response: {}", e),
            })?;

        Ok(parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Prompt asking for one `[name]: reason` line per applied practice
pub fn build_analysis_prompt(artifact: &Artifact, taxonomy: &Taxonomy) -> Result<String> {
    let best_practices = taxonomy.to_prompt_json()?;
    Ok(format!(
        r#"Analyze the following infrastructure-as-code template.
Template reference: {location}

Template contents:
{contents}

For each of the following best practices, determine if it is applied in the given template.

Best Practices:
{best_practices}

For each best practice that is applied, respond in the following EXACT format only, one per line:
[Exact Best Practice Name as given in Best Practices]: [Why do you consider this best practice applied?]

IMPORTANT: Use the EXACT best practice name as given in the Best Practices.
Do not rephrase or summarize the practice name. List only the practices which are applied."#,
        location = artifact.location,
        contents = artifact.contents,
        best_practices = best_practices,
    ))
}
