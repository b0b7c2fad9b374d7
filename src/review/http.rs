//! reqwest client for the review service's REST layout.
//!
//! Request signing is expected to happen in front of `base_url` (a signing proxy or
//! gateway); this client only attaches an optional bearer token.

use super::{AnswerPage, CheckpointRef, ExternalAnswer, PillarRef, ReviewApi};
use crate::config::Config;
use crate::error::{Result, WaReviewError};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Deserialize, Default)]
struct LensReviewResponse {
    #[serde(rename = "LensReview", default)]
    lens_review: LensReview,
}

#[derive(Deserialize, Default)]
struct LensReview {
    #[serde(rename = "PillarReviewSummaries", default)]
    pillar_review_summaries: Vec<PillarRef>,
}

#[derive(Deserialize)]
struct ListAnswersResponse {
    #[serde(rename = "AnswerSummaries", default)]
    answer_summaries: Vec<ExternalAnswer>,
    #[serde(rename = "NextToken", default)]
    next_token: Option<String>,
}

#[derive(Serialize)]
struct UpdateAnswerRequest<'a> {
    #[serde(rename = "SelectedChoices")]
    selected_choices: Vec<&'a str>,
    #[serde(rename = "Notes")]
    notes: &'a str,
}

#[derive(Serialize)]
struct CreateMilestoneRequest<'a> {
    #[serde(rename = "MilestoneName")]
    milestone_name: &'a str,
    #[serde(rename = "ClientRequestToken")]
    client_request_token: &'a str,
}

#[derive(Deserialize)]
struct CreateMilestoneResponse {
    #[serde(rename = "MilestoneNumber", default)]
    milestone_number: Option<i64>,
}

#[derive(Deserialize)]
struct ReportResponse {
    #[serde(rename = "LensReviewReport", default)]
    lens_review_report: Option<ReportBody>,
}

#[derive(Deserialize)]
struct ReportBody {
    #[serde(rename = "Base64String", default)]
    base64_string: Option<String>,
}

#[derive(Deserialize)]
struct ServiceError {
    #[serde(rename = "Message", alias = "message", default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpReviewClient {
    client: Client,
    base_url: Url,
    lens_alias: String,
    token: Option<String>,
}

impl HttpReviewClient {
    pub fn new(
        base_url: &str,
        lens_alias: &str,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| WaReviewError::Config {
            message: format!("invalid review API url '{}': {}", base_url, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(WaReviewError::Config {
                message: format!("review API url '{}' cannot be a base", base_url),
            });
        }

        let mut builder = Client::builder().user_agent(format!(
            "wa-review/{} (lens={})",
            env!("CARGO_PKG_VERSION"),
            lens_alias
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url,
            lens_alias: lens_alias.to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.review_api.base_url,
            &config.workload.lens_alias,
            config.runtime.review_api_token.clone(),
            config.runtime.request_timeout_ms.map(Duration::from_millis),
        )
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| WaReviewError::Config {
                message: format!("review API url '{}' cannot be a base", self.base_url),
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn lens_review_url(&self, workload_id: &str, rest: &[&str]) -> Result<Url> {
        let mut segments = vec!["workloads", workload_id, "lensReviews", self.lens_alias.as_str()];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let rb = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Send and fail on any non-2xx status, surfacing the service's message when present
    async fn send(&self, operation: &str, rb: RequestBuilder) -> Result<reqwest::Response> {
        let resp = rb
            .send()
            .await
            .map_err(|e| WaReviewError::review_api(operation, format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ServiceError>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(WaReviewError::review_api(
                operation,
                format!("{}: {}", status, detail),
            ));
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, operation: &str, rb: RequestBuilder) -> Result<T> {
        self.send(operation, rb).await?.json::<T>().await.map_err(|e| {
            WaReviewError::review_api(operation, format!("malformed response: {}", e))
        })
    }
}

#[async_trait]
impl ReviewApi for HttpReviewClient {
    async fn get_pillar_summaries(&self, workload_id: &str) -> Result<Vec<PillarRef>> {
        let url = self.lens_review_url(workload_id, &[])?;
        let resp: LensReviewResponse = self
            .send_json("GetLensReview", self.request(Method::GET, url))
            .await?;
        debug!(
            "Lens review lists {} pillars",
            resp.lens_review.pillar_review_summaries.len()
        );
        Ok(resp.lens_review.pillar_review_summaries)
    }

    async fn list_answers(
        &self,
        workload_id: &str,
        pillar_id: &str,
        cursor: Option<&str>,
    ) -> Result<AnswerPage> {
        let url = self.lens_review_url(workload_id, &["answers"])?;
        let mut query: Vec<(&str, &str)> = vec![("PillarId", pillar_id)];
        if let Some(cursor) = cursor {
            query.push(("NextToken", cursor));
        }
        let resp: ListAnswersResponse = self
            .send_json("ListAnswers", self.request(Method::GET, url).query(&query))
            .await?;
        Ok(AnswerPage {
            answers: resp.answer_summaries,
            next_cursor: resp.next_token,
        })
    }

    async fn update_answer(
        &self,
        workload_id: &str,
        question_id: &str,
        selected_choice_ids: &BTreeSet<String>,
        note: &str,
    ) -> Result<()> {
        let url = self.lens_review_url(workload_id, &["answers", question_id])?;
        let body = UpdateAnswerRequest {
            selected_choices: selected_choice_ids.iter().map(String::as_str).collect(),
            notes: note,
        };
        self.send("UpdateAnswer", self.request(Method::PATCH, url).json(&body))
            .await?;
        info!(
            "Updated question {} with {} choices",
            question_id,
            selected_choice_ids.len()
        );
        Ok(())
    }

    async fn create_checkpoint(
        &self,
        workload_id: &str,
        name: &str,
        idempotency_token: &str,
    ) -> Result<CheckpointRef> {
        let url = self.url(&["workloads", workload_id, "milestones"])?;
        let body = CreateMilestoneRequest {
            milestone_name: name,
            client_request_token: idempotency_token,
        };
        let resp: CreateMilestoneResponse = self
            .send_json("CreateMilestone", self.request(Method::POST, url).json(&body))
            .await?;
        Ok(CheckpointRef {
            name: name.to_string(),
            milestone_number: resp.milestone_number,
        })
    }

    async fn get_review_report(&self, workload_id: &str) -> Result<Vec<u8>> {
        let url = self.lens_review_url(workload_id, &["report"])?;
        let resp: ReportResponse = self
            .send_json("GetLensReviewReport", self.request(Method::GET, url))
            .await?;
        let encoded = resp
            .lens_review_report
            .and_then(|r| r.base64_string)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                WaReviewError::review_api("GetLensReviewReport", "report data missing")
            })?;
        Ok(base64::engine::general_purpose::STANDARD.decode(encoded.trim())?)
    }
}
