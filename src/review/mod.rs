//! The external review record: types and the API seam.
//!
//! The review system owns the answers. This crate only reads pages of them and writes
//! back merged choice sets, so everything here mirrors the service's wire shapes.

pub mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod pager;

pub use http::HttpReviewClient;
#[cfg(any(test, feature = "test-support"))]
pub use memory::InMemoryReviewApi;
pub use pager::AnswerPager;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarRef {
    #[serde(rename = "PillarId")]
    pub pillar_id: String,
    #[serde(rename = "PillarName", default)]
    pub pillar_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(rename = "ChoiceId")]
    pub choice_id: String,
    #[serde(rename = "Title", default)]
    pub title: String,
}

/// Risk attached to a question by the review system. A missing value reads as unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Risk {
    #[default]
    Unanswered,
    Low,
    Medium,
    High,
    None,
    NotApplicable,
    /// Any level this crate does not know; the question still counts as answered
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAnswer {
    #[serde(rename = "QuestionId")]
    pub question_id: String,
    #[serde(rename = "QuestionTitle", default)]
    pub question_title: String,
    /// Authoritative prior state; the engine only ever adds to it
    #[serde(rename = "SelectedChoices", default)]
    pub selected_choice_ids: BTreeSet<String>,
    #[serde(rename = "Choices", default)]
    pub choices: Vec<Choice>,
    #[serde(rename = "Risk", default)]
    pub risk: Risk,
}

impl ExternalAnswer {
    pub fn is_selected(&self, choice_id: &str) -> bool {
        self.selected_choice_ids.contains(choice_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerPage {
    pub answers: Vec<ExternalAnswer>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRef {
    pub name: String,
    pub milestone_number: Option<i64>,
}

/// Calls the engine makes against the review system. None are retried.
#[async_trait]
pub trait ReviewApi: Send + Sync {
    async fn get_pillar_summaries(&self, workload_id: &str) -> Result<Vec<PillarRef>>;

    async fn list_answers(
        &self,
        workload_id: &str,
        pillar_id: &str,
        cursor: Option<&str>,
    ) -> Result<AnswerPage>;

    async fn update_answer(
        &self,
        workload_id: &str,
        question_id: &str,
        selected_choice_ids: &BTreeSet<String>,
        note: &str,
    ) -> Result<()>;

    async fn create_checkpoint(
        &self,
        workload_id: &str,
        name: &str,
        idempotency_token: &str,
    ) -> Result<CheckpointRef>;

    /// Binary report artifact, passed through unmodified
    async fn get_review_report(&self, workload_id: &str) -> Result<Vec<u8>>;
}

/// All answers fetched for one pillar, used as the reconciliation input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PillarAnswers {
    pub pillar: PillarRef,
    pub answers: Vec<ExternalAnswer>,
}
