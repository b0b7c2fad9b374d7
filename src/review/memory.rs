//! In-process review record with real pagination semantics.
//!
//! Test support only, compiled for unit tests and behind the `test-support` feature.
//! Failures can be injected per question (updates), per page (listing) and for
//! checkpoint creation.

use super::{AnswerPage, CheckpointRef, ExternalAnswer, PillarRef, ReviewApi};
use crate::error::{Result, WaReviewError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub question_id: String,
    pub selected_choice_ids: BTreeSet<String>,
    pub note: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    pillars: Vec<(PillarRef, Vec<ExternalAnswer>)>,
    failing_updates: HashSet<String>,
    failing_pages: HashSet<(String, usize)>,
    fail_checkpoint: bool,
    updates: Vec<UpdateCall>,
    checkpoints: Vec<(String, String)>,
    list_calls: usize,
    report: Vec<u8>,
}

#[derive(Debug)]
pub struct InMemoryReviewApi {
    page_size: usize,
    state: Mutex<MemoryState>,
}

impl InMemoryReviewApi {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_pillar(mut self, pillar: PillarRef, answers: Vec<ExternalAnswer>) -> Self {
        self.state.get_mut().pillars.push((pillar, answers));
        self
    }

    pub fn fail_update_for(mut self, question_id: &str) -> Self {
        self.state
            .get_mut()
            .failing_updates
            .insert(question_id.to_string());
        self
    }

    /// Make the `page_index`-th (0-based) ListAnswers page of a pillar fail
    pub fn fail_page(mut self, pillar_id: &str, page_index: usize) -> Self {
        self.state
            .get_mut()
            .failing_pages
            .insert((pillar_id.to_string(), page_index));
        self
    }

    pub fn fail_checkpoint(mut self) -> Self {
        self.state.get_mut().fail_checkpoint = true;
        self
    }

    pub fn with_report(mut self, bytes: Vec<u8>) -> Self {
        self.state.get_mut().report = bytes;
        self
    }

    pub async fn answer(&self, question_id: &str) -> Option<ExternalAnswer> {
        let state = self.state.lock().await;
        state
            .pillars
            .iter()
            .flat_map(|(_, answers)| answers.iter())
            .find(|a| a.question_id == question_id)
            .cloned()
    }

    pub async fn updates(&self) -> Vec<UpdateCall> {
        self.state.lock().await.updates.clone()
    }

    /// Names of the checkpoints created so far
    pub async fn checkpoints(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .checkpoints
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn list_calls(&self) -> usize {
        self.state.lock().await.list_calls
    }

    /// Unpaginated view of every answer, for comparing against paged walks
    pub async fn all_answers(&self) -> Vec<ExternalAnswer> {
        let state = self.state.lock().await;
        state
            .pillars
            .iter()
            .flat_map(|(_, answers)| answers.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl ReviewApi for InMemoryReviewApi {
    async fn get_pillar_summaries(&self, _workload_id: &str) -> Result<Vec<PillarRef>> {
        let state = self.state.lock().await;
        Ok(state.pillars.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn list_answers(
        &self,
        _workload_id: &str,
        pillar_id: &str,
        cursor: Option<&str>,
    ) -> Result<AnswerPage> {
        let mut state = self.state.lock().await;
        state.list_calls += 1;

        let offset = match cursor {
            None => 0,
            Some(c) => c.parse::<usize>().map_err(|_| {
                WaReviewError::review_api("ListAnswers", format!("invalid NextToken '{}'", c))
            })?,
        };
        let page_index = offset / self.page_size;
        if state
            .failing_pages
            .contains(&(pillar_id.to_string(), page_index))
        {
            return Err(WaReviewError::review_api(
                "ListAnswers",
                format!("injected failure on page {} of {}", page_index, pillar_id),
            ));
        }

        let answers = state
            .pillars
            .iter()
            .find(|(p, _)| p.pillar_id == pillar_id)
            .map(|(_, answers)| answers)
            .ok_or_else(|| {
                WaReviewError::review_api("ListAnswers", format!("unknown pillar {}", pillar_id))
            })?;

        let end = (offset + self.page_size).min(answers.len());
        let batch = answers.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_cursor = (end < answers.len()).then(|| end.to_string());

        Ok(AnswerPage {
            answers: batch,
            next_cursor,
        })
    }

    async fn update_answer(
        &self,
        _workload_id: &str,
        question_id: &str,
        selected_choice_ids: &BTreeSet<String>,
        note: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.failing_updates.contains(question_id) {
            return Err(WaReviewError::review_api(
                "UpdateAnswer",
                format!("injected failure for {}", question_id),
            ));
        }

        let answer = state
            .pillars
            .iter_mut()
            .flat_map(|(_, answers)| answers.iter_mut())
            .find(|a| a.question_id == question_id)
            .ok_or_else(|| {
                WaReviewError::review_api(
                    "UpdateAnswer",
                    format!("question {} not found", question_id),
                )
            })?;
        answer.selected_choice_ids = selected_choice_ids.clone();

        state.updates.push(UpdateCall {
            question_id: question_id.to_string(),
            selected_choice_ids: selected_choice_ids.clone(),
            note: note.to_string(),
        });
        Ok(())
    }

    async fn create_checkpoint(
        &self,
        _workload_id: &str,
        name: &str,
        idempotency_token: &str,
    ) -> Result<CheckpointRef> {
        let mut state = self.state.lock().await;
        if state.fail_checkpoint {
            return Err(WaReviewError::review_api(
                "CreateMilestone",
                "injected checkpoint failure",
            ));
        }
        state
            .checkpoints
            .push((name.to_string(), idempotency_token.to_string()));
        Ok(CheckpointRef {
            name: name.to_string(),
            milestone_number: Some(state.checkpoints.len() as i64),
        })
    }

    async fn get_review_report(&self, _workload_id: &str) -> Result<Vec<u8>> {
        Ok(self.state.lock().await.report.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::Risk;

    fn answer(id: &str) -> ExternalAnswer {
        ExternalAnswer {
            question_id: id.to_string(),
            question_title: id.to_uppercase(),
            selected_choice_ids: BTreeSet::new(),
            choices: vec![],
            risk: Risk::Unanswered,
        }
    }

    #[tokio::test]
    async fn test_pages_split_by_page_size() {
        let api = InMemoryReviewApi::new(2).with_pillar(
            PillarRef {
                pillar_id: "security".to_string(),
                pillar_name: "Security".to_string(),
            },
            vec![answer("a"), answer("b"), answer("c")],
        );
        let first = api.list_answers("wl", "security", None).await.unwrap();
        assert_eq!(first.answers.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));
        let second = api.list_answers("wl", "security", Some("2")).await.unwrap();
        assert_eq!(second.answers.len(), 1);
        assert_eq!(second.next_cursor, None);
        assert_eq!(api.list_calls().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_question_update_fails() {
        let api = InMemoryReviewApi::new(5);
        let err = api
            .update_answer("wl", "missing", &BTreeSet::new(), "n")
            .await
            .unwrap_err();
        assert!(matches!(err, WaReviewError::ReviewApi { .. }));
    }
}
