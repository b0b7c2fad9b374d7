//! Pushes newly found practices into the external review record.
//!
//! For every pillar the merger reads the latest answer pages, unions the resolved choice
//! ids into each answer's existing selection, and writes the union back. The union is
//! monotonic: selections are never removed. Writes are not version-checked, so a second
//! concurrent writer can clobber an update; the tool assumes a single operator.
//!
//! The first failed call aborts the remaining work. Updates already committed stay
//! committed and are reported in [`MergeOutcome::updated`].

use crate::config::Config;
use crate::reconcile::Reconciliation;
use crate::review::{AnswerPager, CheckpointRef, ExternalAnswer, PillarRef, ReviewApi};
use crate::taxonomy::strip_enumeration;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MergeSettings {
    pub workload_id: String,
    pub update_note: String,
    pub max_pages_per_pillar: usize,
    pub milestone_prefix: String,
}

impl MergeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workload_id: config.workload.workload_id.clone(),
            update_note: config.review_api.update_note.clone(),
            max_pages_per_pillar: config.review_api.max_pages_per_pillar,
            milestone_prefix: config.review_api.milestone_prefix.clone(),
        }
    }
}

/// One committed answer update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerUpdate {
    pub pillar_id: String,
    pub question_id: String,
    pub question_title: String,
    pub before: BTreeSet<String>,
    pub after: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStatus {
    Completed,
    /// `pillar_id` is `None` when the pillar list itself could not be read
    Aborted {
        pillar_id: Option<String>,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointOutcome {
    NotAttempted,
    Created(CheckpointRef),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub status: MergeStatus,
    pub updated: Vec<AnswerUpdate>,
    /// Questions with matched practices whose selection already covered them
    pub skipped_questions: Vec<String>,
    /// Newly found practices that no choice title resolved to
    pub unresolved_practices: Vec<String>,
    pub checkpoint: CheckpointOutcome,
}

impl MergeOutcome {
    fn new() -> Self {
        Self {
            status: MergeStatus::Completed,
            updated: Vec::new(),
            skipped_questions: Vec::new(),
            unresolved_practices: Vec::new(),
            checkpoint: CheckpointOutcome::NotAttempted,
        }
    }

    /// An attempt that stopped before any answer was written
    pub fn aborted(pillar_id: Option<&str>, error: impl ToString) -> Self {
        Self::new().abort(pillar_id, error)
    }

    pub fn is_success(&self) -> bool {
        self.status == MergeStatus::Completed
    }

    fn abort(mut self, pillar_id: Option<&str>, error: impl ToString) -> Self {
        self.status = MergeStatus::Aborted {
            pillar_id: pillar_id.map(str::to_string),
            error: error.to_string(),
        };
        self
    }
}

pub fn milestone_name(prefix: &str) -> String {
    format!("{} {}", prefix, Local::now().format("%Y-%m-%d %H:%M:%S"))
}

pub struct ChoiceMerger<'a, A: ReviewApi + ?Sized> {
    api: &'a A,
    settings: &'a MergeSettings,
}

impl<'a, A: ReviewApi + ?Sized> ChoiceMerger<'a, A> {
    pub fn new(api: &'a A, settings: &'a MergeSettings) -> Self {
        Self { api, settings }
    }

    pub async fn merge(&self, reconciliation: &Reconciliation) -> MergeOutcome {
        let workload_id = self.settings.workload_id.as_str();
        let mut outcome = MergeOutcome::new();

        let pillars = match self.api.get_pillar_summaries(workload_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Could not list pillars for {}: {}", workload_id, e);
                return outcome.abort(None, e);
            }
        };

        for pillar in &pillars {
            info!("Processing pillar {}", pillar.pillar_id);
            let mut pager = AnswerPager::new(
                self.api,
                workload_id,
                &pillar.pillar_id,
                self.settings.max_pages_per_pillar,
            );

            loop {
                let batch = match pager.next_page().await {
                    Ok(Some(batch)) => batch,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Listing answers for pillar {} failed: {}", pillar.pillar_id, e);
                        return outcome.abort(Some(&pillar.pillar_id), e);
                    }
                };

                for answer in &batch {
                    if let Err(e) = self
                        .merge_answer(pillar, answer, reconciliation, &mut outcome)
                        .await
                    {
                        warn!(
                            "Updating question {} in pillar {} failed: {}",
                            answer.question_id, pillar.pillar_id, e
                        );
                        return outcome.abort(Some(&pillar.pillar_id), e);
                    }
                }
            }
        }

        let name = milestone_name(&self.settings.milestone_prefix);
        let token = uuid::Uuid::new_v4().to_string();
        outcome.checkpoint = match self.api.create_checkpoint(workload_id, &name, &token).await {
            Ok(checkpoint) => {
                info!("Milestone '{}' created", checkpoint.name);
                CheckpointOutcome::Created(checkpoint)
            }
            Err(e) => {
                warn!("Error creating milestone: {}", e);
                CheckpointOutcome::Failed(e.to_string())
            }
        };

        outcome
    }

    async fn merge_answer(
        &self,
        pillar: &PillarRef,
        answer: &ExternalAnswer,
        reconciliation: &Reconciliation,
        outcome: &mut MergeOutcome,
    ) -> crate::error::Result<()> {
        let mut matched_any = false;
        let mut resolved: BTreeSet<String> = BTreeSet::new();

        for group in
            reconciliation.for_answer(&pillar.pillar_id, &pillar.pillar_name, &answer.question_title)
        {
            for practice in group.newly_found() {
                matched_any = true;
                match resolve_choice(strip_enumeration(&practice.practice), answer) {
                    Some(choice_id) => {
                        debug!("Practice '{}' resolved to {}", practice.practice, choice_id);
                        resolved.insert(choice_id.to_string());
                    }
                    None => {
                        warn!(
                            "No choice under '{}' matches practice '{}'",
                            answer.question_title, practice.practice
                        );
                        outcome.unresolved_practices.push(practice.practice.clone());
                    }
                }
            }
        }

        if !matched_any {
            return Ok(());
        }

        let merged = merge_choices(&answer.selected_choice_ids, &resolved);
        if merged == answer.selected_choice_ids {
            outcome.skipped_questions.push(answer.question_id.clone());
            return Ok(());
        }

        self.api
            .update_answer(
                &self.settings.workload_id,
                &answer.question_id,
                &merged,
                &self.settings.update_note,
            )
            .await?;
        info!(
            "Updated question '{}' with choices {:?}",
            answer.question_title, merged
        );

        outcome.updated.push(AnswerUpdate {
            pillar_id: pillar.pillar_id.clone(),
            question_id: answer.question_id.clone(),
            question_title: answer.question_title.clone(),
            before: answer.selected_choice_ids.clone(),
            after: merged,
        });
        Ok(())
    }
}

/// Exact, case-folded match of the practice text against the answer's choice titles
pub fn resolve_choice<'a>(normalized_practice: &str, answer: &'a ExternalAnswer) -> Option<&'a str> {
    let needle = normalized_practice.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    answer
        .choices
        .iter()
        .find(|c| c.title.trim().to_lowercase() == needle)
        .map(|c| c.choice_id.as_str())
}

/// Existing selection plus the resolved ids; never drops an existing id.
pub fn merge_choices(existing: &BTreeSet<String>, resolved: &BTreeSet<String>) -> BTreeSet<String> {
    existing.union(resolved).cloned().collect()
}
