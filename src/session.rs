//! Operator session: what has been done so far and which actions that unlocks.
//!
//! Persisted as JSON between CLI invocations. Transitions:
//! - analyze: needs an artifact. Success enables review/merge and disables report;
//!   failure disables review, merge and report.
//! - review, merge: need a cached analysis.
//! - merge failure keeps merge available and report disabled; success enables risks and
//!   report.
//! - risks, report: need a successful merge.

use crate::artifact::Artifact;
use crate::error::{Result, WaReviewError};
use crate::findings::Finding;
use crate::merge::{MergeOutcome, MergeStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Fresh,
    AnalysisFailed,
    Analyzed,
    MergeFailed,
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Analyze,
    Review,
    Merge,
    Risks,
    Report,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Analyze => "analyze",
            Action::Review => "review",
            Action::Merge => "merge",
            Action::Risks => "risks",
            Action::Report => "report",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub text: String,
    pub findings: Vec<Finding>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub succeeded: bool,
    pub updated_questions: usize,
    pub error: Option<String>,
    pub merged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub stage: Stage,
    pub artifact: Option<Artifact>,
    pub analysis: Option<AnalysisRecord>,
    pub last_merge: Option<MergeRecord>,
    pub report_path: Option<PathBuf>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk; a missing file is a fresh session.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub fn is_enabled(&self, action: Action) -> bool {
        self.check(action).is_ok()
    }

    pub fn enabled_actions(&self) -> Vec<Action> {
        [
            Action::Analyze,
            Action::Review,
            Action::Merge,
            Action::Risks,
            Action::Report,
        ]
        .into_iter()
        .filter(|a| self.is_enabled(*a))
        .collect()
    }

    /// Fail with `InvalidTransition` when `action` is not allowed yet.
    pub fn ensure(&self, action: Action) -> Result<()> {
        self.check(action)
            .map_err(|reason| WaReviewError::transition(action.to_string(), reason))
    }

    fn check(&self, action: Action) -> std::result::Result<(), &'static str> {
        match action {
            Action::Analyze => Ok(()),
            Action::Review | Action::Merge => {
                if self.analysis.is_some() {
                    Ok(())
                } else {
                    Err("no successful analysis is cached; run analyze first")
                }
            }
            Action::Risks | Action::Report => {
                if self.stage == Stage::Merged {
                    Ok(())
                } else {
                    Err("the review has not been merged successfully yet")
                }
            }
        }
    }

    pub fn record_analysis(&mut self, artifact: Artifact, text: String, findings: Vec<Finding>) {
        self.artifact = Some(artifact);
        self.analysis = Some(AnalysisRecord {
            text,
            findings,
            analyzed_at: Utc::now(),
        });
        self.stage = Stage::Analyzed;
        self.report_path = None;
    }

    pub fn record_analysis_failure(&mut self, artifact: Artifact) {
        self.artifact = Some(artifact);
        self.analysis = None;
        self.stage = Stage::AnalysisFailed;
        self.report_path = None;
    }

    pub fn record_merge(&mut self, outcome: &MergeOutcome) {
        let error = match &outcome.status {
            MergeStatus::Completed => None,
            MergeStatus::Aborted { error, .. } => Some(error.clone()),
        };
        self.stage = if outcome.is_success() {
            Stage::Merged
        } else {
            Stage::MergeFailed
        };
        self.last_merge = Some(MergeRecord {
            succeeded: outcome.is_success(),
            updated_questions: outcome.updated.len(),
            error,
            merged_at: Utc::now(),
        });
    }

    pub fn record_report(&mut self, path: PathBuf) {
        self.report_path = Some(path);
    }
}
