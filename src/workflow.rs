//! Action handlers behind the CLI: analyze, review, merge, risks, report.
//!
//! Each handler checks the session's transition rules first, performs its external calls
//! one at a time, and records its result on the session.

use crate::artifact::Artifact;
use crate::config::Config;
use crate::error::{Result, WaReviewError};
use crate::findings::{Finding, parse_findings};
use crate::generation::{TextGenerator, build_analysis_prompt};
use crate::merge::{ChoiceMerger, MergeOutcome, MergeSettings};
use crate::reconcile::{Reconciliation, reconcile};
use crate::report::download_report;
use crate::review::{AnswerPager, PillarAnswers, ReviewApi};
use crate::risk::{PillarFailure, RiskSummary, summarize_risks};
use crate::session::{Action, Session};
use crate::taxonomy::Taxonomy;
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// What the analyze step produced
#[derive(Debug, Clone)]
pub struct AnalysisSummary {
    pub findings: Vec<Finding>,
    /// Findings whose bracketed name is not a practice in the taxonomy
    pub unknown_practices: Vec<String>,
}

/// Reconciliation plus the pillars whose answers could not be read
#[derive(Debug, Clone)]
pub struct ReviewView {
    pub reconciliation: Reconciliation,
    pub pillar_errors: Vec<PillarFailure>,
}

pub struct Workflow<'a> {
    config: &'a Config,
    review_api: &'a dyn ReviewApi,
    generator: &'a dyn TextGenerator,
    http: reqwest::Client,
    taxonomy: OnceCell<Taxonomy>,
}

impl<'a> Workflow<'a> {
    pub fn new(
        config: &'a Config,
        review_api: &'a dyn ReviewApi,
        generator: &'a dyn TextGenerator,
    ) -> Self {
        Self {
            config,
            review_api,
            generator,
            http: reqwest::Client::new(),
            taxonomy: OnceCell::new(),
        }
    }

    /// Use an already loaded taxonomy instead of reading the configured source
    pub fn with_taxonomy(self, taxonomy: Taxonomy) -> Self {
        Self {
            taxonomy: OnceCell::from(taxonomy),
            ..self
        }
    }

    /// Loaded once per workflow; a failure here is fatal to the calling action.
    pub async fn taxonomy(&self) -> Result<&Taxonomy> {
        self.taxonomy
            .get_or_try_init(|| Taxonomy::load(&self.config.taxonomy.source, &self.http))
            .await
    }

    fn workload_id(&self) -> &str {
        &self.config.workload.workload_id
    }

    pub async fn analyze(&self, session: &mut Session, artifact: Artifact) -> Result<AnalysisSummary> {
        session.ensure(Action::Analyze)?;
        let taxonomy = self.taxonomy().await?;

        let prompt = build_analysis_prompt(&artifact, taxonomy)?;
        let text = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Analysis of {} failed: {}", artifact.name, e);
                session.record_analysis_failure(artifact);
                return Err(e);
            }
        };

        if text.trim().is_empty() {
            warn!("Analysis of {} returned no text", artifact.name);
            session.record_analysis_failure(artifact);
            return Err(WaReviewError::Generation {
                message: "the generation service returned an empty analysis".to_string(),
            });
        }

        let findings = parse_findings(&text);
        if findings.is_empty() {
            info!("Analysis returned no findings; nothing will be marked applied");
        }
        let unknown_practices: Vec<String> = findings
            .iter()
            .filter(|f| !taxonomy.entries().iter().any(|e| e.practice == f.practice_name))
            .map(|f| f.practice_name.clone())
            .collect();
        if !unknown_practices.is_empty() {
            warn!(
                "{} findings do not name a known practice exactly",
                unknown_practices.len()
            );
        }

        info!("Analysis of {} produced {} findings", artifact.name, findings.len());
        session.record_analysis(artifact, text, findings.clone());
        Ok(AnalysisSummary {
            findings,
            unknown_practices,
        })
    }

    /// Fetch every pillar's answers. A pillar whose walk fails is reported and skipped.
    pub async fn collect_answers(&self) -> Result<(Vec<PillarAnswers>, Vec<PillarFailure>)> {
        let mut collected = Vec::new();
        let mut failures = Vec::new();

        for pillar in self.review_api.get_pillar_summaries(self.workload_id()).await? {
            let pager = AnswerPager::new(
                self.review_api,
                self.workload_id(),
                &pillar.pillar_id,
                self.config.review_api.max_pages_per_pillar,
            );
            match pager.collect_all().await {
                Ok(answers) => collected.push(PillarAnswers { pillar, answers }),
                Err(e) => {
                    warn!("Couldn't read answers for {}: {}", pillar.pillar_id, e);
                    failures.push(PillarFailure {
                        pillar_id: pillar.pillar_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok((collected, failures))
    }

    /// Every pillar's answers, or the first failed read together with its pillar id.
    async fn read_all_answers(
        &self,
    ) -> std::result::Result<Vec<PillarAnswers>, (Option<String>, WaReviewError)> {
        let pillars = self
            .review_api
            .get_pillar_summaries(self.workload_id())
            .await
            .map_err(|e| (None, e))?;

        let mut collected = Vec::with_capacity(pillars.len());
        for pillar in pillars {
            let answers = AnswerPager::new(
                self.review_api,
                self.workload_id(),
                &pillar.pillar_id,
                self.config.review_api.max_pages_per_pillar,
            )
            .collect_all()
            .await
            .map_err(|e| (Some(pillar.pillar_id.clone()), e))?;
            collected.push(PillarAnswers { pillar, answers });
        }
        Ok(collected)
    }

    pub async fn review(&self, session: &Session) -> Result<ReviewView> {
        session.ensure(Action::Review)?;
        let findings = cached_findings(session)?;
        let taxonomy = self.taxonomy().await?;
        let (answers, pillar_errors) = self.collect_answers().await?;

        Ok(ReviewView {
            reconciliation: reconcile(taxonomy, findings, &answers),
            pillar_errors,
        })
    }

    /// Reconcile against the live record, then merge. An aborted merge comes back as an
    /// outcome with `MergeStatus::Aborted`; either way the session records it.
    ///
    /// Merge never runs on a partial view of prior selections. When the answers cannot be
    /// read in full, the attempt is recorded as a failed merge and the read error is
    /// returned as is.
    pub async fn merge(&self, session: &mut Session) -> Result<MergeOutcome> {
        session.ensure(Action::Merge)?;
        let taxonomy = self.taxonomy().await?;
        let answers = match self.read_all_answers().await {
            Ok(answers) => answers,
            Err((pillar_id, e)) => {
                warn!(
                    "Merge stopped before any update, answers for {} unreadable: {}",
                    pillar_id.as_deref().unwrap_or("the pillar list"),
                    e
                );
                session.record_merge(&MergeOutcome::aborted(pillar_id.as_deref(), &e));
                return Err(e);
            }
        };

        let reconciliation = reconcile(taxonomy, cached_findings(session)?, &answers);
        let settings = MergeSettings::from_config(self.config);
        let outcome = ChoiceMerger::new(self.review_api, &settings)
            .merge(&reconciliation)
            .await;

        session.record_merge(&outcome);
        Ok(outcome)
    }

    pub async fn risks(&self, session: &Session) -> Result<RiskSummary> {
        session.ensure(Action::Risks)?;
        summarize_risks(
            self.review_api,
            self.workload_id(),
            self.config.review_api.max_pages_per_pillar,
        )
        .await
    }

    pub async fn report(&self, session: &mut Session, output: PathBuf) -> Result<usize> {
        session.ensure(Action::Report)?;
        let written = download_report(self.review_api, self.workload_id(), &output).await?;
        session.record_report(output);
        Ok(written)
    }
}

fn cached_findings(session: &Session) -> Result<&[Finding]> {
    session
        .analysis
        .as_ref()
        .map(|a| a.findings.as_slice())
        .ok_or_else(|| WaReviewError::transition("reconcile", "no analysis is cached"))
}
