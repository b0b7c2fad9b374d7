//! Read-only risk aggregation over the review record.

use crate::error::Result;
use crate::review::{AnswerPager, ExternalAnswer, ReviewApi, Risk};
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarSummary {
    pub id: String,
    pub name: String,
    pub total_questions: usize,
    pub answered_questions: usize,
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
}

impl PillarSummary {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            total_questions: 0,
            answered_questions: 0,
            high_risk_count: 0,
            medium_risk_count: 0,
        }
    }

    pub fn record(&mut self, risk: Risk) {
        self.total_questions += 1;
        if risk != Risk::Unanswered {
            self.answered_questions += 1;
        }
        match risk {
            Risk::High => self.high_risk_count += 1,
            Risk::Medium => self.medium_risk_count += 1,
            _ => {}
        }
    }

    pub fn record_all<'a>(&mut self, answers: impl IntoIterator<Item = &'a ExternalAnswer>) {
        for answer in answers {
            self.record(answer.risk);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarFailure {
    pub pillar_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub pillars: Vec<PillarSummary>,
    /// Pillars whose walk stopped early; their partial counts are still included
    pub failed_pillars: Vec<PillarFailure>,
}

impl RiskSummary {
    pub fn total_questions(&self) -> usize {
        self.pillars.iter().map(|p| p.total_questions).sum()
    }

    pub fn answered_questions(&self) -> usize {
        self.pillars.iter().map(|p| p.answered_questions).sum()
    }

    pub fn high_risks(&self) -> usize {
        self.pillars.iter().map(|p| p.high_risk_count).sum()
    }

    pub fn medium_risks(&self) -> usize {
        self.pillars.iter().map(|p| p.medium_risk_count).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_pillars.is_empty()
    }

    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.set_titles(row!["Pillar", "Questions Answered", "High Risks", "Medium Risks"]);
        for p in &self.pillars {
            table.add_row(row![
                p.name,
                format!("{}/{}", p.answered_questions, p.total_questions),
                p.high_risk_count,
                p.medium_risk_count
            ]);
        }
        table.to_string()
    }
}

/// Walk every pillar's answers and count risks.
///
/// Only a failure to list the pillars is an error. A page failure ends that pillar's
/// walk with whatever was counted so far and is recorded in `failed_pillars`.
pub async fn summarize_risks<A: ReviewApi + ?Sized>(
    api: &A,
    workload_id: &str,
    max_pages_per_pillar: usize,
) -> Result<RiskSummary> {
    let mut summary = RiskSummary::default();

    for pillar in api.get_pillar_summaries(workload_id).await? {
        let mut counts = PillarSummary::new(&pillar.pillar_id, &pillar.pillar_name);
        let mut pager = AnswerPager::new(api, workload_id, &pillar.pillar_id, max_pages_per_pillar);

        loop {
            match pager.next_page().await {
                Ok(Some(batch)) => counts.record_all(&batch),
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        "Error retrieving answers for pillar {}: {}",
                        pillar.pillar_id, e
                    );
                    summary.failed_pillars.push(PillarFailure {
                        pillar_id: pillar.pillar_id.clone(),
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }

        summary.pillars.push(counts);
    }

    info!(
        "Risk summary: {}/{} answered, {} high, {} medium",
        summary.answered_questions(),
        summary.total_questions(),
        summary.high_risks(),
        summary.medium_risks()
    );
    Ok(summary)
}
