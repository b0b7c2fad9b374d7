//! Best-practice taxonomy: the fixed catalog of (pillar, question, practice) triples.
//!
//! The catalog is read once from a CSV with the columns `Pillar`, `Question` and
//! `Best Practice`, either from disk or over HTTP, and is immutable afterwards.

use crate::error::{Result, WaReviewError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use tracing::{debug, info, warn};

/// Separator between the human label and the canonical question title
pub const QUESTION_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxonomyEntry {
    pub pillar: String,
    pub question: String,
    pub practice: String,
}

#[derive(Debug, Deserialize)]
struct TaxonomyRow {
    #[serde(rename = "Pillar")]
    pillar: String,
    #[serde(rename = "Question")]
    question: String,
    #[serde(rename = "Best Practice")]
    practice: String,
}

/// All practices recorded under one (pillar, question) pair, in file order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionGroup {
    pub pillar: String,
    pub question: String,
    pub practices: Vec<String>,
}

impl QuestionGroup {
    /// The part of the question that the review system uses as its title
    pub fn question_key(&self) -> &str {
        canonical_question_suffix(&self.question)
    }

    pub fn matches_title(&self, question_title: &str) -> bool {
        question_key_matches(self.question_key(), question_title)
    }
}

/// Text after the first `" - "`, or the whole question when there is no separator.
pub fn canonical_question_suffix(question: &str) -> &str {
    match question.split_once(QUESTION_SEPARATOR) {
        Some((_, suffix)) => suffix.trim(),
        None => question.trim(),
    }
}

/// Drop the leading enumeration token ("OPS01-BP01", "a.", "3") and trim.
pub fn strip_enumeration(practice: &str) -> &str {
    practice
        .trim()
        .split_once(' ')
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}

pub fn question_key_matches(question_key: &str, question_title: &str) -> bool {
    question_key
        .trim()
        .eq_ignore_ascii_case(question_title.trim())
}

/// Whether a taxonomy pillar name refers to the review system's pillar.
///
/// Names match ignoring ASCII case; otherwise the space-stripped, lower-cased taxonomy
/// name must start with the lower-cased pillar id ("Operational Excellence" vs
/// "operationalExcellence").
pub fn pillar_matches(taxonomy_pillar: &str, pillar_id: &str, pillar_name: &str) -> bool {
    if taxonomy_pillar.trim().eq_ignore_ascii_case(pillar_name.trim()) {
        return true;
    }
    let id = pillar_id.trim().to_lowercase();
    if id.is_empty() {
        return false;
    }
    let squashed: String = taxonomy_pillar
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    squashed.starts_with(&id)
}

#[derive(Debug, Clone)]
pub struct Taxonomy {
    entries: Vec<TaxonomyEntry>,
    groups: Vec<QuestionGroup>,
}

impl Taxonomy {
    pub fn from_entries(entries: Vec<TaxonomyEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(WaReviewError::TaxonomyUnavailable {
                message: "no best practices could be loaded".to_string(),
            });
        }

        let mut seen: HashSet<(String, String, String)> = HashSet::new();
        let mut kept = Vec::with_capacity(entries.len());
        let mut groups: Vec<QuestionGroup> = Vec::new();

        for entry in entries {
            let key = (
                entry.pillar.clone(),
                entry.question.clone(),
                entry.practice.clone(),
            );
            if !seen.insert(key) {
                warn!(
                    "Duplicate practice '{}' under '{}' dropped",
                    entry.practice, entry.question
                );
                continue;
            }

            match groups
                .iter_mut()
                .find(|g| g.pillar == entry.pillar && g.question == entry.question)
            {
                Some(group) => group.practices.push(entry.practice.clone()),
                None => groups.push(QuestionGroup {
                    pillar: entry.pillar.clone(),
                    question: entry.question.clone(),
                    practices: vec![entry.practice.clone()],
                }),
            }
            kept.push(entry);
        }

        Ok(Self {
            entries: kept,
            groups,
        })
    }

    /// Parse the tabular source. Cells are trimmed; missing columns are fatal.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for result in rdr.deserialize() {
            let row: TaxonomyRow = result?;
            if row.practice.is_empty() {
                debug!("Skipping row without a best practice under '{}'", row.question);
                continue;
            }
            entries.push(TaxonomyEntry {
                pillar: row.pillar,
                question: row.question,
                practice: row.practice,
            });
        }

        Self::from_entries(entries)
    }

    /// Fetch the catalog from a filesystem path or an http(s) URL.
    pub async fn load(source: &str, client: &reqwest::Client) -> Result<Self> {
        let content = if source.starts_with("http://") || source.starts_with("https://") {
            let resp = client.get(source).send().await.map_err(|e| {
                WaReviewError::TaxonomyUnavailable {
                    message: format!("fetching {} failed: {}", source, e),
                }
            })?;
            if !resp.status().is_success() {
                return Err(WaReviewError::TaxonomyUnavailable {
                    message: format!("fetching {} returned {}", source, resp.status()),
                });
            }
            resp.text()
                .await
                .map_err(|e| WaReviewError::TaxonomyUnavailable {
                    message: format!("reading {} failed: {}", source, e),
                })?
        } else {
            tokio::fs::read_to_string(source).await.map_err(|e| {
                WaReviewError::TaxonomyUnavailable {
                    message: format!("reading {} failed: {}", source, e),
                }
            })?
        };

        let taxonomy = Self::from_csv_reader(content.as_bytes())?;
        info!(
            "Loaded {} best practices across {} questions from {}",
            taxonomy.entries.len(),
            taxonomy.groups.len(),
            source
        );
        Ok(taxonomy)
    }

    pub fn entries(&self) -> &[TaxonomyEntry] {
        &self.entries
    }

    pub fn groups(&self) -> &[QuestionGroup] {
        &self.groups
    }

    /// Distinct pillar names in first-seen order
    pub fn pillars(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for group in &self.groups {
            if !out.contains(&group.pillar.as_str()) {
                out.push(&group.pillar);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Structured rendering embedded in the analysis prompt
    pub fn to_prompt_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct PromptQuestion<'a> {
            question: &'a str,
            best_practices: &'a [String],
        }
        #[derive(Serialize)]
        struct PromptPillar<'a> {
            pillar: &'a str,
            questions: Vec<PromptQuestion<'a>>,
        }

        let pillars: Vec<PromptPillar<'_>> = self
            .pillars()
            .into_iter()
            .map(|pillar| PromptPillar {
                pillar,
                questions: self
                    .groups
                    .iter()
                    .filter(|g| g.pillar == pillar)
                    .map(|g| PromptQuestion {
                        question: &g.question,
                        best_practices: &g.practices,
                    })
                    .collect(),
            })
            .collect();

        Ok(serde_json::to_string_pretty(&pillars)?)
    }
}
