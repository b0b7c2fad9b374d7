//! Cross-references findings and recorded selections against the taxonomy.
//!
//! Two matching strengths are in play:
//! - `PreviouslyApplied`: the practice text (enumeration stripped) is a *substring* of a
//!   selected choice title. This yields false positives when one practice's text is
//!   contained in another's.
//! - `NewlyFound`: the bracketed finding name *equals* the full practice name, case and
//!   whitespace included.
//!
//! The asymmetry is kept as-is until there is a product decision to unify it.

use crate::findings::Finding;
use crate::review::{ExternalAnswer, PillarAnswers};
use crate::taxonomy::{QuestionGroup, Taxonomy, pillar_matches, strip_enumeration};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplyReason {
    PreviouslyApplied,
    NewlyFound,
}

impl fmt::Display for ApplyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyReason::PreviouslyApplied => write!(f, "Previously Applied"),
            ApplyReason::NewlyFound => write!(f, "Newly Found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPractice {
    pub practice: String,
    pub reason: ApplyReason,
    /// Justification from the finding, for newly found practices
    pub justification: Option<String>,
}

impl AppliedPractice {
    /// Practice text with the enumeration token removed
    pub fn normalized(&self) -> &str {
        strip_enumeration(&self.practice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionReconciliation {
    pub pillar: String,
    pub question: String,
    pub question_key: String,
    pub applied: Vec<AppliedPractice>,
}

impl QuestionReconciliation {
    pub fn newly_found(&self) -> impl Iterator<Item = &AppliedPractice> {
        self.applied
            .iter()
            .filter(|p| p.reason == ApplyReason::NewlyFound)
    }

    pub fn matches_title(&self, question_title: &str) -> bool {
        crate::taxonomy::question_key_matches(&self.question_key, question_title)
    }
}

/// Applied practices for every (pillar, question) group, in taxonomy order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub questions: Vec<QuestionReconciliation>,
}

impl Reconciliation {
    pub fn applied_count(&self) -> usize {
        self.questions.iter().map(|q| q.applied.len()).sum()
    }

    pub fn count_by_reason(&self, reason: ApplyReason) -> usize {
        self.questions
            .iter()
            .flat_map(|q| q.applied.iter())
            .filter(|p| p.reason == reason)
            .count()
    }

    /// Groups that have at least one applied practice
    pub fn with_applied(&self) -> impl Iterator<Item = &QuestionReconciliation> {
        self.questions.iter().filter(|q| !q.applied.is_empty())
    }

    /// Groups belonging to the review system's pillar whose key maps to `question_title`
    pub fn for_answer<'a>(
        &'a self,
        pillar_id: &'a str,
        pillar_name: &'a str,
        question_title: &'a str,
    ) -> impl Iterator<Item = &'a QuestionReconciliation> + 'a {
        self.questions.iter().filter(move |q| {
            pillar_matches(&q.pillar, pillar_id, pillar_name) && q.matches_title(question_title)
        })
    }
}

/// Pure reconciliation: no I/O. Groups with no matching external answer can only
/// produce `NewlyFound` entries.
pub fn reconcile(
    taxonomy: &Taxonomy,
    findings: &[Finding],
    answers: &[PillarAnswers],
) -> Reconciliation {
    let questions = taxonomy
        .groups()
        .iter()
        .map(|group| {
            let answer = find_answer(group, answers);
            QuestionReconciliation {
                pillar: group.pillar.clone(),
                question: group.question.clone(),
                question_key: group.question_key().to_string(),
                applied: reconcile_group(group, findings, answer),
            }
        })
        .collect();

    Reconciliation { questions }
}

fn find_answer<'a>(group: &QuestionGroup, answers: &'a [PillarAnswers]) -> Option<&'a ExternalAnswer> {
    answers
        .iter()
        .filter(|pa| pillar_matches(&group.pillar, &pa.pillar.pillar_id, &pa.pillar.pillar_name))
        .flat_map(|pa| pa.answers.iter())
        .find(|a| group.matches_title(&a.question_title))
}

fn reconcile_group(
    group: &QuestionGroup,
    findings: &[Finding],
    answer: Option<&ExternalAnswer>,
) -> Vec<AppliedPractice> {
    let mut applied: Vec<AppliedPractice> = Vec::new();

    for practice in &group.practices {
        // first match wins; a practice is listed at most once
        if applied.iter().any(|a| &a.practice == practice) {
            continue;
        }

        if let Some(answer) = answer
            && previously_applied(practice, answer)
        {
            applied.push(AppliedPractice {
                practice: practice.clone(),
                reason: ApplyReason::PreviouslyApplied,
                justification: None,
            });
            continue;
        }

        if let Some(finding) = findings.iter().find(|f| f.practice_name == *practice) {
            applied.push(AppliedPractice {
                practice: practice.clone(),
                reason: ApplyReason::NewlyFound,
                justification: Some(finding.justification.clone()),
            });
        }
    }

    applied
}

fn previously_applied(practice: &str, answer: &ExternalAnswer) -> bool {
    let normalized = strip_enumeration(practice);
    // an empty needle would be contained in every title
    if normalized.is_empty() {
        return false;
    }
    answer
        .choices
        .iter()
        .any(|c| c.title.contains(normalized) && answer.is_selected(&c.choice_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{Choice, PillarRef, Risk};
    use std::collections::BTreeSet;

    const CSV: &str = "Pillar,Question,Best Practice\n\
Security,SEC 8 - How do you protect your data at rest?,SEC08-BP01 Implement secure key management\n\
Security,SEC 8 - How do you protect your data at rest?,SEC08-BP02 Enforce encryption at rest\n\
Security,SEC 8 - How do you protect your data at rest?,SEC08-BP03 Automate data at rest protection\n";

    fn security_answers(selected: &[&str]) -> Vec<PillarAnswers> {
        vec![PillarAnswers {
            pillar: PillarRef {
                pillar_id: "security".to_string(),
                pillar_name: "Security".to_string(),
            },
            answers: vec![ExternalAnswer {
                question_id: "data-rest".to_string(),
                question_title: "How do you protect your data at rest?".to_string(),
                selected_choice_ids: selected.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
                choices: vec![
                    Choice {
                        choice_id: "sec_data_rest_key_mgmt".to_string(),
                        title: "Implement secure key management".to_string(),
                    },
                    Choice {
                        choice_id: "sec_data_rest_encrypt".to_string(),
                        title: "Enforce encryption at rest".to_string(),
                    },
                    Choice {
                        choice_id: "sec_data_rest_automate".to_string(),
                        title: "Automate data at rest protection".to_string(),
                    },
                ],
                risk: Risk::High,
            }],
        }]
    }

    fn finding(name: &str) -> Finding {
        Finding {
            practice_name: name.to_string(),
            justification: "because".to_string(),
        }
    }

    #[test]
    fn test_previously_applied_wins_over_finding() {
        let taxonomy = Taxonomy::from_csv_reader(CSV.as_bytes()).unwrap();
        let findings = vec![
            finding("SEC08-BP01 Implement secure key management"),
            finding("SEC08-BP02 Enforce encryption at rest"),
        ];
        let result = reconcile(&taxonomy, &findings, &security_answers(&["sec_data_rest_key_mgmt"]));

        let applied = &result.questions[0].applied;
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].reason, ApplyReason::PreviouslyApplied);
        assert_eq!(applied[0].justification, None);
        assert_eq!(applied[1].reason, ApplyReason::NewlyFound);
        assert_eq!(applied[1].justification.as_deref(), Some("because"));
    }

    #[test]
    fn test_newly_found_requires_exact_name() {
        let taxonomy = Taxonomy::from_csv_reader(CSV.as_bytes()).unwrap();
        let findings = vec![
            finding("sec08-bp02 enforce encryption at rest"),
            finding("SEC08-BP02  Enforce encryption at rest"),
            finding(" SEC08-BP02 Enforce encryption at rest"),
            finding("Enforce encryption at rest"),
        ];
        let result = reconcile(&taxonomy, &findings, &security_answers(&[]));
        assert_eq!(result.applied_count(), 0);
    }

    #[test]
    fn test_without_answers_only_findings_count() {
        let taxonomy = Taxonomy::from_csv_reader(CSV.as_bytes()).unwrap();
        let findings = vec![finding("SEC08-BP03 Automate data at rest protection")];
        let result = reconcile(&taxonomy, &findings, &[]);
        assert_eq!(result.count_by_reason(ApplyReason::NewlyFound), 1);
        assert_eq!(result.count_by_reason(ApplyReason::PreviouslyApplied), 0);
    }

    #[test]
    fn test_unselected_choice_is_not_previously_applied() {
        let taxonomy = Taxonomy::from_csv_reader(CSV.as_bytes()).unwrap();
        let result = reconcile(&taxonomy, &[], &security_answers(&["some_other_choice"]));
        assert_eq!(result.applied_count(), 0);
    }

    #[test]
    fn test_substring_containment_false_positive_is_preserved() {
        // "Enforce encryption" is contained in the selected "Enforce encryption at rest"
        let csv = "Pillar,Question,Best Practice\n\
Security,SEC 8 - How do you protect your data at rest?,X1 Enforce encryption\n";
        let taxonomy = Taxonomy::from_csv_reader(csv.as_bytes()).unwrap();
        let result = reconcile(&taxonomy, &[], &security_answers(&["sec_data_rest_encrypt"]));
        assert_eq!(result.count_by_reason(ApplyReason::PreviouslyApplied), 1);
    }

    #[test]
    fn test_answers_from_other_pillar_are_ignored() {
        let taxonomy = Taxonomy::from_csv_reader(CSV.as_bytes()).unwrap();
        let mut answers = security_answers(&["sec_data_rest_key_mgmt"]);
        answers[0].pillar = PillarRef {
            pillar_id: "reliability".to_string(),
            pillar_name: "Reliability".to_string(),
        };
        let result = reconcile(&taxonomy, &[], &answers);
        assert_eq!(result.applied_count(), 0);
    }
}
