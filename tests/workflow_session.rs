//! Action handlers driven through the session's transition rules.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Mutex;
use wa_review::artifact::Artifact;
use wa_review::config::Config;
use wa_review::error::{Result, WaReviewError};
use wa_review::generation::TextGenerator;
use wa_review::review::{Choice, ExternalAnswer, InMemoryReviewApi, PillarRef, Risk};
use wa_review::session::{Action, Session, Stage};
use wa_review::taxonomy::Taxonomy;
use wa_review::workflow::Workflow;

const TAXONOMY: &str = "Pillar,Question,Best Practice\n\
Security,SEC 8 - How do you protect your data at rest?,SEC08-BP01 Implement secure key management\n\
Security,SEC 8 - How do you protect your data at rest?,SEC08-BP02 Enforce encryption at rest\n";

const TEMPLATE: &str = "Resources:\n  Bucket:\n    Type: AWS::S3::Bucket\n    Properties:\n      BucketEncryption: {}\n";

struct CannedGenerator {
    reply: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl CannedGenerator {
    fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(|message| WaReviewError::Generation { message })
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.workload.workload_id = "wl-flow".to_string();
    config.review_api.max_pages_per_pillar = 20;
    config
}

fn record() -> InMemoryReviewApi {
    InMemoryReviewApi::new(1)
        .with_pillar(
            PillarRef {
                pillar_id: "security".to_string(),
                pillar_name: "Security".to_string(),
            },
            vec![ExternalAnswer {
                question_id: "data-at-rest".to_string(),
                question_title: "How do you protect your data at rest?".to_string(),
                selected_choice_ids: BTreeSet::new(),
                choices: vec![
                    Choice {
                        choice_id: "sec_key_mgmt".to_string(),
                        title: "Implement secure key management".to_string(),
                    },
                    Choice {
                        choice_id: "sec_encrypt".to_string(),
                        title: "Enforce encryption at rest".to_string(),
                    },
                ],
                risk: Risk::High,
            }],
        )
        .with_report(b"%PDF-1.4 report".to_vec())
}

fn taxonomy() -> Taxonomy {
    Taxonomy::from_csv_reader(TAXONOMY.as_bytes()).unwrap()
}

async fn template(dir: &tempfile::TempDir) -> Artifact {
    let path = dir.path().join("stack.yaml");
    tokio::fs::write(&path, TEMPLATE).await.unwrap();
    Artifact::from_path(&path).await.unwrap()
}

#[tokio::test]
async fn merge_and_report_are_refused_before_analysis() {
    let config = config();
    let api = record();
    let generator = CannedGenerator::replying("");
    let workflow = Workflow::new(&config, &api, &generator).with_taxonomy(taxonomy());
    let mut session = Session::new();

    let err = workflow.merge(&mut session).await.unwrap_err();
    assert!(matches!(err, WaReviewError::InvalidTransition { .. }));
    assert!(err.to_string().starts_with("Cannot merge:"));

    let dir = tempfile::tempdir().unwrap();
    let err = workflow
        .report(&mut session, dir.path().join("r.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, WaReviewError::InvalidTransition { .. }));

    assert_eq!(api.list_calls().await, 0);
    assert_eq!(session.stage, Stage::Fresh);
}

#[tokio::test]
async fn full_review_cycle_updates_choices_and_downloads_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let api = record();
    let generator = CannedGenerator::replying(
        "[SEC08-BP02 Enforce encryption at rest]: BucketEncryption is configured.\n\
         [Made up practice]: not in the catalog",
    );
    let workflow = Workflow::new(&config, &api, &generator).with_taxonomy(taxonomy());
    let mut session = Session::new();

    let summary = workflow
        .analyze(&mut session, template(&dir).await)
        .await
        .unwrap();
    assert_eq!(summary.findings.len(), 2);
    assert_eq!(summary.unknown_practices, vec!["Made up practice".to_string()]);
    assert_eq!(session.stage, Stage::Analyzed);
    let prompt = generator.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("BucketEncryption"));
    assert!(prompt.contains("SEC08-BP02 Enforce encryption at rest"));

    let view = workflow.review(&session).await.unwrap();
    assert!(view.pillar_errors.is_empty());
    assert_eq!(view.reconciliation.applied_count(), 1);

    let outcome = workflow.merge(&mut session).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(session.stage, Stage::Merged);
    assert_eq!(
        api.answer("data-at-rest").await.unwrap().selected_choice_ids,
        ["sec_encrypt".to_string()].into_iter().collect::<BTreeSet<_>>()
    );

    let risks = workflow.risks(&session).await.unwrap();
    assert_eq!(risks.total_questions(), 1);
    assert_eq!(risks.high_risks(), 1);

    let output = dir.path().join("WA_Review_Report_wl-flow.pdf");
    let written = workflow.report(&mut session, output.clone()).await.unwrap();
    assert_eq!(written, 15);
    assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.4 report".to_vec());
    assert_eq!(session.report_path.as_deref(), Some(output.as_path()));

    let session_file = dir.path().join("session.json");
    session.save(&session_file).await.unwrap();
    assert_eq!(Session::load(&session_file).await.unwrap(), session);
}

#[tokio::test]
async fn failed_analysis_disables_review_and_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let api = record();
    let generator = CannedGenerator::failing("throttled");
    let workflow = Workflow::new(&config, &api, &generator).with_taxonomy(taxonomy());
    let mut session = Session::new();

    let err = workflow
        .analyze(&mut session, template(&dir).await)
        .await
        .unwrap_err();
    assert!(matches!(err, WaReviewError::Generation { .. }));
    assert_eq!(session.stage, Stage::AnalysisFailed);
    assert!(session.artifact.is_some());
    assert_eq!(session.enabled_actions(), vec![Action::Analyze]);
    assert!(workflow.review(&session).await.is_err());
}

#[tokio::test]
async fn reanalysis_closes_the_report_until_the_next_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let api = record();
    let generator = CannedGenerator::replying("no applicable practices");
    let workflow = Workflow::new(&config, &api, &generator).with_taxonomy(taxonomy());
    let mut session = Session::new();

    workflow
        .analyze(&mut session, template(&dir).await)
        .await
        .unwrap();
    workflow.merge(&mut session).await.unwrap();
    assert!(session.is_enabled(Action::Report));

    workflow
        .analyze(&mut session, template(&dir).await)
        .await
        .unwrap();
    assert!(!session.is_enabled(Action::Report));
    assert!(session.is_enabled(Action::Merge));
}

#[tokio::test]
async fn merge_refuses_to_run_on_partial_answers() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let api = record().fail_page("security", 0);
    let generator =
        CannedGenerator::replying("[SEC08-BP02 Enforce encryption at rest]: configured");
    let workflow = Workflow::new(&config, &api, &generator).with_taxonomy(taxonomy());
    let mut session = Session::new();
    workflow
        .analyze(&mut session, template(&dir).await)
        .await
        .unwrap();

    let view = workflow.review(&session).await.unwrap();
    assert_eq!(view.pillar_errors.len(), 1);

    let err = workflow.merge(&mut session).await.unwrap_err();
    assert!(matches!(err, WaReviewError::ReviewApi { .. }));
    assert_eq!(
        err.to_string(),
        "Review API error during ListAnswers: injected failure on page 0 of security"
    );
    assert_eq!(err.to_string().matches("Review API error").count(), 1);
    assert!(api.updates().await.is_empty());
    assert_eq!(session.stage, Stage::MergeFailed);
    assert!(session.is_enabled(Action::Merge));
    assert!(!session.is_enabled(Action::Report));
}

#[tokio::test]
async fn unreadable_answers_close_the_report_after_an_earlier_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let generator =
        CannedGenerator::replying("[SEC08-BP02 Enforce encryption at rest]: configured");
    let mut session = Session::new();

    let healthy = record();
    let workflow = Workflow::new(&config, &healthy, &generator).with_taxonomy(taxonomy());
    workflow
        .analyze(&mut session, template(&dir).await)
        .await
        .unwrap();
    workflow.merge(&mut session).await.unwrap();
    assert_eq!(session.stage, Stage::Merged);
    assert!(session.is_enabled(Action::Report));

    let failing = record().fail_page("security", 0);
    let workflow = Workflow::new(&config, &failing, &generator).with_taxonomy(taxonomy());
    assert!(workflow.merge(&mut session).await.is_err());

    assert_eq!(session.stage, Stage::MergeFailed);
    assert!(!session.is_enabled(Action::Report));
    assert!(!session.is_enabled(Action::Risks));
    let last = session.last_merge.as_ref().unwrap();
    assert!(!last.succeeded);
    assert_eq!(last.updated_questions, 0);
    assert!(last.error.as_deref().unwrap().contains("page 0 of security"));
    assert!(failing.updates().await.is_empty());
    assert!(failing.checkpoints().await.is_empty());
}

#[tokio::test]
async fn empty_generated_text_is_a_failed_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let api = record();
    let generator = CannedGenerator::replying(" \n\t ");
    let workflow = Workflow::new(&config, &api, &generator).with_taxonomy(taxonomy());
    let mut session = Session::new();

    let err = workflow
        .analyze(&mut session, template(&dir).await)
        .await
        .unwrap_err();
    assert!(matches!(err, WaReviewError::Generation { .. }));
    assert_eq!(session.stage, Stage::AnalysisFailed);
    assert!(session.analysis.is_none());
    assert_eq!(session.enabled_actions(), vec![Action::Analyze]);
}

#[tokio::test]
async fn taxonomy_is_loaded_from_the_configured_file() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("bp.csv");
    tokio::fs::write(&csv_path, TAXONOMY).await.unwrap();

    let mut config = config();
    config.taxonomy.source = csv_path.to_string_lossy().into_owned();
    let api = record();
    let generator = CannedGenerator::replying("");
    let workflow = Workflow::new(&config, &api, &generator);

    let taxonomy = workflow.taxonomy().await.unwrap();
    assert_eq!(taxonomy.len(), 2);
    assert_eq!(taxonomy.pillars(), vec!["Security"]);

    let mut missing = config.clone();
    missing.taxonomy.source = dir.path().join("missing.csv").to_string_lossy().into_owned();
    let workflow = Workflow::new(&missing, &api, &generator);
    let err = workflow.taxonomy().await.unwrap_err();
    assert!(matches!(err, WaReviewError::TaxonomyUnavailable { .. }));
}
