//! wa-review: reconcile an infrastructure template against a Well-Architected review.
//!
//! Usage:
//!   wa-review analyze --template stack.yaml
//!   wa-review review
//!   wa-review merge
//!   wa-review risks
//!   wa-review report --output review.pdf
//!   wa-review status
//!   wa-review reset

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wa_review::artifact::Artifact;
use wa_review::config::Config;
use wa_review::generation::MessagesClient;
use wa_review::merge::{CheckpointOutcome, MergeStatus};
use wa_review::reconcile::ApplyReason;
use wa_review::report::default_report_path;
use wa_review::review::HttpReviewClient;
use wa_review::session::Session;
use wa_review::workflow::Workflow;

#[derive(Parser)]
#[command(name = "wa-review")]
#[command(about = "Well-Architected review reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a YAML/JSON template and cache the findings
    Analyze {
        #[arg(long)]
        template: PathBuf,
    },
    /// Show which practices are applied, without writing anything
    Review,
    /// Write newly found practices into the review and create a milestone
    Merge,
    /// Per-pillar risk summary
    Risks,
    /// Download the review report
    Report {
        /// Defaults to WA_Review_Report_<workload>.pdf
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show the session stage and which actions are available
    Status,
    /// Discard the cached session
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wa_review=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let session_path = config.session_path();
    let mut session = Session::load(&session_path).await?;

    match cli.command {
        Commands::Status => {
            status(&config, &session);
            return Ok(());
        }
        Commands::Reset => {
            Session::new().save(&session_path).await?;
            println!("🧹 Session reset ({})", session_path.display());
            return Ok(());
        }
        _ => {}
    }

    let review_api = HttpReviewClient::from_config(&config)?;
    let generator = MessagesClient::from_config(&config)?;
    let workflow = Workflow::new(&config, &review_api, &generator);

    let result = run(&workflow, &config, &mut session, cli.command).await;
    // transitions recorded by a failed action still count
    session.save(&session_path).await?;
    result
}

async fn run(
    workflow: &Workflow<'_>,
    config: &Config,
    session: &mut Session,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Analyze { template } => analyze(workflow, session, &template).await,
        Commands::Review => review(workflow, session).await,
        Commands::Merge => merge(workflow, session).await,
        Commands::Risks => risks(workflow, session).await,
        Commands::Report { output } => {
            let output =
                output.unwrap_or_else(|| default_report_path(&config.workload.workload_id));
            let written = workflow.report(session, output.clone()).await?;
            println!("📄 Report saved to {} ({} bytes)", output.display(), written);
            Ok(())
        }
        Commands::Status | Commands::Reset => Ok(()),
    }
}

async fn analyze(workflow: &Workflow<'_>, session: &mut Session, template: &Path) -> Result<()> {
    let artifact = Artifact::from_path(template).await?;
    info!("Analyzing {}", artifact.location);
    let summary = workflow.analyze(session, artifact).await?;

    println!("✅ Analysis complete: {} findings", summary.findings.len());
    for finding in &summary.findings {
        println!("  [{}]", finding.practice_name);
    }
    if !summary.unknown_practices.is_empty() {
        println!(
            "⚠️  {} findings don't name a known practice exactly and will be ignored:",
            summary.unknown_practices.len()
        );
        for name in &summary.unknown_practices {
            println!("  - {}", name);
        }
    }
    Ok(())
}

async fn review(workflow: &Workflow<'_>, session: &Session) -> Result<()> {
    let view = workflow.review(session).await?;
    let reconciliation = &view.reconciliation;

    for failure in &view.pillar_errors {
        println!(
            "⚠️  Answers for {} could not be read: {}",
            failure.pillar_id, failure.error
        );
    }

    let mut current_pillar = "";
    for question in reconciliation.with_applied() {
        if question.pillar != current_pillar {
            current_pillar = question.pillar.as_str();
            println!("\n=== {} ===", current_pillar);
        }
        println!("{}", question.question);
        for practice in &question.applied {
            println!("  ✔ {} ({})", practice.practice, practice.reason);
        }
    }

    println!(
        "\n{} applied: {} previously applied, {} newly found",
        reconciliation.applied_count(),
        reconciliation.count_by_reason(ApplyReason::PreviouslyApplied),
        reconciliation.count_by_reason(ApplyReason::NewlyFound)
    );
    Ok(())
}

async fn merge(workflow: &Workflow<'_>, session: &mut Session) -> Result<()> {
    let outcome = workflow.merge(session).await?;

    for update in &outcome.updated {
        println!(
            "  ↑ {} ({} → {} choices)",
            update.question_title,
            update.before.len(),
            update.after.len()
        );
    }
    if !outcome.unresolved_practices.is_empty() {
        println!(
            "⚠️  {} practices matched no choice title",
            outcome.unresolved_practices.len()
        );
    }

    match &outcome.checkpoint {
        CheckpointOutcome::Created(checkpoint) => {
            println!("🏁 Milestone '{}' created", checkpoint.name)
        }
        CheckpointOutcome::Failed(e) => println!("⚠️  Milestone not created: {}", e),
        CheckpointOutcome::NotAttempted => {}
    }

    match &outcome.status {
        MergeStatus::Completed => {
            println!(
                "✅ Merge complete: {} updated, {} already up to date",
                outcome.updated.len(),
                outcome.skipped_questions.len()
            );
            risks(workflow, session).await
        }
        MergeStatus::Aborted { pillar_id, error } => {
            anyhow::bail!(
                "merge aborted in pillar {} after {} updates: {}",
                pillar_id.as_deref().unwrap_or("<listing>"),
                outcome.updated.len(),
                error
            )
        }
    }
}

async fn risks(workflow: &Workflow<'_>, session: &Session) -> Result<()> {
    let summary = workflow.risks(session).await?;
    println!("{}", summary.render_table());
    println!(
        "Total: {}/{} answered, {} high, {} medium",
        summary.answered_questions(),
        summary.total_questions(),
        summary.high_risks(),
        summary.medium_risks()
    );
    for failure in &summary.failed_pillars {
        println!(
            "⚠️  {} counts are partial: {}",
            failure.pillar_id, failure.error
        );
    }
    Ok(())
}

fn status(config: &Config, session: &Session) {
    println!("Workload: {}", config.workload.workload_id);
    println!("Stage: {:?}", session.stage);
    if let Some(artifact) = &session.artifact {
        println!("Template: {}", artifact.location);
    }
    if let Some(analysis) = &session.analysis {
        println!(
            "Analysis: {} findings ({})",
            analysis.findings.len(),
            analysis.analyzed_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if let Some(merge) = &session.last_merge {
        let state = if merge.succeeded { "succeeded" } else { "failed" };
        println!(
            "Last merge: {} with {} updates",
            state, merge.updated_questions
        );
        if let Some(error) = &merge.error {
            println!("  {}", error);
        }
    }
    if let Some(path) = &session.report_path {
        println!("Report: {}", path.display());
    }
    let actions: Vec<String> = session
        .enabled_actions()
        .iter()
        .map(|a| a.to_string())
        .collect();
    println!("Available: {}", actions.join(", "));
}
