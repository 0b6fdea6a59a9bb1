//! Repro - reproduction evaluation CLI
//!
//! The `repro` command evaluates submitted reproductions of computational
//! experiments against their expected outputs.
//!
//! ## Commands
//!
//! - `list`: Show registered experiments
//! - `contract`: Print the task contract for one experiment
//! - `evaluate`: Run an evaluation plan and print the audit report
//! - `compare`: Compare two JSON documents with numeric tolerance
//! - `show-record`: Print a persisted run record after verifying its digest

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use repro_core::{
    compare_values, read_record, render_experiment_report, ExperimentRegistry, Submission,
};
use repro_exec::{
    CorrectionPolicy, EvaluationPlan, Evaluator, EvaluatorConfig, LocalSolutionSource,
    StaticTransport, SubmissionTransport,
};

#[derive(Parser)]
#[command(name = "repro")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reproduction evaluation engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Experiment manifest
    #[arg(
        long,
        global = true,
        env = "REPRO_MANIFEST",
        default_value = "experiments.toml"
    )]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered experiments
    List,

    /// Print the contract payload sent to submitters for one experiment
    Contract {
        /// Experiment id
        id: String,
    },

    /// Evaluate submissions for a plan of experiments
    Evaluate {
        /// Root of canned solutions (`<root>/<id>/solution/<variant>/submission.json`)
        #[arg(long, conflicts_with = "submission", required_unless_present = "submission")]
        solutions: Option<PathBuf>,

        /// A submission document; corrections are disabled in this mode
        #[arg(long)]
        submission: Option<PathBuf>,

        /// Experiments to evaluate (comma separated, default: EVALUATION_EXPERIMENTS or all)
        #[arg(long, value_delimiter = ',')]
        experiments: Vec<String>,

        /// Solution variant to request (e.g. good, bad, random)
        #[arg(long)]
        variant: Option<String>,

        /// Attempts per experiment, including the first
        #[arg(long, env = "REPRO_MAX_ATTEMPTS", default_value_t = 2)]
        max_attempts: u32,

        /// Directory for per-attempt workspaces
        #[arg(long)]
        run_root: Option<PathBuf>,

        /// Directory for run records
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Per-command timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Print the final report as JSON instead of text
        #[arg(long)]
        json_report: bool,
    },

    /// Compare two JSON documents the way JSON artifacts are compared
    Compare {
        /// Expected document
        expected: PathBuf,

        /// Actual document
        actual: PathBuf,

        /// Relative/absolute numeric tolerance
        #[arg(short, long, default_value_t = 0.0)]
        tolerance: f64,
    },

    /// Print a persisted run record after verifying its digest
    ShowRecord {
        /// Path to the record JSON file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    repro_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::List => cmd_list(&cli.manifest),
        Commands::Contract { id } => cmd_contract(&cli.manifest, &id),
        Commands::Evaluate {
            solutions,
            submission,
            experiments,
            variant,
            max_attempts,
            run_root,
            log_dir,
            timeout_secs,
            json_report,
        } => {
            let mut config = EvaluatorConfig::from_env();
            if let Some(dir) = run_root {
                config.run_root = dir;
            }
            if let Some(dir) = log_dir {
                config.log_dir = dir;
            }
            if let Some(secs) = timeout_secs.filter(|s| *s > 0) {
                config = config.with_command_timeout(Duration::from_secs(secs));
            }
            let source = match (solutions, submission) {
                (_, Some(path)) => SubmissionSource::File(path),
                (Some(root), None) => SubmissionSource::Catalog(root),
                (None, None) => anyhow::bail!("one of --solutions or --submission is required"),
            };
            cmd_evaluate(
                &cli.manifest,
                config,
                source,
                experiments,
                variant,
                max_attempts,
                json_report,
            )
            .await
        }
        Commands::Compare {
            expected,
            actual,
            tolerance,
        } => cmd_compare(&expected, &actual, tolerance),
        Commands::ShowRecord { path } => cmd_show_record(&path),
    }
}

fn load_registry(manifest: &Path) -> Result<ExperimentRegistry> {
    ExperimentRegistry::from_manifest(manifest)
        .with_context(|| format!("Failed to load experiment manifest {:?}", manifest))
}

/// List registered experiments
fn cmd_list(manifest: &Path) -> Result<()> {
    let registry = load_registry(manifest)?;
    if registry.is_empty() {
        println!("No experiments registered in {:?}", manifest);
        return Ok(());
    }
    for spec in registry.specs() {
        println!("{:<24} {}", spec.id, spec.title);
    }
    Ok(())
}

/// Print one experiment's contract payload
fn cmd_contract(manifest: &Path, id: &str) -> Result<()> {
    let registry = load_registry(manifest)?;
    let spec = registry.get(id)?;
    println!("{}", serde_json::to_string_pretty(&spec.contract_payload())?);
    Ok(())
}

enum SubmissionSource {
    Catalog(PathBuf),
    File(PathBuf),
}

async fn cmd_evaluate(
    manifest: &Path,
    config: EvaluatorConfig,
    source: SubmissionSource,
    experiments: Vec<String>,
    variant: Option<String>,
    max_attempts: u32,
    json_report: bool,
) -> Result<()> {
    let registry = Arc::new(load_registry(manifest)?);

    let mut plan = if experiments.is_empty() {
        EvaluationPlan::from_env(&registry)?
    } else {
        EvaluationPlan::new(&registry, experiments, None)?
    };
    if let Some(v) = variant {
        plan.solution_variant = Some(v);
    }

    let mut policy = CorrectionPolicy {
        max_attempts: max_attempts.max(1),
    };
    let transport: Box<dyn SubmissionTransport> = match source {
        SubmissionSource::Catalog(root) => Box::new(LocalSolutionSource::new(root)),
        SubmissionSource::File(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read submission {:?}", path))?;
            let submission = Submission::from_json_str(&text)
                .with_context(|| format!("Submission is not valid JSON: {:?}", path))?;
            policy = CorrectionPolicy::disabled();
            Box::new(StaticTransport::new(submission))
        }
    };

    info!(
        experiments = plan.experiments.len(),
        run_root = %config.run_root.display(),
        log_dir = %config.log_dir.display(),
        "starting evaluation"
    );
    let evaluator = Evaluator::new(registry, &config).with_policy(policy);
    let report = evaluator.run_plan(&plan, transport.as_ref()).await?;

    if json_report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in &report.results {
            println!("{}\n", render_experiment_report(result));
        }
        print!("{}", report.render());
    }

    if !report.success() {
        anyhow::bail!("One or more experiments failed");
    }
    Ok(())
}

/// Compare two JSON documents
fn cmd_compare(expected: &Path, actual: &Path, tolerance: f64) -> Result<()> {
    let read = |path: &Path| -> Result<serde_json::Value> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Not valid JSON: {:?}", path))
    };
    let comparison = compare_values(&read(expected)?, &read(actual)?, tolerance);
    println!("{}", comparison.details());
    if !comparison.success() {
        anyhow::bail!("{} mismatch(es)", comparison.mismatches.len());
    }
    Ok(())
}

/// Print a run record, refusing tampered files
fn cmd_show_record(path: &Path) -> Result<()> {
    let record =
        read_record(path).with_context(|| format!("Failed to read run record {:?}", path))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
