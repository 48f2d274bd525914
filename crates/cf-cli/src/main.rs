use anyhow::{bail, Context, Result};
use cf_blobstore::{BlobStore, LocalBlobStore};
use cf_core::{InputDescriptor, JobId, JobKind, JobStatus};
use cf_ledger::Ledger;
use cf_llm::{GatewayConfig, LlmGateway};
use cf_orchestrator::{Orchestrator, OrchestratorConfig};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Submit-and-poll harness for the corpus ingestion orchestrator. Maps argv
/// flags onto the same option map the orchestrator itself consumes, mirroring
/// the teacher's `main.rs` building a config and calling straight into the
/// core library rather than duplicating business logic.
#[derive(Parser)]
#[command(name = "corpusforge", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job and, by default, poll until it reaches a terminal state.
    Submit(SubmitArgs),
    /// Print the latest known status of a previously submitted job.
    Status(JobArgs),
    /// Print the full progress history of a job.
    History(JobArgs),
}

#[derive(Parser)]
struct SubmitArgs {
    /// Root directory for the local blob store (inputs, ledger, results).
    #[arg(long, default_value = "./corpusforge-data")]
    root: PathBuf,

    /// Job kind.
    #[arg(long, value_parser = ["pdf", "json-unified", "json-single", "compress", "clean", "split"])]
    kind: String,

    /// One or more input files.
    #[arg(short, long, required = true)]
    input: Vec<PathBuf>,

    /// LLM provider for enrichment/vision; omit to run without a gateway.
    #[arg(long)]
    provider: Option<String>,

    /// Model name (default: provider-specific).
    #[arg(long)]
    model: Option<String>,

    /// Extra option as key=value, repeatable (forwarded into the job's option map).
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Submit without waiting for completion.
    #[arg(long)]
    no_wait: bool,
}

#[derive(Parser)]
struct JobArgs {
    /// Root directory for the local blob store.
    #[arg(long, default_value = "./corpusforge-data")]
    root: PathBuf,

    /// The job id to inspect.
    job_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Submit(args) => run_submit(args).await,
        Commands::Status(args) => run_status(args).await,
        Commands::History(args) => run_history(args).await,
    }
}

fn parse_kind(s: &str) -> JobKind {
    match s {
        "pdf" => JobKind::Pdf,
        "json-unified" => JobKind::JsonUnified,
        "json-single" => JobKind::JsonSingle,
        "compress" => JobKind::Compress,
        "clean" => JobKind::Clean,
        "split" => JobKind::Split,
        _ => unreachable!("clap value_parser restricts this to known kinds"),
    }
}

fn parse_option_value(raw: &str) -> serde_json::Value {
    if let Ok(n) = raw.parse::<i64>() {
        return serde_json::json!(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return serde_json::json!(f);
    }
    match raw {
        "true" => serde_json::json!(true),
        "false" => serde_json::json!(false),
        _ => serde_json::json!(raw),
    }
}

async fn run_submit(args: SubmitArgs) -> Result<()> {
    let store = Arc::new(LocalBlobStore::new(&args.root));
    let ledger = Arc::new(Ledger::new(store.clone()));

    let gateway = args.provider.as_ref().map(|provider| {
        let model = args.model.clone().unwrap_or_else(|| cf_llm::default_model(provider).to_string());
        Arc::new(LlmGateway::new(GatewayConfig::new(provider.clone(), model)))
    });

    let config = OrchestratorConfig { scratch_dir: args.root.join(".scratch"), ..Default::default() };
    let orchestrator = Orchestrator::new(store.clone(), ledger.clone(), gateway, config);
    orchestrator.recover().await.context("failed to recover in-flight jobs")?;

    let mut inputs = Vec::with_capacity(args.input.len());
    for path in &args.input {
        let bytes = tokio::fs::read(path).await.with_context(|| format!("reading {}", path.display()))?;
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("input").to_string();
        let key = format!("inputs/{}-{}", uuid::Uuid::new_v4().simple(), filename);
        let content_type = guess_content_type(&filename);
        store.put(&key, &bytes, content_type).await?;
        inputs.push(InputDescriptor { key, filename, content_type: content_type.to_string(), size_bytes: bytes.len() as u64 });
    }

    let mut options = HashMap::new();
    for raw in &args.options {
        let Some((key, value)) = raw.split_once('=') else {
            bail!("--option must be KEY=VALUE, got '{raw}'");
        };
        options.insert(key.to_string(), parse_option_value(value));
    }

    let kind = parse_kind(&args.kind);
    let job_id = orchestrator.submit(kind, inputs, options).await?;
    println!("Submitted job {job_id} ({})", args.kind);

    if args.no_wait {
        return Ok(());
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/100 {msg}")
            .unwrap()
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );

    loop {
        if let Some(snapshot) = orchestrator.state(job_id).await? {
            bar.set_position(snapshot.progress as u64);
            bar.set_message(format!("{}:{}", snapshot.phase, snapshot.step));
            if matches!(snapshot.status, JobStatus::Completed | JobStatus::Failed | JobStatus::Paused) {
                bar.finish_with_message(format!("{:?}", snapshot.status));
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let job = orchestrator.job(job_id).await?.context("job disappeared from the ledger")?;
    match job.status {
        JobStatus::Completed => {
            if let Some(result) = &job.result {
                println!("Completed. Manifest: {}", result.manifest_key);
                for key in &result.output_keys {
                    println!("  - {key}");
                }
            }
        }
        JobStatus::Failed => {
            if let Some(err) = &job.last_error {
                println!("Failed: [{}] {}", err.kind, err.message);
            }
        }
        JobStatus::Paused => println!("Paused (cancelled)."),
        other => println!("Ended in unexpected state: {other:?}"),
    }

    Ok(())
}

async fn run_status(args: JobArgs) -> Result<()> {
    let store = Arc::new(LocalBlobStore::new(&args.root));
    let ledger = Ledger::new(store);
    let job_id: JobId = args.job_id.parse().context("invalid job id")?;

    let job = ledger.load_job(job_id).await?.context("no such job")?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

async fn run_history(args: JobArgs) -> Result<()> {
    let store = Arc::new(LocalBlobStore::new(&args.root));
    let ledger = Ledger::new(store);
    let job_id: JobId = args.job_id.parse().context("invalid job id")?;

    let history = ledger.history(job_id).await?;
    for event in history {
        println!("[{}] seq={} phase={} step={} progress={}", event.timestamp, event.seq, event.phase, event.step, event.progress);
    }
    Ok(())
}

fn guess_content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next().unwrap_or("") {
        "pdf" => "application/pdf",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
