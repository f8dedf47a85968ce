use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use verba_core::{
    aggregate_root, compile, Digest, DigestKind, Language, PlainTextExtractor, SealedEvidence,
};
use verba_runtime::{
    Adjudicator, CaseSession, CircuitBreaker, IntentParser, ProviderRegistry, RuntimeConfig,
};

mod case_file;

use case_file::CaseFile;

#[derive(Parser, Debug)]
#[command(name = "verba", version, about = "Verba case-processing pipeline")]
struct Cli {
    #[arg(long, global = true, help = "Runtime config (YAML)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Digest evidence files and print their aggregate root
    Hash {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Parse testimony into a structured intent
    Parse {
        text: String,
        #[arg(long, help = "Language hint: en, hi or ta")]
        lang: Option<String>,
    },
    /// Adjudicate a case file and print the verdict
    Adjudicate {
        #[arg(long)]
        case: PathBuf,
    },
    /// Drive a case file through every stage and print the final case
    Run {
        #[arg(long)]
        case: PathBuf,
    },
}

#[derive(Serialize)]
struct HashedFile {
    file: String,
    digest: Digest,
    digest_kind: DigestKind,
    evidence_id: String,
}

#[derive(Serialize)]
struct HashReport {
    files: Vec<HashedFile>,
    root: Digest,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Hash { files } => hash(&files).await,
        Commands::Parse { text, lang } => parse(&config, &text, lang.as_deref()).await,
        Commands::Adjudicate { case } => adjudicate(&config, &case).await,
        Commands::Run { case } => run(&config, &case).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let config = match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    let config = config.with_env();
    info!(
        config = %path.map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string()),
        engine = ?config.engine,
        "Loaded runtime config"
    );
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn case_dir(case: &Path) -> &Path {
    case.parent().unwrap_or_else(|| Path::new("."))
}

async fn hash(files: &[PathBuf]) -> Result<()> {
    let items =
        verba_runtime::evidence::load_files(files, &PlainTextExtractor, Utc::now()).await?;
    let root = aggregate_root(items.iter().map(|i| &i.digest));
    let files = items
        .into_iter()
        .map(|i| HashedFile {
            file: i.filename,
            digest: i.digest,
            digest_kind: i.digest_kind,
            evidence_id: i.evidence_id,
        })
        .collect();
    print_json(&HashReport { files, root })
}

async fn parse(config: &RuntimeConfig, text: &str, lang: Option<&str>) -> Result<()> {
    let circuit_breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
    let parser = IntentParser::from_config(config, circuit_breaker);
    let result = parser.parse(text, lang.map(Language::from_code)).await;
    print_json(&result)
}

async fn adjudicate(config: &RuntimeConfig, case_path: &Path) -> Result<()> {
    let case = CaseFile::load(case_path)?;
    let testimony = case.testimony()?;
    let now = Utc::now();
    let items = case
        .evidence_items(case_dir(case_path), &PlainTextExtractor, now)
        .await?;
    let sealed = SealedEvidence::new(items, now);
    let claim = compile(testimony.text(), testimony.case_type.as_deref(), Some(&sealed))?;

    let adjudicator = Adjudicator::from_config(
        config,
        &ProviderRegistry::with_defaults(),
        Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())),
    );
    let outcome = adjudicator
        .adjudicate(testimony.text(), &claim, sealed.items())
        .await;
    print_json(outcome.verdict())
}

async fn run(config: &RuntimeConfig, case_path: &Path) -> Result<()> {
    let case = CaseFile::load(case_path)?;
    let testimony = case.testimony()?;
    let items = case
        .evidence_items(case_dir(case_path), &PlainTextExtractor, Utc::now())
        .await?;

    let session = CaseSession::from_config(config, &ProviderRegistry::with_defaults());
    let finished = session.run(testimony, items).await?;
    print_json(&finished)
}
