use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use studykit_context::ChunkingMode;
use studykit_embed::FastEmbedProvider;
use studykit_retriever::{
    ContextAssembler, ContextUnit, ScoredUnit, SessionConfig, SqliteSnapshot, StudySession,
};
use tracing_subscriber::EnvFilter;

/// A CLI tool to ingest study material and retrieve context for questions.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Snapshot database holding the ingested material
    #[arg(long, default_value = ".studykit.db")]
    db: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest every PDF in a folder
    Ingest {
        /// Folder containing the PDFs
        dir: PathBuf,
        /// Split documents into chunks of at most this many bytes
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Show the units most similar to a question
    Search {
        query: String,
        /// Number of results (defaults to the configured default_k)
        #[arg(short, long)]
        k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Print the assembled context for a question
    Context {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Print all ingested text, in ingestion order
    FullContext {
        /// Maximum number of units
        #[arg(long)]
        cap: Option<usize>,
    },
    /// List ingested units
    List {
        /// Limit number of results
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show snapshot statistics
    Stats,
    /// Delete all ingested material
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct SearchResult<'a> {
    id: &'a str,
    score: f32,
    source: Option<&'a str>,
    text: &'a str,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SessionConfig::from_toml_file(path)?,
        None => SessionConfig::default(),
    };
    let snapshot = SqliteSnapshot::open(&args.db).await?;

    match args.command {
        Commands::Ingest { dir, chunk_size } => {
            let config = match chunk_size {
                Some(max_chunk_length) => config.with_chunking(ChunkingMode::Windowed {
                    max_chunk_length,
                }),
                None => config,
            };
            let session = open_session(config, &snapshot).await?;

            let report = session.ingest_folder(&dir).await?;
            let info = session.save_snapshot(&snapshot).await?;

            println!(
                "Ingested {} documents from {}: {} new units, {} replaced",
                report.documents,
                dir.display(),
                report.units_inserted,
                report.units_replaced
            );
            for failure in &report.failures {
                println!("  Skipped {}: {}", failure.path.display(), failure.error);
            }
            println!("Snapshot now holds {} units", info.unit_count);
            Ok(())
        }
        Commands::Search { query, k, format } => {
            let session = open_session(config, &snapshot).await?;
            let results = session.search(&query, k).await?;
            print_results(&results, &format)
        }
        Commands::Context { query, k } => {
            let session = open_session(config, &snapshot).await?;
            println!("{}", session.context_for_query(&query, k).await?);
            Ok(())
        }
        Commands::FullContext { cap } => {
            let Some((_, store)) = snapshot.restore().await? else {
                return Ok(());
            };
            let assembler = ContextAssembler::new(Arc::new(store));
            println!("{}", assembler.full_context(cap.or(config.full_context_cap)));
            Ok(())
        }
        Commands::List { limit, format } => {
            let mut units = match snapshot.restore().await? {
                Some((_, store)) => store.get_all(),
                None => Vec::new(),
            };
            units.truncate(limit);
            print_units(&units, &format)
        }
        Commands::Stats => {
            match snapshot.info().await? {
                Some(info) => {
                    println!("Database: {}", args.db.display());
                    println!("Units: {}", info.unit_count);
                    println!(
                        "Dimension: {}",
                        info.dimension
                            .map_or_else(|| "unknown".to_string(), |d| d.to_string())
                    );
                    println!("Model: {}", info.model_name);
                    println!("Saved at: {}", info.saved_at.to_rfc3339());
                }
                None => println!("No material ingested into {}", args.db.display()),
            }
            Ok(())
        }
        Commands::Clear => {
            snapshot.clear().await?;
            println!("Cleared {}", args.db.display());
            Ok(())
        }
    }
}

async fn open_session(
    config: SessionConfig,
    snapshot: &SqliteSnapshot,
) -> anyhow::Result<StudySession> {
    let provider = FastEmbedProvider::create(config.embedding.clone())
        .await
        .context("Failed to load embedding model")?;
    StudySession::restore(config, Arc::new(provider), snapshot).await
}

fn source_of(unit: &ContextUnit) -> Option<&str> {
    unit.metadata.get("source").map(String::as_str)
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect::<String>().replace('\n', " ")
}

fn print_results(results: &[ScoredUnit], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let output: Vec<SearchResult> = results
                .iter()
                .map(|r| SearchResult {
                    id: &r.unit.id,
                    score: r.score,
                    source: source_of(&r.unit),
                    text: &r.unit.text,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Summary => {
            println!("Found {} results:", results.len());
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "  {}. [{:.4}] {} | {}",
                    rank + 1,
                    result.score,
                    result.unit.id,
                    preview(&result.unit.text)
                );
            }
        }
        OutputFormat::Full => {
            for result in results {
                println!("ID: {}", result.unit.id);
                println!("Score: {:.4}", result.score);
                println!("Source: {}", source_of(&result.unit).unwrap_or("-"));
                println!("Content:\n{}", result.unit.text);
                println!("---");
            }
        }
    }
    Ok(())
}

fn print_units(units: &[ContextUnit], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(units)?);
        }
        OutputFormat::Summary => {
            println!("Found {} units:", units.len());
            for unit in units {
                println!(
                    "  ID: {} | Source: {} | {} chars",
                    unit.id,
                    source_of(unit).unwrap_or("-"),
                    unit.text.chars().count()
                );
            }
        }
        OutputFormat::Full => {
            for unit in units {
                println!("ID: {}", unit.id);
                for (key, value) in &unit.metadata {
                    println!("{key}: {value}");
                }
                println!("Content:\n{}", unit.text);
                println!("---");
            }
        }
    }
    Ok(())
}
