use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use studykit_context::{ChunkingMode, DocumentChunker, extract_pdf};
use tracing_subscriber::EnvFilter;

/// Extracts a PDF and prints its chunks as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input PDF
    #[arg(short, long)]
    input: PathBuf,

    /// Maximum length for each chunk in bytes; omit to emit the whole document
    #[arg(short, long)]
    max_chunk_length: Option<usize>,
}

#[derive(Serialize)]
struct Output<'a> {
    name: &'a str,
    pages: usize,
    content_hash: String,
    chunks: Vec<studykit_context::TextChunk>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let document = extract_pdf(&args.input)?;
    let mode = match args.max_chunk_length {
        Some(max_chunk_length) => ChunkingMode::Windowed { max_chunk_length },
        None => ChunkingMode::WholeDocument,
    };
    let chunker = DocumentChunker::new(document.name.clone(), mode)?;

    let output = Output {
        name: &document.name,
        pages: document.page_count,
        content_hash: document.content_hash_hex(),
        chunks: chunker.chunk(&document.text),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
