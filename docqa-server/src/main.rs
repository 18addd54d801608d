//! # docqa
//!
//! Usage:
//!   docqa                              # Start the HTTP API (same as `docqa serve`)
//!   docqa --port 9000 serve            # Custom port
//!   docqa ingest notes.txt --replace   # Index a text file, replacing older chunks
//!   docqa ask "What color is the sky?" # Answer a question from the command line

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa_server::{
    EmbedderKind, GeneratorKind, Settings, build_service, read_text_document, run_server,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docqa", version, about = "Answer questions over a private document collection")]
struct Cli {
    /// Address to bind the HTTP API to
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port for the HTTP API
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Snapshot file for the in-memory index
    #[arg(long, global = true)]
    index_path: Option<PathBuf>,

    /// Embedding provider: hashing, openai, or gemini
    #[arg(long, global = true)]
    embedder: Option<EmbedderKind>,

    /// Answer generator: gemini or openai
    #[arg(long, global = true)]
    generator: Option<GeneratorKind>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve,
    /// Index a UTF-8 text file (form feeds separate pages)
    Ingest {
        file: PathBuf,
        /// Replace chunks previously indexed from this file
        #[arg(long)]
        replace: bool,
    },
    /// Answer one question and print the evidence used
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Print index statistics
    Status,
    /// List indexed document sources
    Sources,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(path) = &self.index_path {
            settings.index_path = path.clone();
        }
        if let Some(embedder) = self.embedder {
            settings.embedder = embedder;
        }
        if let Some(generator) = self.generator {
            settings.generator = generator;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    cli.apply_overrides(&mut settings);

    let service = Arc::new(build_service(&settings).await?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(&settings, service).await?,
        Command::Ingest { file, replace } => {
            let document = read_text_document(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let report = if replace {
                service.ingest_replacing(&document.pages).await?
            } else {
                service.ingest(&document.pages).await?
            };
            println!(
                "Ingested {}: {} chunks added, {} stale chunks removed, {} blank pages skipped",
                document.source, report.chunks_added, report.chunks_removed, report.pages_skipped
            );
        }
        Command::Ask { question, top_k } => {
            let answer = service.query(&question, top_k).await?;
            println!("{}\n", answer.answer);
            println!("mode: {}", answer.mode);
            for chunk in &answer.evidence {
                println!(
                    "  [{:.4}] {} p.{} ({})",
                    chunk.distance, chunk.metadata.source, chunk.metadata.page_number, chunk.id
                );
            }
        }
        Command::Status => {
            let status = service.status().await?;
            println!("indexed chunks: {}", status.indexed_chunks);
            println!("metric: {}", status.metric);
        }
        Command::Sources => {
            for source in service.list_sources().await? {
                println!("{source}");
            }
        }
    }

    Ok(())
}
