use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docindex::{
    config, embedding,
    document::FileParser,
    inference::{InferenceClient, InferencePolicy},
    logging,
    processing::{
        CollectionTarget, Retriever, TokenChunker, UploadPipeline, UploadRequest, UploadSettings,
    },
    qdrant::QdrantService,
    summarization,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

#[derive(Parser)]
#[command(
    name = "docindex",
    about = "Ingest Word and PDF documents into Qdrant and query them"
)]
struct Cli {
    /// Log directive used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse, chunk, embed, summarize and upload every document in a directory.
    Upload {
        /// Directory holding the .docx and .pdf files.
        #[arg(long)]
        db_path: PathBuf,
        /// Drop and recreate the collection before uploading.
        #[arg(long)]
        recreate: bool,
        /// Target the production collection.
        #[arg(long)]
        prod: bool,
        /// Print the final report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Return the chunks nearest to a query.
    Search {
        /// Query text.
        query: String,
        /// Number of hits to return.
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        /// Search the production collection.
        #[arg(long)]
        prod: bool,
        /// Print hits as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing(&cli.log_level);

    let embedder =
        embedding::client_from_config(config).context("failed to build embedding client")?;
    let index = Arc::new(QdrantService::from_config(config).context("failed to build Qdrant client")?);

    match cli.command {
        Command::Upload {
            db_path,
            recreate,
            prod,
            json,
        } => {
            let summarizer = summarization::client_from_config(config)
                .context("failed to build summarization client")?;
            let chunker = TokenChunker::from_config(config).context("failed to build chunker")?;
            let inference =
                InferenceClient::new(embedder, summarizer, InferencePolicy::from_config(config));

            let pipeline = UploadPipeline::new(
                Arc::new(FileParser::new()),
                Arc::new(chunker),
                inference,
                index,
                UploadSettings::from_config(config),
            )
            .with_progress(progress_bar()?);

            let report = pipeline
                .run(UploadRequest {
                    db_path,
                    recreate,
                    target: target(prod),
                })
                .await
                .context("upload failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("failed to encode report")?
                );
            } else {
                println!("{report}");
                for skipped in &report.skipped_documents {
                    println!(
                        "  skipped {} ({:?}): {}",
                        skipped.path.display(),
                        skipped.stage,
                        skipped.reason
                    );
                }
            }
        }
        Command::Search {
            query,
            top_k,
            prod,
            json,
        } => {
            let retriever = Retriever::new(
                embedder,
                index,
                config.collection_for(prod),
                config.embedding_dimension,
            );
            let hits = retriever
                .search(&query, top_k)
                .await
                .context("search failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&hits).context("failed to encode hits")?
                );
            } else {
                for hit in &hits {
                    println!("[{:.4}] {} ({}) #{}", hit.score, hit.doc_title, hit.doc_source, hit.id);
                    println!("    {}", hit.summary);
                }
            }
        }
    }

    Ok(())
}

fn target(prod: bool) -> CollectionTarget {
    if prod {
        CollectionTarget::Prod
    } else {
        CollectionTarget::Dev
    }
}

fn progress_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} points ({percent}%) {msg}",
            )
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}
