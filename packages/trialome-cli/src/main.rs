//! Trialome command-line interface.
//!
//! Four verbs: `extract-single` and `extract-all` run guideline images
//! through the vision model, `tag-keywords` annotates extracted files
//! with clinical keywords, and `tabulate-trials` turns trial records
//! into an annotated CSV through the batch API.

mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use extraction::pipeline::{self, BatchConfig, BatchMode, TrialBatchConfig};
use extraction::{keywords, GeminiDagExtractor, UploadCache};
use gemini_client::GeminiClient;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "trialome", version, about = "Oncology guideline and trial extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract one guideline image to a .dag.json file
    ExtractSingle {
        /// Path to the image
        image: PathBuf,

        /// Directory for the output file (defaults to the image's directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Extract every image in a directory, resuming from the index
    ExtractAll {
        /// Directory of guideline images
        input_dir: PathBuf,

        /// Directory for .dag.json artifacts and the index
        output_dir: PathBuf,

        /// Index file path (defaults to <output_dir>/extraction_index.json)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Reprocess every image regardless of index state
        #[arg(long, conflicts_with = "retry_failed")]
        force: bool,

        /// Reprocess only images recorded as failed
        #[arg(long)]
        retry_failed: bool,
    },

    /// Tag extracted .dag.json files with clinical keywords
    TagKeywords {
        /// Directory of .dag.json files
        dir: PathBuf,

        /// Tagging concurrency
        #[arg(long, default_value_t = keywords::DEFAULT_WORKERS)]
        workers: usize,
    },

    /// Annotate trial records into a CSV through the batch API
    TabulateTrials {
        /// Directory of ClinicalTrials.gov JSON records
        trial_dir: PathBuf,

        /// Output CSV path
        #[arg(long, default_value = "trial_extractions.csv")]
        output: PathBuf,

        /// Requests per batch job
        #[arg(long, default_value_t = pipeline::trials::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,extraction=debug,gemini_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::ExtractSingle { image, output_dir } => {
            let config = Config::from_env()?;
            let client = GeminiClient::new(config.gemini_api_key);
            // Share the cache with batch runs writing to the same directory
            let cache = UploadCache::new(upload_cache_path(&image, output_dir.as_deref()));
            let extractor = GeminiDagExtractor::new(client, config.gemini_model, cache);
            let (path, dag) =
                pipeline::extract_single(&image, output_dir.as_deref(), &extractor).await?;
            info!(
                output = %path.display(),
                nodes = dag.node_count(),
                confidence = dag.extraction_confidence,
                "Extraction written"
            );
        }

        Command::ExtractAll {
            input_dir,
            output_dir,
            index,
            force,
            retry_failed,
        } => {
            let mode = if force {
                BatchMode::Force
            } else if retry_failed {
                BatchMode::RetryFailedOnly
            } else {
                BatchMode::Normal
            };

            let config = Config::from_env()?;
            let client = GeminiClient::new(config.gemini_api_key);
            let cache = UploadCache::new(output_dir.join("upload_cache.json"));
            let extractor = GeminiDagExtractor::new(client, config.gemini_model, cache);

            let mut batch = BatchConfig::new(input_dir, output_dir).with_mode(mode);
            if let Some(index) = index {
                batch = batch.with_index_path(index);
            }

            let report = pipeline::run_batch(&batch, &extractor).await?;
            if report.failed > 0 {
                warn!(
                    failed = report.failed,
                    "Some images failed; re-run with --retry-failed"
                );
            }
        }

        Command::TagKeywords { dir, workers } => {
            keywords::tag_directory(&dir, workers).await?;
        }

        Command::TabulateTrials {
            trial_dir,
            output,
            batch_size,
        } => {
            let config = Config::from_env()?;
            let client = GeminiClient::new(config.gemini_api_key);

            let cancel = CancellationToken::new();
            let handle = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; stopping after the current poll");
                    handle.cancel();
                }
            });

            let trial_config = TrialBatchConfig::new(config.gemini_model)
                .with_batch_size(batch_size)
                .with_poll_interval(Duration::from_secs(30));

            pipeline::run_trial_batch(&client, &trial_config, &trial_dir, &output, &cancel)
                .await?;
        }
    }

    Ok(())
}

/// Cache location for a single-shot extraction: the output directory
/// when given, otherwise the image's own directory. Batch runs over the
/// same directory then reuse the same cache file.
fn upload_cache_path(image: &Path, output_dir: Option<&Path>) -> PathBuf {
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| image.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join("upload_cache.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_force_conflicts_with_retry_failed() {
        assert!(Cli::try_parse_from([
            "trialome",
            "extract-all",
            "images",
            "json",
            "--force",
            "--retry-failed"
        ])
        .is_err());
    }

    #[test]
    fn test_tag_keywords_needs_no_api_arguments() {
        let cli = Cli::try_parse_from(["trialome", "tag-keywords", "data/json"]).unwrap();
        match cli.command {
            Command::TagKeywords { dir, workers } => {
                assert_eq!(dir, PathBuf::from("data/json"));
                assert_eq!(workers, keywords::DEFAULT_WORKERS);
            }
            _ => panic!("expected tag-keywords"),
        }
    }

    #[test]
    fn test_upload_cache_path_follows_output() {
        assert_eq!(
            upload_cache_path(Path::new("data/images/p1.jpg"), None),
            PathBuf::from("data/images/upload_cache.json")
        );
        assert_eq!(
            upload_cache_path(Path::new("data/images/p1.jpg"), Some(Path::new("out"))),
            PathBuf::from("out/upload_cache.json")
        );
    }
}
