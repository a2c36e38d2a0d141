//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - analyze: Stream the analysis of one question
//! - cache show/delete/clear: Inspect and prune cached analyses
//! - dataset import/show: Manage the question dataset
//! - serve: Run the analysis relay

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sdk::types::{AnalysisResult, PerspectiveKey, QuestionId};

use crate::analysis::{AnalysisOrchestrator, BranchRunner, UpdateCallback};
use crate::config::{Config, TransportKind};
use crate::dataset::{import_catalog, load_catalog, QuestionCatalog};
use crate::db::{open_store, CacheStore};
use crate::llm::{CompletionTransport, OpenAICompatibleTransport, RelayTransport};
use crate::server::RelayServer;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Options of the `analyze` command
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    pub id: QuestionId,
    pub dataset: Option<PathBuf>,
    pub multi: bool,
    pub no_stream: bool,
    pub refresh: bool,
}

/// Build the outbound transport selected in the config
pub fn build_transport(config: &Config) -> Result<Arc<dyn CompletionTransport>> {
    let timeout = config.transport.timeout();
    let transport: Arc<dyn CompletionTransport> = match config.transport.kind {
        TransportKind::Direct => Arc::new(
            OpenAICompatibleTransport::new(timeout).context("Failed to build HTTP client")?,
        ),
        TransportKind::Relay => {
            let url = config
                .transport
                .relay_url
                .clone()
                .context("transport.relay_url is not set")?;
            Arc::new(RelayTransport::new(url, timeout).context("Failed to build HTTP client")?)
        }
    };
    tracing::debug!("Using {} transport", transport.name());
    Ok(transport)
}

/// Open the cache store unless it is disabled
pub async fn open_cache(config: &Config) -> Result<Option<Arc<CacheStore>>> {
    if !config.cache.enabled {
        tracing::info!("Cache disabled, results will not be remembered");
        return Ok(None);
    }

    let store = open_store(&config.cache_path(), config.cache.schema_version)
        .await
        .context("Failed to open cache store")?;
    Ok(Some(Arc::new(store)))
}

/// Analyse one question
///
/// In text mode a simple streaming analysis is printed as it arrives; every
/// other combination prints the settled result.
pub async fn handle_analyze(
    args: AnalyzeArgs,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let cache = open_cache(config).await?;
    let catalog = load_catalog(cache.as_deref(), args.dataset.as_deref())
        .await
        .context("Failed to load question dataset")?;

    let runner =
        BranchRunner::new(build_transport(config)?).with_canned_timing(config.canned.timing());
    let mut orchestrator = AnalysisOrchestrator::new(runner, Arc::new(catalog));
    if let Some(store) = &cache {
        orchestrator = orchestrator.with_cache(Arc::clone(store), config.cache.persist_results);
    }

    let mut settings = config.analysis.clone();
    settings.multi_perspective_enabled = args.multi;
    settings.streaming_enabled = !args.no_stream;

    if settings.credential().is_none() {
        tracing::warn!("No API key configured, producing a sample analysis");
    }

    let live =
        matches!(format, OutputFormat::Text) && settings.streaming_enabled && !args.multi;
    let printer = Arc::new(StreamPrinter::default());
    let on_update: Option<UpdateCallback> = if live {
        let printer = Arc::clone(&printer);
        Some(Arc::new(move |_id: QuestionId, result: &AnalysisResult| {
            if let Some(text) = result.as_simple() {
                printer.show(text);
            }
        }))
    } else {
        None
    };

    let outcome = if args.refresh {
        orchestrator
            .refresh_analysis(args.id, &settings, on_update)
            .await
    } else {
        orchestrator
            .request_analysis(args.id, &settings, on_update)
            .await
    };

    if let Some(store) = &cache {
        store.close().await.context("Failed to close cache store")?;
    }
    let result = outcome.context("Analysis failed")?;

    match format {
        OutputFormat::Text => {
            if live && printer.has_output() {
                printer.show(result.as_simple().unwrap_or_default());
                println!();
            } else {
                print_result(&result);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "id": args.id,
                "result": result,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show the cached analysis of one question
pub async fn handle_cache_show(
    id: QuestionId,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let store = require_cache(config).await?;
    let record = store
        .analyses()
        .get(id)
        .await
        .context("Failed to read cached analysis")?;
    store.close().await?;

    match format {
        OutputFormat::Text => match record {
            Some(record) => {
                let written = chrono::DateTime::from_timestamp_millis(record.written_at)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "Unknown".to_string());
                println!("Question {} (cached {})", id, written);
                println!();
                print_result(&record.payload);
            }
            None => println!("No cached analysis for question {}", id),
        },
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "record": record }))?);
        }
    }

    Ok(())
}

/// Delete the cached analysis of one question
pub async fn handle_cache_delete(
    id: QuestionId,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let store = require_cache(config).await?;
    let existed = store
        .analyses()
        .delete(id)
        .await
        .context("Failed to delete cached analysis")?;
    store.close().await?;

    match format {
        OutputFormat::Text if existed => println!("Deleted cached analysis of question {}", id),
        OutputFormat::Text => println!("No cached analysis for question {}", id),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "id": id, "deleted": existed }))?
            );
        }
    }

    Ok(())
}

/// Delete every cached analysis
pub async fn handle_cache_clear(config: &Config, format: OutputFormat) -> Result<()> {
    let store = require_cache(config).await?;
    let removed = store
        .analyses()
        .clear()
        .await
        .context("Failed to clear cached analyses")?;
    store.close().await?;

    match format {
        OutputFormat::Text => println!("Removed {} cached analyses", removed),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "removed": removed }))?);
        }
    }

    Ok(())
}

/// Import a dataset file into the cache
pub async fn handle_dataset_import(
    path: PathBuf,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let cache = open_cache(config).await?;
    let catalog = import_catalog(cache.as_deref(), &path)
        .await
        .with_context(|| format!("Failed to import {}", path.display()))?;
    if let Some(store) = &cache {
        store.close().await?;
    }

    match format {
        OutputFormat::Text => println!("Imported {} questions", catalog.len()),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "imported": catalog.len() }))?
            );
        }
    }

    Ok(())
}

/// List the cached questions
pub async fn handle_dataset_show(config: &Config, format: OutputFormat) -> Result<()> {
    let store = require_cache(config).await?;
    let catalog = load_catalog(Some(store.as_ref()), None).await;
    let cached_ids = store.analyses().list_ids().await.unwrap_or_default();
    store.close().await?;
    let catalog: QuestionCatalog = catalog.context("Failed to load question dataset")?;

    match format {
        OutputFormat::Text => {
            println!("Questions ({}):", catalog.len());
            println!();
            for question in catalog.questions() {
                let marker = if cached_ids.contains(&question.id) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {:>5}  [{}] {} ({}, {})",
                    marker,
                    question.id,
                    question.category,
                    question.content,
                    question.company,
                    question.level
                );
            }
            println!();
            println!("* = analysis cached");
        }
        OutputFormat::Json => {
            let output = json!({
                "questions": catalog.questions(),
                "count": catalog.len(),
                "cached": cached_ids,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Run the relay until Ctrl-C
pub async fn handle_serve(bind: Option<String>, config: &Config) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let upstream: Arc<dyn CompletionTransport> = Arc::new(
        OpenAICompatibleTransport::new(crate::server::MAX_DURATION)
            .context("Failed to build HTTP client")?,
    );

    let server = RelayServer::start(&bind, upstream)
        .await
        .context("Failed to start relay server")?;
    println!("Analysis relay listening on http://{}", server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    server.shutdown().await;
    Ok(())
}

async fn require_cache(config: &Config) -> Result<Arc<CacheStore>> {
    open_cache(config)
        .await?
        .context("The cache is disabled in the configuration (cache.enabled = false)")
}

fn print_result(result: &AnalysisResult) {
    match result {
        AnalysisResult::Simple(text) => println!("{}", text),
        AnalysisResult::Perspectives(perspectives) => {
            for key in PerspectiveKey::ALL {
                println!("==== {} ====", key);
                println!("{}", perspectives.get(key));
                println!();
            }
        }
    }
}

/// Prints the growing text of a streaming analysis without repeating itself
#[derive(Default)]
struct StreamPrinter {
    printed: Mutex<String>,
}

impl StreamPrinter {
    fn show(&self, text: &str) {
        let Ok(mut printed) = self.printed.lock() else {
            return;
        };
        let mut stdout = std::io::stdout().lock();

        if let Some(rest) = text.strip_prefix(printed.as_str()) {
            let _ = write!(stdout, "{}", rest);
        } else {
            // The text was replaced (e.g. by a failure message)
            let _ = write!(stdout, "\n{}", text);
        }
        let _ = stdout.flush();
        *printed = text.to_string();
    }

    fn has_output(&self) -> bool {
        self.printed.lock().map(|p| !p.is_empty()).unwrap_or(false)
    }
}
