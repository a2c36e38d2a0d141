// Ferusher analysis engine
// Main entry point for the ferusher binary

use clap::Parser;
use ferusher_engine::cli::{CacheAction, Cli, Command, DatasetAction};
use ferusher_engine::config::Config;
use ferusher_engine::handlers::{
    handle_analyze, handle_cache_clear, handle_cache_delete, handle_cache_show,
    handle_dataset_import, handle_dataset_show, handle_serve, AnalyzeArgs, OutputFormat,
};
use ferusher_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let loaded = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path),
        None => Config::load_or_create(),
    };

    // The subscriber can only be installed once, so wait for the configured
    // (or --log) level. Only takes effect if RUST_LOG is not set.
    let config = match loaded {
        Ok(config) => {
            init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));
            config
        }
        Err(e) => {
            init_telemetry();
            return Err(e.into());
        }
    };

    tracing::debug!("Ferusher v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Analyze {
            id,
            dataset,
            multi,
            no_stream,
            refresh,
        } => {
            tracing::info!("Analysing question {}", id);
            let args = AnalyzeArgs {
                id,
                dataset,
                multi,
                no_stream,
                refresh,
            };
            handle_analyze(args, &config, format).await
        }

        Command::Cache { action } => {
            tracing::info!("Cache management: {:?}", action);
            match action {
                CacheAction::Show { id } => handle_cache_show(id, &config, format).await,
                CacheAction::Delete { id } => handle_cache_delete(id, &config, format).await,
                CacheAction::Clear => handle_cache_clear(&config, format).await,
            }
        }

        Command::Dataset { action } => {
            tracing::info!("Dataset management: {:?}", action);
            match action {
                DatasetAction::Import { path } => {
                    handle_dataset_import(path, &config, format).await
                }
                DatasetAction::Show => handle_dataset_show(&config, format).await,
            }
        }

        Command::Serve { bind } => {
            tracing::info!("Starting analysis relay...");
            handle_serve(bind, &config).await
        }
    }
}
