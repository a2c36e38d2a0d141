//! CLI interface for Ferusher
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use sdk::types::QuestionId;
use std::path::PathBuf;

/// Ferusher interview question analyser
///
/// Streams AI analyses of interview questions and remembers completed
/// results between runs.
#[derive(Parser, Debug)]
#[command(name = "ferusher")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyse one question from the dataset
    Analyze {
        /// Question id (1-based position in the dataset)
        id: QuestionId,

        /// Dataset file to import if none is cached yet
        #[arg(long, value_name = "PATH")]
        dataset: Option<PathBuf>,

        /// Produce coach, deep and quick analyses side by side
        #[arg(long)]
        multi: bool,

        /// Wait for the complete answer instead of streaming it
        #[arg(long)]
        no_stream: bool,

        /// Ignore the cached analysis and generate a new one
        #[arg(long)]
        refresh: bool,
    },

    /// Inspect or prune cached analyses
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage the question dataset
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },

    /// Run the analysis relay server
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the cached analysis of a question
    Show {
        /// Question id
        id: QuestionId,
    },

    /// Delete the cached analysis of a question
    Delete {
        /// Question id
        id: QuestionId,
    },

    /// Delete every cached analysis
    Clear,
}

/// Dataset management actions
#[derive(Subcommand, Debug)]
pub enum DatasetAction {
    /// Import a dataset file of compact records into the cache
    Import {
        /// Path to the JSON dataset
        path: PathBuf,
    },

    /// List the cached questions
    Show,
}
