// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::RetrievalConfig;

/// Context recall CLI
#[derive(Parser, Debug)]
#[command(name = "context-recall")]
#[command(version)]
#[command(about = "Embed text and retrieve chat and screen context", long_about = None)]
pub struct Cli {
    /// TOML config file; environment variables are used when absent
    #[arg(long, global = true, env = "RETRIEVAL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the embedding of a piece of text
    Embed(commands::EmbedArgs),

    /// Insert records from a JSON Lines file into a collection
    Ingest(commands::IngestArgs),

    /// Retrieve records relevant to a query
    Search(commands::SearchArgs),
}

impl Cli {
    pub fn load_config(&self) -> Result<RetrievalConfig> {
        let config = match &self.config {
            Some(path) => RetrievalConfig::from_file(path)?,
            None => RetrievalConfig::from_env(),
        };
        config.validate()?;
        debug!(?config, "Loaded configuration");
        Ok(config)
    }
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    match cli.command {
        Commands::Embed(args) => commands::embed(args, &config).await,
        Commands::Ingest(args) => commands::ingest(args, &config).await,
        Commands::Search(args) => commands::search(args, &config).await,
    }
}
