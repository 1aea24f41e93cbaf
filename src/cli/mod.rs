// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::RagConfig;

/// Remodeling assistant CLI
#[derive(Parser, Debug)]
#[command(name = "remodel-rag")]
#[command(version)]
#[command(about = "Ask questions about our remodeling services from the command line", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the index from a knowledge base file
    Ingest(commands::IngestArgs),

    /// Show the passages most similar to a query
    Search(commands::SearchArgs),

    /// Ask a single question, optionally about a photo
    Ask(commands::AskArgs),

    /// Start an interactive chat session
    Chat,

    /// Print the turns of a stored conversation
    History(commands::HistoryArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli, config: RagConfig) -> Result<()> {
    match cli.command {
        Commands::Ingest(args) => commands::ingest(args, &config).await,
        Commands::Search(args) => commands::search(args, &config).await,
        Commands::Ask(args) => commands::ask(args, &config).await,
        Commands::Chat => commands::chat(&config).await,
        Commands::History(args) => commands::history(args, &config).await,
    }
}
