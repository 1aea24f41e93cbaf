// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Parser;
use remodel_rag::cli::{execute, Cli};
use remodel_rag::config::{RagConfig, DEFAULT_LOG_LEVEL};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before reading any configuration
    dotenv::dotenv().ok();

    // RUST_LOG wins over LOG_LEVEL when both are set. The subscriber goes up
    // first so configuration warnings are visible.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = RagConfig::from_env();

    let cli = Cli::parse();

    match execute(cli, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
