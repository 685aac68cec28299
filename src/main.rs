// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::providers::Provider;
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use obclear::app::config::Settings;
use obclear::app::logging::setup_logging;
use obclear::common::error::AppError;
use obclear::core::round::Engine;
use obclear::network::provider::ConnectionFactory;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(author, version, about = "Orderbook clearing bot")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Do not submit transactions, only size opportunities and log
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    json_log: bool,

    /// Override the number of rounds (-1 = run forever)
    #[arg(long)]
    repetitions: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let mut settings = Settings::load_with_path(cli.config.as_deref())?;
    if let Some(reps) = cli.repetitions {
        settings.repetitions = reps;
    }
    setup_logging(if settings.debug { "debug" } else { "info" }, cli.json_log);

    let signer = PrivateKeySigner::from_str(settings.key.trim())
        .map_err(|e| AppError::Config(format!("Invalid wallet key: {e}")))?;
    tracing::info!(wallet = %signer.address(), "Clearing wallet loaded");

    let probe = ConnectionFactory::first_available(&settings.rpc)?;
    let chain_id: u64 = probe
        .get_chain_id()
        .await
        .map_err(|e| AppError::Connection(format!("chain_id detect failed: {e}")))?;
    tracing::info!(chain_id, rpcs = settings.rpc.len(), "Connected");

    let engine = Engine::new(settings, signer, chain_id, cli.dry_run);
    engine.run().await
}
