// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use bookcover_vqa::{
    cli::{execute, Cli},
    version,
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Logs go to stderr; stdout carries only the answer
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("{}", version::get_version_string());

    match execute(cli).await {
        Ok(answer) => {
            info!(
                "Answered from {} ({}x{}) in {}ms",
                answer.model,
                answer.image.width,
                answer.image.height,
                answer.timings.total_ms()
            );
            println!("{}", answer.text);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
