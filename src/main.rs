//! Multitake CLI - Take Mixer
//!
//! Command-line interface for the Multitake session engine.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multitake::cli::commands::{self, MixArgs};
use multitake::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "multitake=debug"
    } else {
        "multitake=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Multitake v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd).await,
        None => {
            println!("Multitake v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

async fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Mix {
            inputs,
            dir,
            gains,
            output,
            config,
        } => {
            commands::mix(MixArgs {
                inputs,
                dir,
                gains,
                output,
                config,
            })
            .await
            .context("mix failed")?;
        }
        Commands::Inspect { path } => {
            commands::inspect(&path)
                .await
                .with_context(|| format!("cannot inspect {}", path.display()))?;
        }
    }
    Ok(())
}
