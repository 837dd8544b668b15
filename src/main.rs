// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use showreel::{Catalog, CmsClient, Config};

mod cli;
use cli::{CommandContext, OutputFormat, PageCommand};

fn cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser)]
#[command(name = "showreel")]
#[command(about = "Browse a streaming catalog served by a headless CMS")]
#[command(version)]
#[command(styles = cargo_style())]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging to file (showreel_debug.log)
    #[arg(long, global = true)]
    debug_log: bool,

    /// Config file to use instead of ~/.config/showreel/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: String,

    /// Keep the page open, revalidating every N seconds
    #[arg(short, long, global = true, value_name = "SECS")]
    watch: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Hero carousel and show carousels (default if no command given)
    Home,
    /// Shows belonging to one genre
    Genre {
        /// Genre id
        id: String,
    },
    /// Show details with seasons and episodes
    Show {
        /// Show id
        id: String,
    },
    /// Fuzzy search over show names and descriptions
    Search {
        /// Search query
        query: String,
    },
}

fn init_logging(cli: &Cli) -> Result<()> {
    if cli.debug_log {
        let file = File::create("showreel_debug.log")?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(
                EnvFilter::from_default_env()
                    .add_directive("showreel=debug".parse()?)
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into())
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("hyper_util=error".parse()?),
            )
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(Config::default_path()),
    };

    let format = OutputFormat::from_str(&cli.format)?;
    let watch = match cli.watch {
        Some(0) => anyhow::bail!("--watch interval must be at least 1 second"),
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
    };

    let client = CmsClient::from_env(&config.api).context("Invalid CMS configuration")?;
    tracing::debug!("Using CMS API at {}", client.base_url());
    let catalog = Catalog::new(client, config.cache.query_options());

    let command = match cli.command {
        Some(Commands::Home) | None => PageCommand::Home,
        Some(Commands::Genre { id }) => PageCommand::Genre { id },
        Some(Commands::Show { id }) => PageCommand::Show { id },
        Some(Commands::Search { query }) => PageCommand::Search { query },
    };

    let context = CommandContext::new(catalog, config.ui, format, watch);
    command.execute(context).await
}
