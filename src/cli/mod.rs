// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use showreel::Catalog;
use showreel::config::UiConfig;
use showreel::pages::{GenrePage, HomePage, Page, PageView, SearchPage, ShowPage};

pub mod render;

/// Output format for rendered pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid format: {}. Use 'text' or 'json'", s),
        }
    }
}

/// Which page to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCommand {
    Home,
    Genre { id: String },
    Show { id: String },
    Search { query: String },
}

/// Everything a page command needs to load and render
pub struct CommandContext {
    pub catalog: Catalog,
    pub ui: UiConfig,
    pub format: OutputFormat,
    /// Revalidation interval; `None` renders once and exits.
    pub watch: Option<Duration>,
}

impl CommandContext {
    pub fn new(
        catalog: Catalog,
        ui: UiConfig,
        format: OutputFormat,
        watch: Option<Duration>,
    ) -> Self {
        Self {
            catalog,
            ui,
            format,
            watch,
        }
    }
}

enum Event {
    Quit,
    Tick,
    Changed(bool),
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

impl PageCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        let catalog = &context.catalog;

        match self {
            PageCommand::Home => {
                let pb = spinner("Loading home page...");
                let data = HomePage::load(catalog).await;
                pb.finish_and_clear();
                let data = data.context("Failed to load home page")?;

                let page = HomePage::open(catalog, Some(data), &context.ui);
                run(page, &context, render::home).await
            }
            PageCommand::Genre { id } => {
                let pb = spinner(&format!("Loading genre {}...", id));
                let data = GenrePage::load(catalog, &id).await;
                pb.finish_and_clear();
                let data = data.with_context(|| format!("Failed to load genre {}", id))?;

                let page = GenrePage::open(catalog, &id, Some(data), &context.ui);
                run(page, &context, render::genre).await
            }
            PageCommand::Show { id } => {
                let pb = spinner(&format!("Loading show {}...", id));
                let data = ShowPage::load(catalog, &id).await;
                pb.finish_and_clear();
                let data = data.with_context(|| format!("Failed to load show {}", id))?;

                let page = ShowPage::open(catalog, &id, Some(data), &context.ui);
                run(page, &context, render::show).await
            }
            PageCommand::Search { query } => {
                let pb = spinner("Loading shows...");
                let shows = SearchPage::load(catalog).await;
                pb.finish_and_clear();
                let shows = shows.context("Failed to load shows")?;

                let page = SearchPage::open(catalog, &query, Some(shows), &context.ui);
                run(page, &context, render::search).await
            }
        }
    }
}

fn print_view<P: Page>(
    page: &P,
    format: OutputFormat,
    text: fn(&P::View) -> String,
) -> Result<()> {
    let view = page.view();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        OutputFormat::Text => match view {
            PageView::Pending | PageView::Loading => println!("Loading..."),
            PageView::Error(message) => println!("Error: {}", message),
            PageView::Ready(view) => print!("{}", text(&view)),
        },
    }
    Ok(())
}

async fn run<P: Page>(
    mut page: P,
    context: &CommandContext,
    text: fn(&P::View) -> String,
) -> Result<()> {
    print_view(&page, context.format, text)?;

    let Some(interval) = context.watch else {
        drop(page);
        context.catalog.shutdown();
        return Ok(());
    };

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => Event::Quit,
            _ = ticker.tick() => Event::Tick,
            changed = page.session_mut().changed() => Event::Changed(changed),
        };

        match event {
            Event::Quit => break,
            Event::Tick => {
                let started = page.session().revalidate();
                let evicted = context.catalog.cache().collect_garbage();
                tracing::debug!(
                    "Revalidation tick: {} refetch(es) started, {} entries evicted",
                    started,
                    evicted
                );
            }
            Event::Changed(false) => break,
            Event::Changed(true) => {
                if page.session().is_fetching() {
                    continue;
                }
                if context.format == OutputFormat::Text {
                    println!();
                    println!(
                        "--- {} ---",
                        render::updated_line(page.session().last_updated())
                    );
                }
                print_view(&page, context.format, text)?;
            }
        }
    }

    drop(page);
    context.catalog.shutdown();
    Ok(())
}
