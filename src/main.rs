mod anchor;
mod api;
mod app;
mod comparison;
mod error;
mod geometry;
mod layout;
mod request;
mod selection;
mod session;
mod util;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, ensure};
use clap::Parser;

use crate::api::{DEFAULT_TIMEOUT, HttpApi};
use crate::app::{ExplorerApp, ExplorerParams};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Base URL of the clustering and statistics service.
    #[arg(long, default_value = "http://127.0.0.1:5001")]
    api_url: String,

    #[arg(long, default_value_t = 12)]
    layer: u32,

    /// Minimum activation score for a concept to label a feature.
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    #[arg(long, default_value = "thingsplus")]
    concept_dataset: String,

    /// Largest group the ball mapper may form.
    #[arg(long, default_value_t = 3)]
    max_size: u32,

    /// 0 keeps graph nodes over their points; 1 is a free force layout.
    #[arg(long, default_value_t = 0.0)]
    layout_mix: f32,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,
}

impl Args {
    fn params(&self) -> anyhow::Result<ExplorerParams> {
        ensure!(
            (0.0..=1.0).contains(&self.threshold),
            "--threshold must be within 0..=1, got {}",
            self.threshold
        );
        ensure!(
            (0.0..=1.0).contains(&self.layout_mix),
            "--layout-mix must be within 0..=1, got {}",
            self.layout_mix
        );
        ensure!(self.max_size >= 1, "--max-size must be at least 1");
        ensure!(self.timeout_secs >= 1, "--timeout-secs must be at least 1");

        Ok(ExplorerParams {
            layer: self.layer,
            threshold: self.threshold,
            concept_dataset: self.concept_dataset.clone(),
            max_size: self.max_size,
            epsilon: None,
            layout_mix: self.layout_mix,
        })
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let params = args.params().context("invalid command line")?;
    let api = HttpApi::new(&args.api_url, Duration::from_secs(args.timeout_secs))
        .context("failed to build the HTTP client")?;
    let api = Arc::new(api);
    log::info!("using data service at {}", args.api_url);

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1600.0, 960.0]),
        ..Default::default()
    };

    eframe::run_native(
        "sae-atlas",
        options,
        Box::new(move |cc| Ok(Box::new(ExplorerApp::new(cc, api, params)))),
    )
    .map_err(|error| anyhow::anyhow!("window failed: {error}"))
}
