use std::{path::PathBuf, sync::Arc};

mod backend_bridge;
mod controller;
mod ui;

use anyhow::{anyhow, Result};
use clap::Parser;
use client_core::{config::set_model, load_settings};
use crossbeam_channel::{bounded, unbounded};
use eframe::egui;
use shared::domain::{Genre, TargetLength};
use tracing_subscriber::EnvFilter;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiEvent;
use crate::ui::{app::load_preferences, theme, NovelStudioApp, StartupConfig};

#[derive(Parser, Debug)]
#[command(name = "novel_studio", about = "AI 小说创作助手")]
struct Args {
    /// TOML file with api_key, model and base_url.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    /// Initial genre id (scifi, xianxia, postapoc, fantasy, urban, mystery).
    #[arg(long)]
    genre: Option<Genre>,
    /// Initial length id (short, medium, long).
    #[arg(long)]
    length: Option<TargetLength>,
    /// tracing filter directive, e.g. `info,client_core=debug`.
    #[arg(long)]
    log_filter: Option<String>,
}

fn init_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_filter.as_deref());

    let user_config_dir = dirs::config_dir();
    let mut settings = load_settings(args.config.as_deref(), user_config_dir.as_deref());
    if let Some(model) = args.model.as_deref() {
        set_model(&mut settings, model);
    }
    if !settings.has_api_key() {
        tracing::warn!("no Gemini API key configured; generation requests will fail until one is set");
    }
    tracing::info!(model = %settings.model, base_url = %settings.base_url, "starting novel studio");

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = unbounded::<UiEvent>();
    let startup = StartupConfig {
        model: settings.model.clone(),
        genre: args.genre,
        target_length: args.length,
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("AI 小说创作助手")
            .with_inner_size([1280.0, 820.0])
            .with_min_inner_size([960.0, 620.0]),
        ..Default::default()
    };
    eframe::run_native(
        "novel_studio",
        options,
        Box::new(move |cc| {
            theme::install_cjk_fonts(&cc.egui_ctx);

            let repaint_ctx = cc.egui_ctx.clone();
            backend_bridge::runtime::launch(
                settings,
                cmd_rx,
                ui_tx,
                Arc::new(move || repaint_ctx.request_repaint()),
            );

            let preferences = load_preferences(cc.storage);
            Ok(Box::new(NovelStudioApp::new(cmd_tx, ui_rx, preferences, startup)))
        }),
    )
    .map_err(|err| anyhow!("desktop ui exited with an error: {err}"))
}
