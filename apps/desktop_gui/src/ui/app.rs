use arboard::Clipboard;
use chrono::{DateTime, Local};
use client_core::{SessionController, SessionEvent, StartOutcome};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Genre, TargetLength, GENRE_OPTIONS, LENGTH_OPTIONS},
    error::ProviderError,
};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::{
    events::{UiError, UiErrorContext, UiEvent},
    orchestration::dispatch_backend_command,
};
use crate::ui::{
    markdown::{self, Block},
    theme::{self, ThemePreset},
};

pub const PREFERENCES_STORAGE_KEY: &str = "novel_studio.preferences";

const OUTLINE_PLACEHOLDER: &str = "例如：一个普通的程序员在加班时意外发现了一段可以修改现实世界的代码，从此卷入了一场跨越维度的危机...";
const STORY_MAX_WIDTH: f32 = 760.0;

pub struct StartupConfig {
    pub model: String,
    pub genre: Option<Genre>,
    pub target_length: Option<TargetLength>,
}

/// Only choices are stored; outlines and generated text never touch disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPreferences {
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub target_length: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

impl PersistedPreferences {
    fn from_runtime(genre: Genre, target_length: TargetLength, theme: ThemePreset) -> Self {
        Self {
            genre: Some(genre.id().to_string()),
            target_length: Some(target_length.id().to_string()),
            theme: Some(theme.to_string()),
        }
    }

    fn into_runtime(self) -> (Genre, TargetLength, ThemePreset) {
        let genre = parse_or_default(self.genre.as_deref(), "genre");
        let target_length = parse_or_default(self.target_length.as_deref(), "target_length");
        let theme = parse_or_default(self.theme.as_deref(), "theme");
        (genre, target_length, theme)
    }
}

fn parse_or_default<T>(raw: Option<&str>, field: &'static str) -> T
where
    T: std::str::FromStr + Default,
    T::Err: std::fmt::Display,
{
    match raw.map(str::parse::<T>) {
        Some(Ok(value)) => value,
        Some(Err(err)) => {
            tracing::warn!(field, "ignoring stored preference: {err}");
            T::default()
        }
        None => T::default(),
    }
}

pub fn load_preferences(storage: Option<&dyn eframe::Storage>) -> Option<PersistedPreferences> {
    let text = storage?.get_string(PREFERENCES_STORAGE_KEY)?;
    match serde_json::from_str::<PersistedPreferences>(&text) {
        Ok(preferences) => Some(preferences),
        Err(err) => {
            tracing::warn!("discarding unreadable preferences: {err}");
            None
        }
    }
}

pub struct NovelStudioApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    controller: SessionController,
    theme: ThemePreset,
    applied_theme: Option<ThemePreset>,
    idle_status: String,
    notice: Option<UiError>,
    last_failure: Option<UiError>,
    completed_at: Option<DateTime<Local>>,
    render_epoch: u64,
    markdown_cache: Option<((u64, usize), Vec<Block>)>,
}

impl NovelStudioApp {
    pub fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        preferences: Option<PersistedPreferences>,
        startup: StartupConfig,
    ) -> Self {
        let (stored_genre, stored_length, theme) = preferences.unwrap_or_default().into_runtime();
        let mut controller = SessionController::new(startup.model);
        controller.set_genre(startup.genre.unwrap_or(stored_genre));
        controller.set_target_length(startup.target_length.unwrap_or(stored_length));

        Self {
            cmd_tx,
            ui_rx,
            controller,
            theme,
            applied_theme: None,
            idle_status: "就绪".to_string(),
            notice: None,
            last_failure: None,
            completed_at: None,
            render_epoch: 0,
            markdown_cache: None,
        }
    }

    fn preferences(&self) -> PersistedPreferences {
        let form = self.controller.form();
        PersistedPreferences::from_runtime(form.genre, form.target_length, self.theme)
    }

    pub fn start_generation(&mut self) {
        let ticket = match self.controller.start_generation() {
            Ok(StartOutcome::Started(ticket)) => ticket,
            Ok(StartOutcome::AlreadyGenerating) => return,
            Err(err) => {
                tracing::debug!("generation request rejected: {err}");
                self.last_failure = None;
                return;
            }
        };

        self.render_epoch = self.render_epoch.wrapping_add(1);
        self.completed_at = None;
        self.last_failure = None;
        self.notice = None;
        let session_id = ticket.session_id;
        if let Err(err) = dispatch_backend_command(&self.cmd_tx, BackendCommand::Generate(ticket)) {
            tracing::error!(%session_id, "could not queue generation: {}", err.message());
            self.controller.apply(SessionEvent::Failed {
                session_id,
                error: ProviderError::transport(err.message()),
            });
            self.last_failure = Some(err);
        }
    }

    pub fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Info(message) => {
                    self.idle_status = message;
                }
                UiEvent::Session(event) => self.apply_session_event(event),
                UiEvent::Error(err) => {
                    tracing::warn!(context = ?err.context(), "backend error: {}", err.message());
                    if err.context() == UiErrorContext::BackendStartup {
                        if let Some(session_id) = self.controller.active_session() {
                            self.apply_session_event(SessionEvent::Failed {
                                session_id,
                                error: ProviderError::transport(err.message()),
                            });
                        }
                    }
                    self.notice = Some(err);
                }
            }
        }
    }

    fn apply_session_event(&mut self, event: SessionEvent) {
        let failure = match &event {
            SessionEvent::Failed { error, .. } => Some(UiError::from_provider(error)),
            _ => None,
        };
        let completed = matches!(event, SessionEvent::Completed { .. });

        if !self.controller.apply(event) {
            return;
        }
        if completed {
            self.completed_at = Some(Local::now());
        }
        if failure.is_some() {
            self.last_failure = failure;
        }
    }

    pub fn status_line(&self) -> String {
        let state = self.controller.state();
        if state.is_generating() {
            return "正在创作中...".to_string();
        }
        if state.has_error() {
            // Only a session that ran and failed counts as interrupted.
            return match self.last_failure {
                Some(_) => "创作中断".to_string(),
                None => self.idle_status.clone(),
            };
        }
        match self.completed_at {
            Some(finished) if !state.accumulated_text().is_empty() => format!(
                "创作完成 · {} 字 · {}",
                state.character_count(),
                finished.format("%H:%M:%S")
            ),
            _ => self.idle_status.clone(),
        }
    }

    fn copy_story(&mut self) {
        let text = self.controller.state().accumulated_text().to_string();
        let result = Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text));
        match result {
            Ok(()) => {
                self.notice = None;
                self.idle_status = "已复制到剪贴板".to_string();
            }
            Err(err) => {
                self.notice = Some(UiError::from_message(
                    UiErrorContext::Clipboard,
                    format!("clipboard unavailable: {err}"),
                ));
            }
        }
    }

    fn story_blocks(&mut self) -> &[Block] {
        let key = (
            self.render_epoch,
            self.controller.state().accumulated_text().len(),
        );
        let stale = self
            .markdown_cache
            .as_ref()
            .map_or(true, |(cached, _)| *cached != key);
        if stale {
            let blocks = markdown::parse_blocks(self.controller.state().accumulated_text());
            self.markdown_cache = Some((key, blocks));
        }
        self.markdown_cache
            .as_ref()
            .map(|(_, blocks)| blocks.as_slice())
            .unwrap_or_default()
    }

    fn apply_theme_if_needed(&mut self, ctx: &egui::Context) {
        if self.applied_theme == Some(self.theme) {
            return;
        }
        theme::apply_theme(ctx, self.theme);
        self.applied_theme = Some(self.theme);
    }

    fn show_form_panel(&mut self, ctx: &egui::Context) {
        let colors = theme::palette(self.theme);
        egui::SidePanel::left("form_panel")
            .resizable(false)
            .exact_width(380.0)
            .frame(
                egui::Frame::new()
                    .fill(colors.sidebar_background)
                    .inner_margin(egui::Margin::same(20)),
            )
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new("✒").size(26.0).color(colors.accent));
                    ui.vertical(|ui| {
                        ui.label(egui::RichText::new("AI 小说创作助手").size(19.0).strong());
                        ui.label(egui::RichText::new("输入大纲，一键生成精彩故事").small().weak());
                    });
                });
                ui.separator();

                egui::TopBottomPanel::bottom("form_actions")
                    .frame(egui::Frame::new().inner_margin(egui::Margin::symmetric(0, 12)))
                    .show_inside(ui, |ui| self.show_actions(ui, colors));

                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        self.show_outline_input(ui);
                        ui.add_space(14.0);
                        self.show_genre_grid(ui, colors);
                        ui.add_space(14.0);
                        self.show_length_selector(ui, colors);
                    });
            });
    }

    fn show_outline_input(&mut self, ui: &mut egui::Ui) {
        ui.label(egui::RichText::new("故事大纲").strong());
        let mut outline = self.controller.form().outline.clone();
        let response = ui.add(
            egui::TextEdit::multiline(&mut outline)
                .hint_text(OUTLINE_PLACEHOLDER)
                .desired_rows(8)
                .desired_width(f32::INFINITY),
        );
        if response.changed() {
            self.controller.set_outline(outline);
        }
    }

    fn show_genre_grid(&mut self, ui: &mut egui::Ui, colors: theme::Palette) {
        ui.label(egui::RichText::new("小说类型").strong());
        let selected = self.controller.form().genre;
        let cell_width = (ui.available_width() - 8.0) / 2.0;
        egui::Grid::new("genre_grid")
            .num_columns(2)
            .spacing([8.0, 8.0])
            .show(ui, |ui| {
                for (index, option) in GENRE_OPTIONS.iter().enumerate() {
                    let is_selected = option.genre == selected;
                    let mut job = egui::text::LayoutJob::default();
                    job.append(
                        option.label,
                        0.0,
                        egui::TextFormat {
                            font_id: egui::FontId::proportional(15.0),
                            color: if is_selected {
                                colors.accent
                            } else {
                                ui.visuals().text_color()
                            },
                            ..Default::default()
                        },
                    );
                    job.append(
                        &format!("\n{}", option.description),
                        0.0,
                        egui::TextFormat {
                            font_id: egui::FontId::proportional(12.0),
                            color: ui.visuals().weak_text_color(),
                            ..Default::default()
                        },
                    );
                    let button = egui::Button::new(job)
                        .selected(is_selected)
                        .min_size(egui::vec2(cell_width, 54.0));
                    if ui.add(button).clicked() {
                        self.controller.set_genre(option.genre);
                    }
                    if index % 2 == 1 {
                        ui.end_row();
                    }
                }
            });
    }

    fn show_length_selector(&mut self, ui: &mut egui::Ui, colors: theme::Palette) {
        ui.label(egui::RichText::new("字数限制").strong());
        let selected = self.controller.form().target_length;
        let segment_width = (ui.available_width() - 16.0) / LENGTH_OPTIONS.len() as f32;
        ui.horizontal(|ui| {
            for option in &LENGTH_OPTIONS {
                let is_selected = option.length == selected;
                let mut text = egui::RichText::new(option.short_label);
                if is_selected {
                    text = text.color(colors.accent).strong();
                }
                let button = egui::Button::new(text)
                    .selected(is_selected)
                    .min_size(egui::vec2(segment_width, 34.0));
                if ui.add(button).clicked() {
                    self.controller.set_target_length(option.length);
                }
            }
        });
        ui.vertical_centered(|ui| {
            ui.label(
                egui::RichText::new(format!("目标生成字数：{}", selected.label()))
                    .small()
                    .weak(),
            );
        });
    }

    fn show_actions(&mut self, ui: &mut egui::Ui, colors: theme::Palette) {
        let state = self.controller.state();
        if state.has_error() {
            let message = state.error_message().to_string();
            let hint = self.last_failure.as_ref().and_then(UiError::hint);
            let reconfigure = self
                .last_failure
                .as_ref()
                .is_some_and(UiError::requires_reconfigure);
            egui::Frame::new()
                .fill(colors.error_fill)
                .corner_radius(egui::CornerRadius::same(8))
                .inner_margin(egui::Margin::same(10))
                .show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.colored_label(colors.error_text, message);
                    if let Some(hint) = hint {
                        let mut text = egui::RichText::new(hint).small();
                        text = if reconfigure {
                            text.color(colors.error_text)
                        } else {
                            text.weak()
                        };
                        ui.label(text);
                    }
                });
            ui.add_space(10.0);
        }

        let generating = self.controller.state().is_generating();
        let width = ui.available_width();
        if generating {
            ui.horizontal(|ui| {
                ui.add(egui::Spinner::new());
                ui.add_enabled(
                    false,
                    egui::Button::new("正在创作中...").min_size(egui::vec2(width - 32.0, 44.0)),
                );
            });
        } else {
            let button = egui::Button::new(
                egui::RichText::new("✨ 开始创作")
                    .size(16.0)
                    .color(egui::Color32::WHITE),
            )
            .fill(colors.accent)
            .min_size(egui::vec2(width, 44.0));
            if ui.add(button).clicked() {
                self.start_generation();
            }
        }
    }

    fn show_story_toolbar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("story_toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(self.status_line()).weak());
                if let Some(notice) = &self.notice {
                    ui.label(
                        egui::RichText::new(notice.message())
                            .small()
                            .color(theme::palette(self.theme).error_text),
                    );
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui
                        .button(format!("主题：{}", self.theme.label()))
                        .clicked()
                    {
                        self.theme = self.theme.toggled();
                    }
                    let state = self.controller.state();
                    let can_copy = !state.is_generating() && !state.accumulated_text().is_empty();
                    if ui.add_enabled(can_copy, egui::Button::new("复制全文")).clicked() {
                        self.copy_story();
                    }
                });
            });
        });
    }

    fn show_story_pane(&mut self, ctx: &egui::Context) {
        let colors = theme::palette(self.theme);
        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(colors.story_background))
            .show(ctx, |ui| {
                let generating = self.controller.state().is_generating();
                if self.controller.state().accumulated_text().is_empty() {
                    show_empty_state(ui, generating);
                    return;
                }

                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .stick_to_bottom(generating)
                    .show(ui, |ui| {
                        let width = ui.available_width().min(STORY_MAX_WIDTH);
                        let side = ((ui.available_width() - width) / 2.0).max(24.0);
                        ui.add_space(32.0);
                        ui.horizontal(|ui| {
                            ui.add_space(side);
                            ui.vertical(|ui| {
                                ui.set_max_width(width - 24.0);
                                markdown::show_blocks(ui, self.story_blocks());
                                if generating {
                                    ui.add_space(16.0);
                                    ui.horizontal(|ui| {
                                        ui.add(egui::Spinner::new().size(12.0));
                                        ui.label(egui::RichText::new("AI 正在奋笔疾书...").weak());
                                    });
                                }
                            });
                        });
                        ui.add_space(48.0);
                    });
            });
    }
}

fn show_empty_state(ui: &mut egui::Ui, generating: bool) {
    ui.vertical_centered(|ui| {
        ui.add_space(ui.available_height() * 0.32);
        if generating {
            ui.add(egui::Spinner::new().size(36.0));
            ui.add_space(12.0);
            ui.label(egui::RichText::new("AI 正在构思故事...").size(18.0).weak());
        } else {
            ui.label(egui::RichText::new("📖").size(42.0).weak());
            ui.add_space(12.0);
            ui.label(egui::RichText::new("等待灵感降临").size(20.0).strong());
            ui.label(
                egui::RichText::new(
                    "在左侧输入你的故事大纲，选择题材和字数，AI 将为你生成一篇精彩的小说。",
                )
                .weak(),
            );
        }
    });
}

impl eframe::App for NovelStudioApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();
        self.apply_theme_if_needed(ctx);

        self.show_form_panel(ctx);
        self.show_story_toolbar(ctx);
        self.show_story_pane(ctx);
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        if let Ok(serialized) = serde_json::to_string(&self.preferences()) {
            storage.set_string(PREFERENCES_STORAGE_KEY, serialized);
        }
    }
}

#[cfg(test)]
#[path = "../tests/app_tests.rs"]
mod tests;
