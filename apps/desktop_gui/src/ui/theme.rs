//! Visual presets and CJK font installation.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use eframe::egui;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemePreset {
    #[default]
    Paper,
    Night,
}

impl ThemePreset {
    pub fn label(self) -> &'static str {
        match self {
            ThemePreset::Paper => "纸张",
            ThemePreset::Night => "夜间",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemePreset::Paper => ThemePreset::Night,
            ThemePreset::Night => ThemePreset::Paper,
        }
    }
}

impl fmt::Display for ThemePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThemePreset::Paper => f.write_str("paper"),
            ThemePreset::Night => f.write_str("night"),
        }
    }
}

impl FromStr for ThemePreset {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(ThemePreset::Paper),
            "night" => Ok(ThemePreset::Night),
            other => Err(format!("unknown theme '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub accent: egui::Color32,
    pub story_background: egui::Color32,
    pub sidebar_background: egui::Color32,
    pub error_fill: egui::Color32,
    pub error_text: egui::Color32,
}

pub fn palette(theme: ThemePreset) -> Palette {
    match theme {
        ThemePreset::Paper => Palette {
            accent: egui::Color32::from_rgb(79, 70, 229),
            story_background: egui::Color32::from_rgb(253, 251, 247),
            sidebar_background: egui::Color32::from_rgb(248, 250, 252),
            error_fill: egui::Color32::from_rgb(254, 242, 242),
            error_text: egui::Color32::from_rgb(185, 28, 28),
        },
        ThemePreset::Night => Palette {
            accent: egui::Color32::from_rgb(129, 140, 248),
            story_background: egui::Color32::from_rgb(28, 27, 34),
            sidebar_background: egui::Color32::from_rgb(21, 22, 28),
            error_fill: egui::Color32::from_rgb(69, 26, 26),
            error_text: egui::Color32::from_rgb(252, 165, 165),
        },
    }
}

pub fn visuals_for_theme(theme: ThemePreset) -> egui::Visuals {
    let colors = palette(theme);
    let mut visuals = match theme {
        ThemePreset::Paper => {
            let mut v = egui::Visuals::light();
            v.override_text_color = Some(egui::Color32::from_rgb(30, 41, 59));
            v
        }
        ThemePreset::Night => {
            let mut v = egui::Visuals::dark();
            v.override_text_color = Some(egui::Color32::from_rgb(226, 232, 240));
            v
        }
    };

    visuals.panel_fill = colors.story_background;
    visuals.window_fill = colors.sidebar_background;
    visuals.hyperlink_color = colors.accent;
    visuals.selection.bg_fill = colors.accent.gamma_multiply(0.6);
    visuals.widgets.active.bg_fill = colors.accent;
    visuals.widgets.hovered.bg_fill = colors.accent.gamma_multiply(0.85);
    visuals.window_corner_radius = egui::CornerRadius::same(10);
    visuals.menu_corner_radius = egui::CornerRadius::same(8);
    visuals
}

pub fn apply_theme(ctx: &egui::Context, theme: ThemePreset) {
    let mut style = (*ctx.style()).clone();
    style.visuals = visuals_for_theme(theme);

    // Text inputs stay visible against the tinted panels.
    style.visuals.widgets.inactive.bg_stroke =
        egui::Stroke::new(1.0, style.visuals.widgets.noninteractive.bg_stroke.color);
    style.visuals.widgets.active.bg_stroke =
        egui::Stroke::new(1.2, style.visuals.selection.bg_fill.gamma_multiply(0.9));
    style.spacing.item_spacing = egui::vec2(8.0, 8.0);
    style.spacing.button_padding = egui::vec2(12.0, 8.0);
    ctx.set_style(style);
}

const CJK_FONT_NAME: &str = "cjk";

fn cjk_font_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = [
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        "/usr/share/fonts/wenquanyi/wqy-microhei/wqy-microhei.ttc",
        "/System/Library/Fonts/PingFang.ttc",
        "/System/Library/Fonts/STHeiti Medium.ttc",
        "/Library/Fonts/Arial Unicode.ttf",
        "C:\\Windows\\Fonts\\msyh.ttc",
        "C:\\Windows\\Fonts\\simhei.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    if let Some(font_dir) = dirs::font_dir() {
        candidates.push(font_dir.join("NotoSansCJK-Regular.ttc"));
        candidates.push(font_dir.join("NotoSansSC-Regular.otf"));
    }
    candidates
}

fn first_readable(candidates: &[PathBuf]) -> Option<(&Path, Vec<u8>)> {
    candidates
        .iter()
        .find_map(|path| std::fs::read(path).ok().map(|bytes| (path.as_path(), bytes)))
}

/// Installs the first CJK-capable system font as a fallback for every family.
pub fn install_cjk_fonts(ctx: &egui::Context) -> bool {
    let candidates = cjk_font_candidates();
    let Some((path, bytes)) = first_readable(&candidates) else {
        tracing::warn!("no CJK font found; Chinese text may render as boxes");
        return false;
    };

    let mut fonts = egui::FontDefinitions::default();
    fonts.font_data.insert(
        CJK_FONT_NAME.to_owned(),
        Arc::new(egui::FontData::from_owned(bytes)),
    );
    for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
        fonts
            .families
            .entry(family)
            .or_default()
            .push(CJK_FONT_NAME.to_owned());
    }
    ctx.set_fonts(fonts);
    tracing::info!(font = %path.display(), "installed CJK font");
    true
}
