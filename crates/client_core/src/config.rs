use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const LOCAL_CONFIG_FILE: &str = "novel_studio.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
        }
    }
}

impl GenerationSettings {
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Defaults, then the first config file found, then process environment.
///
/// A missing API key is not an error here; it surfaces on the first generation call.
pub fn load_settings(explicit_path: Option<&Path>, user_config_dir: Option<&Path>) -> GenerationSettings {
    let mut settings = GenerationSettings::default();

    for path in candidate_config_paths(explicit_path, user_config_dir) {
        match read_config_file(&path) {
            Ok(Some(file_cfg)) => {
                debug!(path = %path.display(), "loaded generation config file");
                apply_file_config(&mut settings, &file_cfg);
                break;
            }
            Ok(None) => continue,
            Err(err) => {
                warn!(path = %path.display(), "ignoring unreadable config file: {err:#}");
                break;
            }
        }
    }

    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings
}

fn candidate_config_paths(explicit_path: Option<&Path>, user_config_dir: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit_path {
        return vec![path.to_path_buf()];
    }

    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = user_config_dir {
        paths.push(dir.join("novel_studio").join("config.toml"));
    }
    paths
}

fn read_config_file(path: &Path) -> anyhow::Result<Option<HashMap<String, String>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
    };

    let parsed = toml::from_str::<HashMap<String, String>>(&raw)
        .with_context(|| format!("invalid TOML in '{}'", path.display()))?;
    Ok(Some(parsed))
}

fn apply_file_config(settings: &mut GenerationSettings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("api_key") {
        set_api_key(settings, v);
    }
    if let Some(v) = file_cfg.get("model") {
        set_model(settings, v);
    }
    if let Some(v) = file_cfg.get("base_url") {
        set_base_url(settings, v);
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut GenerationSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("GEMINI_API_KEY") {
        set_api_key(settings, &v);
    }
    if let Some(v) = lookup("APP__GEMINI_API_KEY") {
        set_api_key(settings, &v);
    }

    if let Some(v) = lookup("GEMINI_MODEL") {
        set_model(settings, &v);
    }
    if let Some(v) = lookup("APP__MODEL") {
        set_model(settings, &v);
    }

    if let Some(v) = lookup("APP__BASE_URL") {
        set_base_url(settings, &v);
    }
}

fn set_api_key(settings: &mut GenerationSettings, raw: &str) {
    let key = raw.trim();
    if !key.is_empty() {
        settings.api_key = Some(key.to_string());
    }
}

pub fn set_model(settings: &mut GenerationSettings, raw: &str) {
    let model = raw.trim();
    if !model.is_empty() {
        settings.model = model.to_string();
    }
}

fn set_base_url(settings: &mut GenerationSettings, raw: &str) {
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            settings.base_url = raw.trim_end_matches('/').to_string();
        }
        Ok(parsed) => {
            warn!(base_url = raw, scheme = parsed.scheme(), "ignoring base_url with unsupported scheme");
        }
        Err(err) => {
            warn!(base_url = raw, "ignoring unparsable base_url: {err}");
        }
    }
}
