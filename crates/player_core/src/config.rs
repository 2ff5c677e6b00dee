use std::{fs, path::Path};

use serde::Deserialize;
use shared::{
    domain::Platform,
    error::TranslationError,
    protocol::{default_base_url, TRANSLATE_PATH},
};
use tracing::warn;
use url::Url;

use crate::source_resolver::{SourceResolver, DEFAULT_AUDIO_URI, DEFAULT_VIDEO_URI};

pub const SETTINGS_FILE: &str = "player.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub platform: Platform,
    /// Overrides the per-platform base URL when set.
    pub translate_base_url: Option<String>,
    pub translate_path: String,
    pub default_video_uri: String,
    pub default_audio_uri: String,
    pub autoplay: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platform: Platform::Other,
            translate_base_url: None,
            translate_path: TRANSLATE_PATH.into(),
            default_video_uri: DEFAULT_VIDEO_URI.into(),
            default_audio_uri: DEFAULT_AUDIO_URI.into(),
            autoplay: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    platform: Option<String>,
    translate_base_url: Option<String>,
    translate_path: Option<String>,
    default_video_uri: Option<String>,
    default_audio_uri: Option<String>,
    autoplay: Option<bool>,
}

impl Settings {
    pub fn base_url(&self) -> &str {
        self.translate_base_url
            .as_deref()
            .unwrap_or_else(|| default_base_url(self.platform))
    }

    pub fn translate_endpoint(&self) -> Result<Url, TranslationError> {
        let base = self.base_url().trim_end_matches('/');
        let path = self.translate_path.trim();
        let joined = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined).map_err(|err| TranslationError::Endpoint(format!("{joined}: {err}")))
    }

    pub fn resolver(&self) -> SourceResolver {
        SourceResolver::new(self.default_video_uri.clone(), self.default_audio_uri.clone())
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file if it exists, then `APP__*` variables.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), "config: ignoring unreadable settings file: {err}"),
        }
    }

    if let Some(v) = env("APP__PLATFORM") {
        settings.platform = parse_platform(&v);
    }
    if let Some(v) = env("APP__TRANSLATE_BASE_URL") {
        settings.translate_base_url = Some(v);
    }
    if let Some(v) = env("APP__TRANSLATE_PATH") {
        settings.translate_path = v;
    }
    if let Some(v) = env("APP__DEFAULT_VIDEO_URI") {
        settings.default_video_uri = v;
    }
    if let Some(v) = env("APP__DEFAULT_AUDIO_URI") {
        settings.default_audio_uri = v;
    }
    if let Some(v) = env("APP__AUTOPLAY") {
        match v.trim().parse::<bool>() {
            Ok(parsed) => settings.autoplay = parsed,
            Err(_) => warn!(value = %v, "config: APP__AUTOPLAY is not a boolean"),
        }
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.platform {
        settings.platform = parse_platform(&v);
    }
    if let Some(v) = file_cfg.translate_base_url {
        settings.translate_base_url = Some(v);
    }
    if let Some(v) = file_cfg.translate_path {
        settings.translate_path = v;
    }
    if let Some(v) = file_cfg.default_video_uri {
        settings.default_video_uri = v;
    }
    if let Some(v) = file_cfg.default_audio_uri {
        settings.default_audio_uri = v;
    }
    if let Some(v) = file_cfg.autoplay {
        settings.autoplay = v;
    }
}

fn parse_platform(raw: &str) -> Platform {
    raw.parse::<Platform>().unwrap_or_default()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
