use serde::{Deserialize, Serialize};

use crate::domain::Platform;

pub const TRANSLATE_PATH: &str = "/translate-video";
pub const UPLOAD_FIELD_NAME: &str = "file";
pub const UPLOAD_CONTENT_TYPE: &str = "video/mp4";
pub const UPLOAD_FILE_NAME: &str = "video.mp4";
/// Shown when the server answers successfully without a translation.
pub const NO_RESULT_PLACEHOLDER: &str = "No subtitles returned";

const LOCAL_FILE_PREFIX: &str = "file://";

/// Success body of the translate endpoint. The field casing is part of the
/// contract with the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslateResponse {
    #[serde(rename = "translatedText", default)]
    pub translated_text: Option<String>,
}

impl TranslateResponse {
    pub fn text_or_placeholder(self) -> String {
        match self.translated_text {
            Some(text) if !text.is_empty() => text,
            _ => NO_RESULT_PLACEHOLDER.to_string(),
        }
    }
}

/// Base URL of the translation service as seen from each platform. The
/// Android emulator reaches the host through its own loopback alias.
pub fn default_base_url(platform: Platform) -> &'static str {
    match platform {
        Platform::Android => "http://10.0.2.2:8000",
        Platform::Ios | Platform::Other => "http://localhost:8000",
    }
}

/// URI form the upload expects on each platform. iOS wants a bare path.
pub fn normalize_upload_uri(platform: Platform, uri: &str) -> String {
    match platform {
        Platform::Ios => uri.strip_prefix(LOCAL_FILE_PREFIX).unwrap_or(uri).to_string(),
        Platform::Android | Platform::Other => uri.to_string(),
    }
}
