use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Duration reported until the engine provides a real value. Never zero so
/// that views can divide by it.
pub const PLACEHOLDER_DURATION_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Anything that is not declared as audio plays through the video backend.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.trim().to_ascii_lowercase().starts_with("audio") {
            MediaKind::Audio
        } else {
            MediaKind::Video
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Descriptor of the single loaded media resource. Replaced wholesale, never
/// edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub kind: MediaKind,
    pub uri: String,
    pub is_default: bool,
}

impl MediaSource {
    pub fn new(kind: MediaKind, uri: impl Into<String>) -> Self {
        Self {
            kind,
            uri: uri.into(),
            is_default: false,
        }
    }

    pub fn bundled(kind: MediaKind, uri: impl Into<String>) -> Self {
        Self {
            kind,
            uri: uri.into(),
            is_default: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub is_playing: bool,
    pub is_buffering: bool,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            position_seconds: 0.0,
            duration_seconds: PLACEHOLDER_DURATION_SECONDS,
            is_playing: false,
            is_buffering: false,
        }
    }
}

impl PlaybackStatus {
    pub fn clamp_position(&self, seconds: f64) -> f64 {
        if seconds.is_nan() {
            return 0.0;
        }
        seconds.clamp(0.0, self.duration_seconds)
    }

    /// Accepts an engine-reported duration only when it is usable. Returns
    /// whether the duration changed.
    pub fn update_duration(&mut self, seconds: f64) -> bool {
        if !seconds.is_finite() || seconds <= 0.0 || seconds == self.duration_seconds {
            return false;
        }
        self.duration_seconds = seconds;
        self.position_seconds = self.clamp_position(self.position_seconds);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Idle,
    Loading,
    Playing,
    Paused,
    Seeking,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationState {
    #[default]
    Idle,
    Uploading,
    AwaitingResult,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TranslationJob {
    pub state: TranslationState,
    pub result_text: Option<String>,
    pub error: Option<String>,
}

impl TranslationJob {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.state,
            TranslationState::Uploading | TranslationState::AwaitingResult
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TranslationState::Succeeded | TranslationState::Failed
        )
    }

    pub fn succeeded(result_text: impl Into<String>) -> Self {
        Self {
            state: TranslationState::Succeeded,
            result_text: Some(result_text.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: TranslationState::Failed,
            result_text: None,
            error: Some(error.into()),
        }
    }
}

/// Platform identity that every platform-conditional lookup is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Ios,
    #[default]
    Other,
}

impl FromStr for Platform {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "android" => Platform::Android,
            "ios" => Platform::Ios,
            _ => Platform::Other,
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android => f.write_str("android"),
            Platform::Ios => f.write_str("ios"),
            Platform::Other => f.write_str("other"),
        }
    }
}

/// Renders seconds as `mm:ss`. Minutes wrap every hour, which is what the
/// player's time row has always shown.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", (total / 60) % 60, total % 60)
}
