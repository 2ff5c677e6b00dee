use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{MediaKind, MediaSource},
    error::UnsupportedMediaType,
};
use tracing::{debug, info};

pub const DEFAULT_VIDEO_URI: &str = "asset://defaultvideo.mp4";
pub const DEFAULT_AUDIO_URI: &str = "asset://defaultaudio.mp3";

/// What the platform file picker hands back for one selected document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedFile {
    pub uri: String,
    pub mime_type: Option<String>,
}

impl PickedFile {
    pub fn new(uri: impl Into<String>, mime_type: Option<&str>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.map(str::to_string),
        }
    }
}

/// Native document picker restricted to audio and video. `None` means the
/// user cancelled.
#[async_trait]
pub trait FilePicker: Send + Sync {
    async fn pick(&self) -> Result<Option<PickedFile>>;
}

/// Picker for hosts without a document picker; every pick is a cancel.
pub struct NoFilePicker;

#[async_trait]
impl FilePicker for NoFilePicker {
    async fn pick(&self) -> Result<Option<PickedFile>> {
        debug!("source: no file picker available");
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct SourceResolver {
    default_video_uri: String,
    default_audio_uri: String,
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new(DEFAULT_VIDEO_URI, DEFAULT_AUDIO_URI)
    }
}

impl SourceResolver {
    pub fn new(default_video_uri: impl Into<String>, default_audio_uri: impl Into<String>) -> Self {
        Self {
            default_video_uri: default_video_uri.into(),
            default_audio_uri: default_audio_uri.into(),
        }
    }

    pub fn default_source(&self, kind: MediaKind) -> MediaSource {
        match kind {
            MediaKind::Video => MediaSource::bundled(kind, self.default_video_uri.clone()),
            MediaKind::Audio => MediaSource::bundled(kind, self.default_audio_uri.clone()),
        }
    }

    /// `Ok(None)` for a cancelled pick.
    pub fn resolve(
        &self,
        picked: Option<PickedFile>,
    ) -> Result<Option<MediaSource>, UnsupportedMediaType> {
        let Some(picked) = picked else {
            debug!("source: pick cancelled");
            return Ok(None);
        };
        let kind = classify(&picked)?;
        info!(uri = %picked.uri, %kind, "source: resolved picked file");
        Ok(Some(MediaSource::new(kind, picked.uri)))
    }
}

fn classify(picked: &PickedFile) -> Result<MediaKind, UnsupportedMediaType> {
    let unsupported = || UnsupportedMediaType {
        uri: picked.uri.clone(),
        mime_type: picked.mime_type.clone(),
    };

    if picked.uri.trim().is_empty() {
        return Err(unsupported());
    }

    let declared = picked
        .mime_type
        .as_deref()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_string);
    let mime = match declared {
        Some(mime) => mime,
        None => guess_mime(&picked.uri).ok_or_else(unsupported)?,
    };
    Ok(MediaKind::from_mime(&mime))
}

fn guess_mime(uri: &str) -> Option<String> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}
