use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::MediaSource;
use tokio::sync::broadcast;

pub mod simulated;

pub use simulated::SimulatedBackend;

/// One status report from a live engine handle, in the order the engine
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineStatus {
    pub position_seconds: f64,
    /// `None` until the engine knows the media length.
    pub duration_seconds: Option<f64>,
    pub is_playing: bool,
    pub is_buffering: bool,
    /// Edge event: set only on the report where playback reached the end.
    pub did_just_finish: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub should_play: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { should_play: true }
    }
}

#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn play(&self) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn seek(&self, position_seconds: f64) -> anyhow::Result<()>;
    async fn status(&self) -> anyhow::Result<EngineStatus>;
    async fn present_fullscreen(&self) -> anyhow::Result<()>;
    /// Releases the engine resource. Must tolerate repeated calls.
    async fn unload(&self) -> anyhow::Result<()>;
    fn subscribe_status(&self) -> broadcast::Receiver<EngineStatus>;
}

#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn open(
        &self,
        source: &MediaSource,
        options: OpenOptions,
    ) -> anyhow::Result<Arc<dyn EngineHandle>>;
}
