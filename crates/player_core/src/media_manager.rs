//! Sole owner of the playback engine handle.

use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures::{future, Stream, StreamExt};
use media_engine::{EngineHandle, EngineStatus, MediaBackend, OpenOptions};
use shared::{
    domain::{MediaKind, MediaSource},
    error::{EngineCommandError, FullscreenPresentationError, MediaLoadError},
};
use tokio::sync::Mutex;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};

use crate::playback::EngineCommand;

pub type StatusStream = Pin<Box<dyn Stream<Item = EngineStatus> + Send>>;

/// Result of a successful load: the generation that now owns the engine, the
/// engine's initial report and the ordered stream of everything after it.
pub struct LoadedMedia {
    pub generation: u64,
    pub source: MediaSource,
    pub initial: EngineStatus,
    pub events: StatusStream,
}

/// Live handle plus the generation that acquired it. Dropping a lease that
/// was not released hands the release to the runtime.
struct MediaLease {
    generation: u64,
    source: MediaSource,
    handle: Arc<dyn EngineHandle>,
    released: bool,
}

impl MediaLease {
    async fn release(mut self) {
        self.released = true;
        release_handle(self.generation, &self.source, &self.handle).await;
    }
}

impl Drop for MediaLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let handle = Arc::clone(&self.handle);
        let generation = self.generation;
        let source = self.source.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    release_handle(generation, &source, &handle).await;
                });
            }
            Err(_) => warn!(
                generation,
                uri = %self.source.uri,
                "media: lease dropped outside a runtime; engine handle not released"
            ),
        }
    }
}

async fn release_handle(generation: u64, source: &MediaSource, handle: &Arc<dyn EngineHandle>) {
    match handle.unload().await {
        Ok(()) => debug!(generation, uri = %source.uri, "media: handle released"),
        Err(err) => warn!(
            generation,
            uri = %source.uri,
            "media: handle release failed: {err:#}"
        ),
    }
}

fn status_stream(handle: &Arc<dyn EngineHandle>) -> StatusStream {
    BroadcastStream::new(handle.subscribe_status())
        .filter_map(|item| {
            future::ready(match item {
                Ok(status) => Some(status),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "media: status stream lagged");
                    None
                }
            })
        })
        .boxed()
}

pub struct MediaManager {
    audio: Arc<dyn MediaBackend>,
    video: Arc<dyn MediaBackend>,
    options: OpenOptions,
    generation: AtomicU64,
    slot: Mutex<Option<MediaLease>>,
}

impl MediaManager {
    pub fn new(audio: Arc<dyn MediaBackend>, video: Arc<dyn MediaBackend>) -> Self {
        Self {
            audio,
            video,
            options: OpenOptions::default(),
            generation: AtomicU64::new(0),
            slot: Mutex::new(None),
        }
    }

    pub fn with_open_options(mut self, options: OpenOptions) -> Self {
        self.options = options;
        self
    }

    fn backend_for(&self, kind: MediaKind) -> &Arc<dyn MediaBackend> {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    pub async fn current_source(&self) -> Option<MediaSource> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|lease| lease.source.clone())
    }

    /// Replaces whatever is loaded with `source`. The previous handle is
    /// released before the new one is opened, whatever the outcome. A newer
    /// `load` or `unload` issued meanwhile supersedes this one.
    pub async fn load(&self, source: MediaSource) -> Result<LoadedMedia, MediaLoadError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut slot = self.slot.lock().await;

        if let Some(previous) = slot.take() {
            info!(
                generation = previous.generation,
                uri = %previous.source.uri,
                "media: releasing previous handle"
            );
            previous.release().await;
        }

        if !self.is_current(generation) {
            debug!(generation, uri = %source.uri, "media: load superseded before open");
            return Err(MediaLoadError::Superseded { uri: source.uri });
        }

        info!(generation, kind = %source.kind, uri = %source.uri, "media: opening source");
        let handle = self
            .backend_for(source.kind)
            .open(&source, self.options)
            .await
            .map_err(|err| {
                warn!(generation, uri = %source.uri, "media: open failed: {err:#}");
                MediaLoadError::Open {
                    kind: source.kind,
                    uri: source.uri.clone(),
                    reason: format!("{err:#}"),
                }
            })?;

        let lease = MediaLease {
            generation,
            source: source.clone(),
            handle,
            released: false,
        };

        if !self.is_current(generation) {
            debug!(generation, uri = %source.uri, "media: load superseded after open");
            lease.release().await;
            return Err(MediaLoadError::Superseded { uri: source.uri });
        }

        let events = status_stream(&lease.handle);
        let initial = match lease.handle.status().await {
            Ok(status) => status,
            Err(err) => {
                warn!(generation, uri = %source.uri, "media: initial status failed: {err:#}");
                lease.release().await;
                return Err(MediaLoadError::Open {
                    kind: source.kind,
                    uri: source.uri,
                    reason: format!("{err:#}"),
                });
            }
        };

        *slot = Some(lease);
        info!(
            generation,
            duration = ?initial.duration_seconds,
            "media: source loaded"
        );
        Ok(LoadedMedia {
            generation,
            source,
            initial,
            events,
        })
    }

    /// Releases the current handle and cancels any load still opening.
    /// Safe to call repeatedly.
    pub async fn unload(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let lease = self.slot.lock().await.take();
        if let Some(lease) = lease {
            info!(generation = lease.generation, uri = %lease.source.uri, "media: unloading");
            lease.release().await;
        }
    }

    /// Fresh subscription to the current handle's reports.
    pub async fn status_stream(&self) -> Option<(u64, StatusStream)> {
        let slot = self.slot.lock().await;
        slot.as_ref()
            .map(|lease| (lease.generation, status_stream(&lease.handle)))
    }

    pub async fn execute(
        &self,
        generation: u64,
        command: EngineCommand,
    ) -> Result<(), EngineCommandError> {
        let slot = self.slot.lock().await;
        let lease = Self::lease_for(&slot, generation)?;
        let result = match command {
            EngineCommand::Play => lease.handle.play().await,
            EngineCommand::Pause => lease.handle.pause().await,
            EngineCommand::Seek(position) => lease.handle.seek(position).await,
        };
        result.map_err(|err| EngineCommandError::Engine(format!("{err:#}")))
    }

    pub async fn present_fullscreen(
        &self,
        generation: u64,
    ) -> Result<(), FullscreenPresentationError> {
        let slot = self.slot.lock().await;
        let lease = Self::lease_for(&slot, generation).map_err(|err| {
            FullscreenPresentationError {
                reason: err.to_string(),
            }
        })?;
        lease
            .handle
            .present_fullscreen()
            .await
            .map_err(|err| FullscreenPresentationError {
                reason: format!("{err:#}"),
            })
    }

    fn lease_for(
        slot: &Option<MediaLease>,
        generation: u64,
    ) -> Result<&MediaLease, EngineCommandError> {
        let lease = slot.as_ref().ok_or(EngineCommandError::NoMedia)?;
        if lease.generation != generation {
            return Err(EngineCommandError::Stale {
                requested: generation,
                current: lease.generation,
            });
        }
        Ok(lease)
    }
}

#[cfg(test)]
#[path = "tests/media_manager_tests.rs"]
mod tests;
