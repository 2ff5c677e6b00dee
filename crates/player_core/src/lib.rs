use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

use futures::StreamExt;
use media_engine::{EngineStatus, MediaBackend, OpenOptions};
use serde::Serialize;
use shared::{
    domain::{
        format_clock, MediaKind, MediaSource, PlaybackStatus, TransportState, TranslationJob,
        TranslationState,
    },
    error::{
        EngineCommandError, FullscreenPresentationError, MediaLoadError, TranslationError,
        UnsupportedMediaType,
    },
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod config;
pub mod media_manager;
pub mod playback;
pub mod source_resolver;
pub mod translation;

pub use config::{load_settings, Settings};
pub use media_manager::{MediaManager, StatusStream};
pub use playback::{EngineCommand, PlaybackMachine};
pub use source_resolver::{FilePicker, NoFilePicker, PickedFile, SourceResolver};
pub use translation::{
    LocalFileReader, MediaReader, TranslateOutcome, TranslateRejection, TranslationCoordinator,
};

const NO_SOURCE_NOTICE: &str = "No video loaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    Info,
    Warning,
    Error,
}

/// User-facing alert. Views decide how to present it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub message: String,
}

/// Everything a view needs to render the player, taken at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub source: Option<MediaSource>,
    pub status: PlaybackStatus,
    pub transport: TransportState,
    pub repeat: bool,
    pub translation: TranslationJob,
    pub elapsed_label: String,
    pub duration_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Snapshot(PlayerSnapshot),
    Notice(Notice),
}

#[derive(Debug, Error)]
pub enum PickError {
    #[error("file picker failed: {0}")]
    Picker(String),
    #[error(transparent)]
    Unsupported(#[from] UnsupportedMediaType),
    #[error(transparent)]
    Load(#[from] MediaLoadError),
}

/// Collaborators the controller is wired to.
pub struct ControllerDependencies {
    pub audio_backend: Arc<dyn MediaBackend>,
    pub video_backend: Arc<dyn MediaBackend>,
    pub picker: Arc<dyn FilePicker>,
    pub reader: Arc<dyn MediaReader>,
}

impl ControllerDependencies {
    pub fn new(audio_backend: Arc<dyn MediaBackend>, video_backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            audio_backend,
            video_backend,
            picker: Arc::new(NoFilePicker),
            reader: Arc::new(LocalFileReader),
        }
    }

    pub fn with_picker(mut self, picker: Arc<dyn FilePicker>) -> Self {
        self.picker = picker;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn MediaReader>) -> Self {
        self.reader = reader;
        self
    }
}

struct ControllerState {
    machine: PlaybackMachine,
    source: Option<MediaSource>,
    /// Bumped by every load and by shutdown; async work started under an
    /// older ticket must not write back.
    ticket: u64,
    generation: Option<u64>,
    pump: Option<JoinHandle<()>>,
}

pub struct PlayerController {
    manager: MediaManager,
    translator: TranslationCoordinator,
    resolver: SourceResolver,
    picker: Arc<dyn FilePicker>,
    autoplay: bool,
    inner: Mutex<ControllerState>,
    alive: AtomicBool,
    forwarder: std::sync::Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ControllerEvent>,
}

impl PlayerController {
    /// Must be called from inside a tokio runtime.
    pub fn new(
        settings: &Settings,
        deps: ControllerDependencies,
    ) -> Result<Arc<Self>, TranslationError> {
        let translator = TranslationCoordinator::from_settings(settings, deps.reader)?;
        let manager = MediaManager::new(deps.audio_backend, deps.video_backend).with_open_options(
            OpenOptions {
                should_play: settings.autoplay,
            },
        );
        Ok(Self::with_parts(
            manager,
            translator,
            settings.resolver(),
            deps.picker,
            settings.autoplay,
        ))
    }

    pub fn with_parts(
        manager: MediaManager,
        translator: TranslationCoordinator,
        resolver: SourceResolver,
        picker: Arc<dyn FilePicker>,
        autoplay: bool,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let job_events = translator.subscribe();
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let forwarder = spawn_translation_forwarder(weak.clone(), job_events);
            Self {
                manager,
                translator,
                resolver,
                picker,
                autoplay,
                inner: Mutex::new(ControllerState {
                    machine: PlaybackMachine::new(),
                    source: None,
                    ticket: 0,
                    generation: None,
                    pump: None,
                }),
                alive: AtomicBool::new(true),
                forwarder: std::sync::Mutex::new(forwarder),
                events,
            }
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Loads the bundled default video.
    pub async fn bootstrap(self: &Arc<Self>) -> Result<PlayerSnapshot, MediaLoadError> {
        let source = self.resolver.default_source(MediaKind::Video);
        self.load_source(source).await
    }

    /// Replaces the current media with `source`. A later load wins over one
    /// that is still opening.
    pub async fn load_source(
        self: &Arc<Self>,
        source: MediaSource,
    ) -> Result<PlayerSnapshot, MediaLoadError> {
        if !self.is_alive() {
            return Ok(self.snapshot().await);
        }

        let ticket = {
            let mut state = self.inner.lock().await;
            state.ticket += 1;
            if let Some(pump) = state.pump.take() {
                pump.abort();
            }
            state.generation = None;
            state.machine.begin_load();
            state.source = Some(source.clone());
            let snapshot = self.snapshot_of(&state).await;
            self.emit(ControllerEvent::Snapshot(snapshot));
            state.ticket
        };

        info!(ticket, kind = %source.kind, uri = %source.uri, "player: loading source");
        let result = self.manager.load(source.clone()).await;

        let mut state = self.inner.lock().await;
        if state.ticket != ticket || !self.is_alive() {
            debug!(ticket, uri = %source.uri, "player: load result ignored for stale ticket");
            return Err(MediaLoadError::Superseded { uri: source.uri });
        }

        match result {
            Ok(loaded) => {
                state.machine.loaded(&loaded.initial, self.autoplay);
                state.generation = Some(loaded.generation);
                state.pump = Some(self.spawn_status_pump(ticket, loaded.generation, loaded.events));
                let snapshot = self.snapshot_of(&state).await;
                self.emit(ControllerEvent::Snapshot(snapshot.clone()));
                Ok(snapshot)
            }
            Err(err) => {
                warn!(ticket, uri = %source.uri, "player: load failed: {err}");
                state.machine.reset();
                state.source = None;
                state.generation = None;
                let snapshot = self.snapshot_of(&state).await;
                drop(state);
                self.notice(NoticeSeverity::Error, err.to_string());
                self.emit(ControllerEvent::Snapshot(snapshot));
                Err(err)
            }
        }
    }

    /// Asks the picker for a file and loads it. `Ok(None)` when the user
    /// cancelled; an unsupported pick keeps the current source.
    pub async fn pick_media(self: &Arc<Self>) -> Result<Option<PlayerSnapshot>, PickError> {
        if !self.is_alive() {
            return Ok(None);
        }
        let picked = self.picker.pick().await.map_err(|err| {
            let err = PickError::Picker(format!("{err:#}"));
            self.notice(NoticeSeverity::Error, err.to_string());
            err
        })?;
        let source = self.resolver.resolve(picked).map_err(|err| {
            warn!(uri = %err.uri, mime = ?err.mime_type, "player: unsupported pick ignored");
            self.notice(NoticeSeverity::Warning, err.to_string());
            err
        })?;
        let Some(source) = source else {
            return Ok(None);
        };
        Ok(Some(self.load_source(source).await?))
    }

    pub async fn play(&self) -> PlayerSnapshot {
        self.drive(PlaybackMachine::play).await
    }

    pub async fn pause(&self) -> PlayerSnapshot {
        self.drive(PlaybackMachine::pause).await
    }

    pub async fn toggle_play_pause(&self) -> PlayerSnapshot {
        self.drive(PlaybackMachine::toggle_play_pause).await
    }

    /// Seeks to `seconds`, clamped into the media. Playback that was running
    /// resumes once the engine has seeked.
    pub async fn seek(&self, seconds: f64) -> PlayerSnapshot {
        let mut state = self.inner.lock().await;
        if self.is_alive() {
            if let Some(target) = state.machine.seek(seconds) {
                match self.execute(&state, EngineCommand::Seek(target)).await {
                    Ok(()) => {
                        if let Some(command) = state.machine.seek_completed() {
                            self.execute_or_warn(&state, command).await;
                        }
                    }
                    Err(err) => {
                        warn!(target, "playback: seek failed: {err}");
                        state.machine.abort_seek();
                        self.notice(NoticeSeverity::Warning, err.to_string());
                    }
                }
            }
        }
        let snapshot = self.snapshot_of(&state).await;
        self.emit(ControllerEvent::Snapshot(snapshot.clone()));
        snapshot
    }

    pub async fn toggle_repeat(&self) -> PlayerSnapshot {
        let mut state = self.inner.lock().await;
        if self.is_alive() {
            let repeat = state.machine.toggle_repeat();
            debug!(repeat, "playback: repeat toggled");
        }
        let snapshot = self.snapshot_of(&state).await;
        self.emit(ControllerEvent::Snapshot(snapshot.clone()));
        snapshot
    }

    /// Presents the loaded video fullscreen. A presentation failure is
    /// reported and leaves playback untouched; audio sources ignore it.
    pub async fn toggle_fullscreen(&self) -> Result<PlayerSnapshot, FullscreenPresentationError> {
        let state = self.inner.lock().await;
        let target = match (&state.source, state.generation) {
            (Some(source), Some(generation)) if source.kind == MediaKind::Video => {
                Some(generation)
            }
            _ => None,
        };
        if let Some(generation) = target.filter(|_| self.is_alive()) {
            if let Err(err) = self.manager.present_fullscreen(generation).await {
                warn!(generation, "player: {err}");
                self.notice(NoticeSeverity::Warning, err.to_string());
                return Err(err);
            }
        }
        Ok(self.snapshot_of(&state).await)
    }

    /// Translates the current source. Progress is published as snapshots.
    pub async fn translate(&self) -> TranslateOutcome {
        let source = self.inner.lock().await.source.clone();
        let outcome = self.translator.translate(source.as_ref()).await;
        match &outcome {
            TranslateOutcome::Rejected {
                reason: TranslateRejection::NoSource,
                ..
            } => self.notice(NoticeSeverity::Info, NO_SOURCE_NOTICE.to_string()),
            TranslateOutcome::Completed(job) if job.state == TranslationState::Failed => {
                let detail = job.error.clone().unwrap_or_default();
                self.notice(NoticeSeverity::Error, format!("Translation failed: {detail}"));
            }
            _ => {}
        }
        outcome
    }

    pub async fn clear_translation(&self) -> PlayerSnapshot {
        if self.is_alive() {
            self.translator.clear().await;
        }
        self.snapshot().await
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let state = self.inner.lock().await;
        self.snapshot_of(&state).await
    }

    /// Stops playback, releases the engine and discards any outstanding
    /// translation result. Every later call is a no-op.
    pub async fn shutdown(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        self.translator.shutdown();
        {
            let mut state = self.inner.lock().await;
            state.ticket += 1;
            if let Some(pump) = state.pump.take() {
                pump.abort();
            }
            state.generation = None;
            state.machine.reset();
            state.source = None;
        }
        self.manager.unload().await;
        if let Ok(mut forwarder) = self.forwarder.lock() {
            if let Some(task) = forwarder.take() {
                task.abort();
            }
        }
        info!("player: shut down");
    }

    fn spawn_status_pump(
        self: &Arc<Self>,
        ticket: u64,
        generation: u64,
        mut events: StatusStream,
    ) -> JoinHandle<()> {
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(report) = events.next().await {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.apply_engine_status(ticket, generation, report).await;
            }
            debug!(generation, "playback: status pump ended");
        })
    }

    async fn apply_engine_status(&self, ticket: u64, generation: u64, report: EngineStatus) {
        let mut state = self.inner.lock().await;
        if state.ticket != ticket || !self.is_alive() {
            return;
        }
        if let Some(command) = state.machine.apply_status(&report) {
            info!(generation, "playback: restarting from the beginning");
            match self.execute(&state, command).await {
                Ok(()) => {
                    if let Some(resume) = state.machine.seek_completed() {
                        self.execute_or_warn(&state, resume).await;
                    }
                }
                Err(err) => {
                    warn!(generation, "playback: restart failed: {err}");
                    state.machine.abort_seek();
                    self.notice(NoticeSeverity::Warning, err.to_string());
                }
            }
        }
        let snapshot = self.snapshot_of(&state).await;
        self.emit(ControllerEvent::Snapshot(snapshot));
    }

    /// Applies a machine operation and runs the engine command it yields.
    /// The machine is rolled back if the engine refuses.
    async fn drive(
        &self,
        op: impl FnOnce(&mut PlaybackMachine) -> Option<EngineCommand>,
    ) -> PlayerSnapshot {
        let mut state = self.inner.lock().await;
        if self.is_alive() {
            let previous = state.machine.clone();
            if let Some(command) = op(&mut state.machine) {
                if let Err(err) = self.execute(&state, command).await {
                    warn!(?command, "playback: engine refused command: {err}");
                    state.machine = previous;
                    self.notice(NoticeSeverity::Warning, err.to_string());
                }
            }
        }
        let snapshot = self.snapshot_of(&state).await;
        self.emit(ControllerEvent::Snapshot(snapshot.clone()));
        snapshot
    }

    async fn execute(
        &self,
        state: &ControllerState,
        command: EngineCommand,
    ) -> Result<(), EngineCommandError> {
        let generation = state.generation.ok_or(EngineCommandError::NoMedia)?;
        debug!(generation, ?command, "playback: engine command");
        self.manager.execute(generation, command).await
    }

    async fn execute_or_warn(&self, state: &ControllerState, command: EngineCommand) {
        if let Err(err) = self.execute(state, command).await {
            warn!(?command, "playback: engine refused command: {err}");
        }
    }

    async fn snapshot_of(&self, state: &ControllerState) -> PlayerSnapshot {
        let translation = self.translator.job().await;
        build_snapshot(state, translation)
    }

    async fn publish_translation(&self, job: TranslationJob) {
        if !self.is_alive() {
            return;
        }
        let state = self.inner.lock().await;
        self.emit(ControllerEvent::Snapshot(build_snapshot(&state, job)));
    }

    fn notice(&self, severity: NoticeSeverity, message: String) {
        let _ = self
            .events
            .send(ControllerEvent::Notice(Notice { severity, message }));
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }
}

fn build_snapshot(state: &ControllerState, translation: TranslationJob) -> PlayerSnapshot {
    let status = state.machine.status();
    PlayerSnapshot {
        source: state.source.clone(),
        status,
        transport: state.machine.transport(),
        repeat: state.machine.repeat(),
        translation,
        elapsed_label: format_clock(status.position_seconds),
        duration_label: format_clock(status.duration_seconds),
    }
}

fn spawn_translation_forwarder(
    controller: Weak<PlayerController>,
    mut jobs: broadcast::Receiver<TranslationJob>,
) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("player: no runtime; translation progress will not be published");
        return None;
    };
    Some(runtime.spawn(async move {
        loop {
            match jobs.recv().await {
                Ok(job) => {
                    let Some(controller) = controller.upgrade() else {
                        break;
                    };
                    controller.publish_translation(job).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "translate: progress events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }))
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
