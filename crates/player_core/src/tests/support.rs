//! Scripted engine doubles shared by the unit tests.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use media_engine::{EngineHandle, EngineStatus, MediaBackend, OpenOptions};
use shared::domain::MediaSource;
use tokio::sync::{broadcast, Notify};

use crate::{
    source_resolver::{FilePicker, PickedFile},
    translation::MediaReader,
    ControllerEvent, Notice, PlayerSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineCall {
    Play,
    Pause,
    Seek(f64),
    Fullscreen,
    Unload,
}

pub struct ScriptedHandle {
    pub uri: String,
    calls: StdMutex<Vec<EngineCall>>,
    events: broadcast::Sender<EngineStatus>,
    initial: EngineStatus,
    unloaded: AtomicBool,
    fullscreen_error: Option<String>,
    live: Arc<AtomicUsize>,
}

impl ScriptedHandle {
    pub fn emit(&self, status: EngineStatus) {
        let _ = self.events.send(status);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::SeqCst)
    }

    fn record(&self, call: EngineCall) -> Result<()> {
        if self.is_unloaded() && call != EngineCall::Unload {
            return Err(anyhow!("handle already unloaded"));
        }
        self.calls.lock().expect("calls lock").push(call);
        Ok(())
    }
}

#[async_trait]
impl EngineHandle for ScriptedHandle {
    async fn play(&self) -> Result<()> {
        self.record(EngineCall::Play)
    }

    async fn pause(&self) -> Result<()> {
        self.record(EngineCall::Pause)
    }

    async fn seek(&self, position_seconds: f64) -> Result<()> {
        self.record(EngineCall::Seek(position_seconds))
    }

    async fn status(&self) -> Result<EngineStatus> {
        Ok(self.initial)
    }

    async fn present_fullscreen(&self) -> Result<()> {
        self.record(EngineCall::Fullscreen)?;
        match &self.fullscreen_error {
            Some(reason) => Err(anyhow!(reason.clone())),
            None => Ok(()),
        }
    }

    async fn unload(&self) -> Result<()> {
        if !self.unloaded.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.calls
                .lock()
                .expect("calls lock")
                .push(EngineCall::Unload);
        }
        Ok(())
    }

    fn subscribe_status(&self) -> broadcast::Receiver<EngineStatus> {
        self.events.subscribe()
    }
}

pub struct ScriptedBackend {
    duration_seconds: Option<f64>,
    fail_with: Option<String>,
    fullscreen_error: Option<String>,
    open_gate: Option<Arc<Notify>>,
    opened: StdMutex<Vec<Arc<ScriptedHandle>>>,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
}

impl ScriptedBackend {
    pub fn with_duration(duration_seconds: f64) -> Self {
        Self {
            duration_seconds: Some(duration_seconds),
            fail_with: None,
            fullscreen_error: None,
            open_gate: None,
            opened: StdMutex::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        let mut backend = Self::with_duration(1.0);
        backend.fail_with = Some(reason.into());
        backend
    }

    pub fn with_fullscreen_error(mut self, reason: impl Into<String>) -> Self {
        self.fullscreen_error = Some(reason.into());
        self
    }

    /// Every `open` waits for one `notify_one` on the returned gate.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.open_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn opened(&self) -> Vec<Arc<ScriptedHandle>> {
        self.opened.lock().expect("opened lock").clone()
    }

    pub fn last(&self) -> Arc<ScriptedHandle> {
        self.opened()
            .last()
            .cloned()
            .expect("at least one handle opened")
    }

    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live_handles(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    async fn open(
        &self,
        source: &MediaSource,
        options: OpenOptions,
    ) -> Result<Arc<dyn EngineHandle>> {
        if let Some(gate) = &self.open_gate {
            gate.notified().await;
        }
        if let Some(reason) = &self.fail_with {
            return Err(anyhow!(reason.clone()));
        }
        let (events, _) = broadcast::channel(64);
        let handle = Arc::new(ScriptedHandle {
            uri: source.uri.clone(),
            calls: StdMutex::new(Vec::new()),
            events,
            initial: EngineStatus {
                position_seconds: 0.0,
                duration_seconds: self.duration_seconds,
                is_playing: options.should_play,
                is_buffering: false,
                did_just_finish: false,
            },
            unloaded: AtomicBool::new(false),
            fullscreen_error: self.fullscreen_error.clone(),
            live: Arc::clone(&self.live),
        });
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        self.opened
            .lock()
            .expect("opened lock")
            .push(Arc::clone(&handle));
        Ok(handle as Arc<dyn EngineHandle>)
    }
}

pub fn progress(position: f64, duration: f64) -> EngineStatus {
    EngineStatus {
        position_seconds: position,
        duration_seconds: Some(duration),
        is_playing: true,
        is_buffering: false,
        did_just_finish: false,
    }
}

pub fn just_finished(duration: f64) -> EngineStatus {
    EngineStatus {
        position_seconds: duration,
        duration_seconds: Some(duration),
        is_playing: false,
        is_buffering: false,
        did_just_finish: true,
    }
}

pub struct ScriptedPicker {
    next: StdMutex<Option<Result<Option<PickedFile>, String>>>,
}

impl ScriptedPicker {
    pub fn returning(picked: Option<PickedFile>) -> Self {
        Self {
            next: StdMutex::new(Some(Ok(picked))),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            next: StdMutex::new(Some(Err(reason.into()))),
        }
    }
}

#[async_trait]
impl FilePicker for ScriptedPicker {
    async fn pick(&self) -> Result<Option<PickedFile>> {
        match self.next.lock().expect("picker lock").take() {
            Some(Ok(picked)) => Ok(picked),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Ok(None),
        }
    }
}

/// Returns fixed bytes and remembers which URIs it was asked to read.
pub struct RecordingReader {
    pub bytes: Vec<u8>,
    pub requested: StdMutex<Vec<String>>,
}

impl RecordingReader {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            requested: StdMutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().expect("reader lock").clone()
    }
}

#[async_trait]
impl MediaReader for RecordingReader {
    async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        self.requested
            .lock()
            .expect("reader lock")
            .push(uri.to_string());
        Ok(self.bytes.clone())
    }
}

pub async fn wait_for_snapshot(
    rx: &mut broadcast::Receiver<ControllerEvent>,
    mut predicate: impl FnMut(&PlayerSnapshot) -> bool,
) -> PlayerSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(ControllerEvent::Snapshot(snapshot)) if predicate(&snapshot) => {
                    return snapshot
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}

pub async fn wait_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

pub async fn wait_for_notice(rx: &mut broadcast::Receiver<ControllerEvent>) -> Notice {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(ControllerEvent::Notice(notice)) => return notice,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for notice")
}
