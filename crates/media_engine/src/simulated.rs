//! Clock-driven engine used for headless runs. Position advances in real
//! (tokio) time while playing and a finish edge is reported at the end.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use shared::domain::MediaSource;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::debug;

use crate::{EngineHandle, EngineStatus, MediaBackend, OpenOptions};

const DEFAULT_TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    duration_seconds: f64,
    tick: Duration,
    fullscreen_supported: bool,
}

impl SimulatedBackend {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            tick: DEFAULT_TICK,
            fullscreen_supported: false,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_fullscreen(mut self, supported: bool) -> Self {
        self.fullscreen_supported = supported;
        self
    }
}

#[async_trait]
impl MediaBackend for SimulatedBackend {
    async fn open(
        &self,
        source: &MediaSource,
        options: OpenOptions,
    ) -> Result<Arc<dyn EngineHandle>> {
        if source.uri.trim().is_empty() {
            bail!("empty media uri");
        }
        if !(self.duration_seconds.is_finite() && self.duration_seconds > 0.0) {
            bail!("simulated media has no playable duration");
        }
        debug!(uri = %source.uri, kind = %source.kind, "simulated: opening source");
        let handle: Arc<dyn EngineHandle> = SimulatedHandle::start(
            self.duration_seconds,
            self.tick,
            options.should_play,
            self.fullscreen_supported,
        );
        Ok(handle)
    }
}

struct Clock {
    position_seconds: f64,
    duration_seconds: f64,
    playing: bool,
    released: bool,
}

impl Clock {
    fn report(&self, did_just_finish: bool) -> EngineStatus {
        EngineStatus {
            position_seconds: self.position_seconds,
            duration_seconds: Some(self.duration_seconds),
            is_playing: self.playing,
            is_buffering: false,
            did_just_finish,
        }
    }
}

pub struct SimulatedHandle {
    clock: Arc<Mutex<Clock>>,
    events: broadcast::Sender<EngineStatus>,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
    fullscreen_supported: bool,
}

impl SimulatedHandle {
    fn start(
        duration_seconds: f64,
        tick: Duration,
        should_play: bool,
        fullscreen_supported: bool,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let clock = Arc::new(Mutex::new(Clock {
            position_seconds: 0.0,
            duration_seconds,
            playing: should_play,
            released: false,
        }));

        let ticker = tokio::spawn(run_clock(Arc::clone(&clock), events.clone(), tick));

        Arc::new(Self {
            clock,
            events,
            ticker: std::sync::Mutex::new(Some(ticker)),
            fullscreen_supported,
        })
    }

    async fn live_clock(&self) -> Result<tokio::sync::MutexGuard<'_, Clock>> {
        let clock = self.clock.lock().await;
        if clock.released {
            return Err(anyhow!("engine handle already released"));
        }
        Ok(clock)
    }
}

async fn run_clock(
    clock: Arc<Mutex<Clock>>,
    events: broadcast::Sender<EngineStatus>,
    tick: Duration,
) {
    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let mut guard = clock.lock().await;
        if guard.released {
            break;
        }
        if !guard.playing {
            continue;
        }
        guard.position_seconds += tick.as_secs_f64();
        let report = if guard.position_seconds >= guard.duration_seconds {
            guard.position_seconds = guard.duration_seconds;
            guard.playing = false;
            guard.report(true)
        } else {
            guard.report(false)
        };
        drop(guard);
        let _ = events.send(report);
    }
}

#[async_trait]
impl EngineHandle for SimulatedHandle {
    async fn play(&self) -> Result<()> {
        let mut clock = self.live_clock().await?;
        clock.playing = true;
        let _ = self.events.send(clock.report(false));
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut clock = self.live_clock().await?;
        clock.playing = false;
        let _ = self.events.send(clock.report(false));
        Ok(())
    }

    async fn seek(&self, position_seconds: f64) -> Result<()> {
        let mut clock = self.live_clock().await?;
        clock.position_seconds = position_seconds.clamp(0.0, clock.duration_seconds);
        let _ = self.events.send(clock.report(false));
        Ok(())
    }

    async fn status(&self) -> Result<EngineStatus> {
        let clock = self.live_clock().await?;
        Ok(clock.report(false))
    }

    async fn present_fullscreen(&self) -> Result<()> {
        let _clock = self.live_clock().await?;
        if !self.fullscreen_supported {
            bail!("no display attached to the simulated engine");
        }
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        self.clock.lock().await.released = true;
        let ticker = match self.ticker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(ticker) = ticker {
            ticker.abort();
        }
        Ok(())
    }

    fn subscribe_status(&self) -> broadcast::Receiver<EngineStatus> {
        self.events.subscribe()
    }
}
