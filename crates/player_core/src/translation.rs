//! Single-slot upload-and-translate job.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{
    domain::{MediaSource, Platform, TranslationJob, TranslationState},
    error::TranslationError,
    protocol::{
        normalize_upload_uri, TranslateResponse, UPLOAD_CONTENT_TYPE, UPLOAD_FIELD_NAME,
        UPLOAD_FILE_NAME,
    },
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Settings;

const LOCAL_FILE_SCHEME: &str = "file://";
/// Recorded when a request is dropped before it reached a terminal state.
pub const CANCELLED_MESSAGE: &str = "Translation was cancelled";

/// Supplies the bytes behind a (normalized) media URI.
#[async_trait]
pub trait MediaReader: Send + Sync {
    async fn read(&self, uri: &str) -> anyhow::Result<Vec<u8>>;
}

/// Reads `file://` URLs and plain filesystem paths.
pub struct LocalFileReader;

#[async_trait]
impl MediaReader for LocalFileReader {
    async fn read(&self, uri: &str) -> anyhow::Result<Vec<u8>> {
        let path = if uri.starts_with(LOCAL_FILE_SCHEME) {
            Url::parse(uri)
                .with_context(|| format!("invalid file url '{uri}'"))?
                .to_file_path()
                .map_err(|_| anyhow!("'{uri}' is not a local file url"))?
        } else if uri.contains("://") {
            return Err(anyhow!("cannot read '{uri}': only local files are supported"));
        } else {
            PathBuf::from(uri)
        };
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateRejection {
    NoSource,
    AlreadyInFlight,
    ShutDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateOutcome {
    /// The request ran to a terminal state, which is now the current job.
    Completed(TranslationJob),
    /// Nothing was sent; `job` is the job as it stands.
    Rejected {
        reason: TranslateRejection,
        job: TranslationJob,
    },
    /// The request resolved after teardown and its result was dropped.
    Abandoned,
}

/// Clears the in-flight flag however the request ends. A request dropped
/// before committing a terminal state leaves a failed job behind.
struct InFlightGuard<'a> {
    coordinator: &'a TranslationCoordinator,
    request_id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.abandon(self.request_id);
        self.coordinator.in_flight.store(false, Ordering::Release);
    }
}

pub struct TranslationCoordinator {
    http: Client,
    endpoint: Url,
    platform: Platform,
    reader: Arc<dyn MediaReader>,
    job: Mutex<TranslationJob>,
    in_flight: AtomicBool,
    request_seq: AtomicU64,
    alive: AtomicBool,
    events: broadcast::Sender<TranslationJob>,
}

impl TranslationCoordinator {
    pub fn new(endpoint: Url, platform: Platform) -> Self {
        Self::with_reader(endpoint, platform, Arc::new(LocalFileReader))
    }

    pub fn with_reader(endpoint: Url, platform: Platform, reader: Arc<dyn MediaReader>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            http: Client::new(),
            endpoint,
            platform,
            reader,
            job: Mutex::new(TranslationJob::default()),
            in_flight: AtomicBool::new(false),
            request_seq: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            events,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        reader: Arc<dyn MediaReader>,
    ) -> Result<Self, TranslationError> {
        Ok(Self::with_reader(
            settings.translate_endpoint()?,
            settings.platform,
            reader,
        ))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub async fn job(&self) -> TranslationJob {
        self.lock_job().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TranslationJob> {
        self.events.subscribe()
    }

    /// Uploads `source` and waits for the translation. Rejected without any
    /// network traffic when there is no source or a job is already running.
    pub async fn translate(&self, source: Option<&MediaSource>) -> TranslateOutcome {
        if !self.alive.load(Ordering::Acquire) {
            return self.rejected(TranslateRejection::ShutDown).await;
        }
        let Some(source) = source else {
            info!("translate: rejected, no media loaded");
            return self.rejected(TranslateRejection::NoSource).await;
        };
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(uri = %source.uri, "translate: joined in-flight job");
            return self.rejected(TranslateRejection::AlreadyInFlight).await;
        }
        let request_id = self.request_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let _guard = InFlightGuard {
            coordinator: self,
            request_id,
        };

        self.commit(request_id, TranslationJob::default()).await;
        self.commit_state(request_id, TranslationState::Uploading).await;

        let job = match self.request(request_id, source).await {
            Ok(text) => {
                info!(request_id, "translate: succeeded");
                TranslationJob::succeeded(text)
            }
            Err(err) => {
                warn!(request_id, "translate: failed: {err}");
                TranslationJob::failed(err.job_detail())
            }
        };

        if self.commit(request_id, job.clone()).await {
            TranslateOutcome::Completed(job)
        } else {
            info!(request_id, "translate: result dropped after teardown");
            TranslateOutcome::Abandoned
        }
    }

    async fn request(&self, request_id: u64, source: &MediaSource) -> Result<String, TranslationError> {
        let uri = normalize_upload_uri(self.platform, &source.uri);
        debug!(request_id, platform = %self.platform, %uri, "translate: reading media");
        let bytes = self
            .reader
            .read(&uri)
            .await
            .map_err(|err| TranslationError::MediaRead {
                uri: uri.clone(),
                reason: format!("{err:#}"),
            })?;

        let part = Part::bytes(bytes)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(UPLOAD_CONTENT_TYPE)
            .map_err(|err| TranslationError::Network(err.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD_NAME, part);

        info!(request_id, endpoint = %self.endpoint, "translate: uploading");
        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|err| TranslationError::Network(err.to_string()))?;

        self.commit_state(request_id, TranslationState::AwaitingResult)
            .await;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.map_err(|err| {
                warn!(
                    request_id,
                    status = status.as_u16(),
                    "translate: error body unreadable: {err}"
                );
                TranslationError::Network(err.to_string())
            })?;
            return Err(TranslationError::Server {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| TranslationError::Network(err.to_string()))?;
        let parsed: TranslateResponse = serde_json::from_str(&body)
            .map_err(|err| TranslationError::InvalidResponse(err.to_string()))?;
        Ok(parsed.text_or_placeholder())
    }

    /// Returns a finished job to idle. Has no effect while a job is running.
    pub async fn clear(&self) -> bool {
        if self.is_in_flight() || !self.alive.load(Ordering::Acquire) {
            return false;
        }
        let mut job = self.lock_job();
        if job.is_in_flight() {
            return false;
        }
        *job = TranslationJob::default();
        let _ = self.events.send(job.clone());
        true
    }

    /// After this, results of outstanding requests are discarded.
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::Release);
    }

    async fn rejected(&self, reason: TranslateRejection) -> TranslateOutcome {
        TranslateOutcome::Rejected {
            reason,
            job: self.job().await,
        }
    }

    async fn commit_state(&self, request_id: u64, state: TranslationState) -> bool {
        self.commit(
            request_id,
            TranslationJob {
                state,
                result_text: None,
                error: None,
            },
        )
        .await
    }

    /// Writes `next` only if the coordinator is still alive and `request_id`
    /// is still the newest request.
    async fn commit(&self, request_id: u64, next: TranslationJob) -> bool {
        if !self.alive.load(Ordering::Acquire)
            || self.request_seq.load(Ordering::Acquire) != request_id
        {
            return false;
        }
        let mut job = self.lock_job();
        *job = next;
        let _ = self.events.send(job.clone());
        true
    }

    /// Fails a job whose request future went away mid-flight.
    fn abandon(&self, request_id: u64) {
        if !self.alive.load(Ordering::Acquire)
            || self.request_seq.load(Ordering::Acquire) != request_id
        {
            return;
        }
        let mut job = self.lock_job();
        if job.is_in_flight() {
            warn!(request_id, "translate: request dropped before completion");
            *job = TranslationJob::failed(CANCELLED_MESSAGE);
            let _ = self.events.send(job.clone());
        }
    }

    fn lock_job(&self) -> MutexGuard<'_, TranslationJob> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/translation_tests.rs"]
mod tests;
