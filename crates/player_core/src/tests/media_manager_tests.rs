use super::*;
use crate::test_support::{progress, EngineCall, ScriptedBackend};
use shared::domain::MediaKind;

fn manager_with(audio: Arc<ScriptedBackend>, video: Arc<ScriptedBackend>) -> MediaManager {
    MediaManager::new(audio, video)
}

fn video(uri: &str) -> MediaSource {
    MediaSource::new(MediaKind::Video, uri)
}

#[tokio::test]
async fn load_dispatches_by_media_kind() {
    let audio = Arc::new(ScriptedBackend::with_duration(30.0));
    let video_backend = Arc::new(ScriptedBackend::with_duration(120.0));
    let manager = manager_with(Arc::clone(&audio), Arc::clone(&video_backend));

    let loaded = manager
        .load(MediaSource::new(MediaKind::Audio, "file:///song.mp3"))
        .await
        .expect("audio load");
    assert_eq!(loaded.initial.duration_seconds, Some(30.0));
    assert_eq!(audio.opened().len(), 1);
    assert!(video_backend.opened().is_empty());

    manager
        .load(video("file:///clip.mp4"))
        .await
        .expect("video load");
    assert_eq!(video_backend.opened().len(), 1);
    assert_eq!(
        manager.current_source().await.map(|source| source.kind),
        Some(MediaKind::Video)
    );
}

#[tokio::test]
async fn new_load_releases_previous_handle_first() {
    let backend = Arc::new(ScriptedBackend::with_duration(120.0));
    let manager = manager_with(Arc::clone(&backend), Arc::clone(&backend));

    manager.load(video("a.mp4")).await.expect("first");
    manager.load(video("b.mp4")).await.expect("second");

    let opened = backend.opened();
    assert_eq!(opened.len(), 2);
    assert!(opened[0].is_unloaded());
    assert!(!opened[1].is_unloaded());
    assert_eq!(backend.max_live_handles(), 1);
    assert_eq!(backend.live_handles(), 1);
}

#[tokio::test]
async fn failed_load_leaves_manager_unloaded() {
    let good = Arc::new(ScriptedBackend::with_duration(120.0));
    let broken = Arc::new(ScriptedBackend::failing("codec not supported"));
    let manager = manager_with(Arc::clone(&broken), Arc::clone(&good));

    manager.load(video("a.mp4")).await.expect("video load");
    let err = manager
        .load(MediaSource::new(MediaKind::Audio, "b.mp3"))
        .await
        .err()
        .expect("audio load must fail");

    match err {
        MediaLoadError::Open { kind, reason, .. } => {
            assert_eq!(kind, MediaKind::Audio);
            assert!(reason.contains("codec not supported"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!manager.is_loaded().await);
    assert!(good.last().is_unloaded());
}

#[tokio::test]
async fn unload_is_idempotent() {
    let backend = Arc::new(ScriptedBackend::with_duration(120.0));
    let manager = manager_with(Arc::clone(&backend), Arc::clone(&backend));

    manager.unload().await;
    manager.load(video("a.mp4")).await.expect("load");
    manager.unload().await;
    manager.unload().await;

    assert!(!manager.is_loaded().await);
    let calls = backend.last().calls();
    assert_eq!(
        calls.iter().filter(|call| **call == EngineCall::Unload).count(),
        1
    );
}

#[tokio::test]
async fn unload_during_open_leaves_no_live_handle() {
    let (backend, gate) = ScriptedBackend::with_duration(120.0).gated();
    let backend = Arc::new(backend);
    let manager = Arc::new(manager_with(Arc::clone(&backend), Arc::clone(&backend)));

    let loading = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.load(video("slow.mp4")).await })
    };
    tokio::task::yield_now().await;

    let unloading = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.unload().await })
    };
    tokio::task::yield_now().await;
    gate.notify_one();

    let result = loading.await.expect("load task");
    unloading.await.expect("unload task");

    assert!(matches!(result, Err(MediaLoadError::Superseded { .. })));
    assert!(!manager.is_loaded().await);
    assert_eq!(backend.live_handles(), 0);
}

#[tokio::test]
async fn later_load_wins_over_one_still_opening() {
    let (backend, gate) = ScriptedBackend::with_duration(120.0).gated();
    let backend = Arc::new(backend);
    let manager = Arc::new(manager_with(Arc::clone(&backend), Arc::clone(&backend)));

    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.load(video("first.mp4")).await })
    };
    tokio::task::yield_now().await;
    let second = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.load(video("second.mp4")).await })
    };
    tokio::task::yield_now().await;

    gate.notify_one();
    let first = first.await.expect("first task");
    assert!(matches!(first, Err(MediaLoadError::Superseded { .. })));

    gate.notify_one();
    let second = second.await.expect("second task").expect("second load");
    assert_eq!(second.source.uri, "second.mp4");
    assert_eq!(backend.max_live_handles(), 1);
    assert_eq!(
        manager.current_source().await.map(|source| source.uri),
        Some("second.mp4".to_string())
    );
}

#[tokio::test]
async fn commands_route_only_to_current_generation() {
    let backend = Arc::new(ScriptedBackend::with_duration(120.0));
    let manager = manager_with(Arc::clone(&backend), Arc::clone(&backend));

    assert_eq!(
        manager.execute(1, EngineCommand::Play).await,
        Err(EngineCommandError::NoMedia)
    );

    let first = manager.load(video("a.mp4")).await.expect("first");
    let second = manager.load(video("b.mp4")).await.expect("second");

    let stale = manager.execute(first.generation, EngineCommand::Pause).await;
    assert!(matches!(stale, Err(EngineCommandError::Stale { .. })));

    manager
        .execute(second.generation, EngineCommand::Seek(12.0))
        .await
        .expect("seek");
    assert_eq!(backend.last().calls(), vec![EngineCall::Seek(12.0)]);
}

#[tokio::test]
async fn status_stream_delivers_reports_in_order() {
    let backend = Arc::new(ScriptedBackend::with_duration(120.0));
    let manager = manager_with(Arc::clone(&backend), Arc::clone(&backend));
    let mut loaded = manager.load(video("a.mp4")).await.expect("load");

    let handle = backend.last();
    for second in [1.0, 2.0, 3.0] {
        handle.emit(progress(second, 120.0));
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let status = loaded.events.next().await.expect("status");
        seen.push(status.position_seconds);
    }
    assert_eq!(seen, vec![1.0, 2.0, 3.0]);

    let (generation, mut restarted) = manager.status_stream().await.expect("stream");
    assert_eq!(generation, loaded.generation);
    handle.emit(progress(4.0, 120.0));
    assert_eq!(
        restarted.next().await.map(|status| status.position_seconds),
        Some(4.0)
    );
}

#[tokio::test]
async fn fullscreen_failure_is_reported() {
    let backend = Arc::new(ScriptedBackend::with_duration(120.0).with_fullscreen_error("no window"));
    let manager = manager_with(Arc::clone(&backend), Arc::clone(&backend));
    let loaded = manager.load(video("a.mp4")).await.expect("load");

    let err = manager
        .present_fullscreen(loaded.generation)
        .await
        .expect_err("fullscreen fails");
    assert!(err.reason.contains("no window"));
}

#[tokio::test]
async fn dropped_lease_is_released_by_runtime() {
    let backend = Arc::new(ScriptedBackend::with_duration(120.0));
    {
        let manager = manager_with(Arc::clone(&backend), Arc::clone(&backend));
        manager.load(video("a.mp4")).await.expect("load");
    }
    crate::test_support::wait_until(|| backend.live_handles() == 0).await;
    assert!(backend.last().is_unloaded());
}
