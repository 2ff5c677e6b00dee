use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use media_engine::SimulatedBackend;
use player_core::{
    load_settings, ControllerDependencies, ControllerEvent, LocalFileReader, NoticeSeverity,
    PickedFile, PlayerController, PlayerSnapshot, TranslateOutcome, TranslationCoordinator,
};
use shared::{
    domain::{MediaKind, MediaSource, Platform, TransportState},
    protocol::normalize_upload_uri,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Headless media player and translation client")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a source on the simulated engine and print the time row.
    Play {
        uri: String,
        #[arg(long)]
        mime: Option<String>,
        /// Length of the simulated media in seconds.
        #[arg(long, default_value_t = 10.0)]
        duration: f64,
        #[arg(long)]
        repeat: bool,
        #[arg(long)]
        seek: Option<f64>,
        #[arg(long, default_value_t = 250)]
        tick_ms: u64,
    },
    /// Upload a local video and print the finished job as JSON.
    Translate {
        uri: String,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
    },
    NormalizeUri {
        uri: String,
        #[arg(long)]
        platform: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    match args.command {
        Command::Play {
            uri,
            mime,
            duration,
            repeat,
            seek,
            tick_ms,
        } => play(uri, mime, duration, repeat, seek, tick_ms).await,
        Command::Translate {
            uri,
            platform,
            base_url,
        } => translate(uri, platform, base_url).await,
        Command::NormalizeUri { uri, platform } => {
            let platform = platform.parse::<Platform>().unwrap_or_default();
            println!("{}", normalize_upload_uri(platform, &uri));
            Ok(())
        }
    }
}

async fn play(
    uri: String,
    mime: Option<String>,
    duration: f64,
    repeat: bool,
    seek: Option<f64>,
    tick_ms: u64,
) -> Result<()> {
    let settings = load_settings();
    let source = settings
        .resolver()
        .resolve(Some(PickedFile::new(uri, mime.as_deref())))?
        .ok_or_else(|| anyhow!("nothing to play"))?;

    let backend = Arc::new(
        SimulatedBackend::new(duration)
            .with_tick(Duration::from_millis(tick_ms.max(1)))
            .with_fullscreen(false),
    );
    let controller = PlayerController::new(
        &settings,
        ControllerDependencies::new(backend.clone(), backend),
    )
    .context("failed to build player")?;
    let mut events = controller.subscribe_events();

    if repeat {
        controller.toggle_repeat().await;
    }
    controller
        .load_source(source)
        .await
        .context("failed to load media")?;
    if !settings.autoplay {
        controller.play().await;
    }
    if let Some(target) = seek {
        controller.seek(target).await;
    }

    let mut last_position = 0.0;
    loop {
        match events.recv().await {
            Ok(ControllerEvent::Snapshot(snapshot)) => {
                print_time_row(&snapshot);
                if snapshot.transport == TransportState::Finished {
                    break;
                }
                let restarted = snapshot.repeat
                    && snapshot.status.position_seconds == 0.0
                    && last_position > 0.0;
                if restarted {
                    info!("player: restart observed");
                    break;
                }
                last_position = snapshot.status.position_seconds;
            }
            Ok(ControllerEvent::Notice(notice)) => match notice.severity {
                NoticeSeverity::Info => eprintln!("info: {}", notice.message),
                NoticeSeverity::Warning => eprintln!("warning: {}", notice.message),
                NoticeSeverity::Error => eprintln!("error: {}", notice.message),
            },
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }

    controller.shutdown().await;
    Ok(())
}

fn print_time_row(snapshot: &PlayerSnapshot) {
    println!(
        "{} / {}  {:?}{}",
        snapshot.elapsed_label,
        snapshot.duration_label,
        snapshot.transport,
        if snapshot.repeat { "  [repeat]" } else { "" }
    );
}

async fn translate(uri: String, platform: Option<String>, base_url: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(platform) = platform {
        settings.platform = platform.parse::<Platform>().unwrap_or_default();
    }
    if base_url.is_some() {
        settings.translate_base_url = base_url;
    }

    let translator = TranslationCoordinator::from_settings(&settings, Arc::new(LocalFileReader))
        .context("invalid translation endpoint")?;
    info!(
        endpoint = %translator.endpoint(),
        platform = %translator.platform(),
        "translate: using endpoint"
    );
    let source = MediaSource::new(MediaKind::Video, uri);

    let job = match translator.translate(Some(&source)).await {
        TranslateOutcome::Completed(job) => job,
        TranslateOutcome::Rejected { reason, job } => {
            info!(?reason, "translate: request rejected");
            job
        }
        TranslateOutcome::Abandoned => return Err(anyhow!("translation abandoned")),
    };
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
