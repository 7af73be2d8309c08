//! Voxkey application binary - composition root.
//!
//! Ties the crates together into a single executable:
//! 1. Load configuration from TOML
//! 2. Build the model manager and transcription dispatcher
//! 3. Build the recorder and session coordinator
//! 4. Register the global dictation hotkey
//! 5. Pump requests and replies between the capture and dispatch contexts
//!
//! Real microphone capture, whisper.cpp inference, and GPU probing are
//! behind the `capture`, `whisper`, and `gpu-probe` features; without
//! them the corresponding mocks are wired in so the binary still runs
//! end to end.

mod cli;
mod hotkey;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use voxkey_audio::VoiceActivityRecorder;
use voxkey_core::config::VoxConfig;
use voxkey_core::protocol::{CaptureEvent, DispatchRequest, Trigger};
use voxkey_core::types::OriginId;
use voxkey_dispatch::TranscriptionDispatcher;
use voxkey_model::{ModelBackend, ModelManager, WgpuDetect};
use voxkey_session::{CoordinatorMessage, SendInputSink, SessionCoordinator};

use cli::CliArgs;
use hotkey::{HotkeyConfig, HotkeyService};

/// Origin id for sessions triggered by the local hotkey.
const LOCAL_ORIGIN: OriginId = 0;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config first; the log level may come from it.
    let config_file = args.resolve_config_path();
    let config = VoxConfig::load_or_default(&config_file);

    let level = args
        .resolve_log_level()
        .unwrap_or_else(|| config.general.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    if args.write_config {
        config.save(&config_file)?;
        info!(path = %config_file.display(), "Configuration written");
        return Ok(());
    }

    info!("Starting voxkey v{}", env!("CARGO_PKG_VERSION"));
    let config = Arc::new(config);

    let model_dir = args.resolve_model_dir();
    debug!(model_dir = %model_dir.display(), "Model directory resolved");

    // === Dispatch context ===

    #[cfg(feature = "whisper")]
    let backend = voxkey_model::WhisperBackend::new(model_dir);
    #[cfg(not(feature = "whisper"))]
    let backend = {
        warn!("Built without the `whisper` feature; transcription uses the mock backend");
        voxkey_model::MockBackend::new()
    };

    #[cfg(not(feature = "gpu-probe"))]
    info!("Built without the `gpu-probe` feature; GPU backend will never be selected");

    run(backend, WgpuDetect, config).await?;
    Ok(())
}

async fn run<B>(backend: B, detector: WgpuDetect, config: Arc<VoxConfig>) -> voxkey_core::Result<()>
where
    B: ModelBackend + 'static,
{
    let manager = Arc::new(ModelManager::new(
        backend,
        detector,
        config.model.model,
        config.model.preferred_backend,
    ));
    let probe = manager.probe(false);
    info!(
        gpu_usable = probe.usable(),
        preferred = %config.model.preferred_backend,
        "Backend probe complete"
    );
    let dispatcher = Arc::new(TranscriptionDispatcher::new(manager, Arc::clone(&config)));

    // === Capture context ===

    #[cfg(feature = "capture")]
    let capture = Arc::new(voxkey_audio::CpalCapture::new(
        voxkey_audio::CaptureConfig::default(),
    ));
    #[cfg(not(feature = "capture"))]
    let capture = {
        warn!("Built without the `capture` feature; the microphone is mocked");
        Arc::new(voxkey_audio::MockCapture::new())
    };

    let (outcome_tx, outcome_rx) = mpsc::channel(16);
    let (request_tx, mut request_rx) = mpsc::channel::<DispatchRequest>(16);
    let (event_tx, mut event_rx) = mpsc::channel::<CaptureEvent>(16);
    let (message_tx, message_rx) = mpsc::channel::<CoordinatorMessage>(32);

    let recorder = VoiceActivityRecorder::new(capture, outcome_tx);
    let coordinator = SessionCoordinator::new(
        recorder,
        Arc::new(SendInputSink::new()),
        Arc::clone(&config),
        request_tx,
        event_tx,
        message_tx.clone(),
    );

    // Request pump: one task per request so origins proceed concurrently;
    // per-origin serialization happens inside the dispatcher.
    let reply_tx = message_tx.clone();
    tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            let dispatcher = Arc::clone(&dispatcher);
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                if let Some(reply) = dispatcher.handle(request).await {
                    let _ = reply_tx.send(CoordinatorMessage::Reply(reply)).await;
                }
            });
        }
    });

    // Indicator events; there is no tray UI yet, so they only hit the log.
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "Capture event");
        }
    });

    // Hotkey listener toggles recording for the local origin.
    let hotkey_key = config.dictation.hotkey.clone();
    tokio::spawn(hotkey_listener(hotkey_key, message_tx));

    coordinator.run(message_rx, outcome_rx).await;
    Ok(())
}

/// Poll the global hotkey and toggle recording on each press.
async fn hotkey_listener(key: String, trigger_tx: mpsc::Sender<CoordinatorMessage>) {
    // The hotkey manager contains a raw pointer (!Send), so poll it on a
    // blocking thread.
    let _ = tokio::task::spawn_blocking(move || {
        let service = match HotkeyService::new(HotkeyConfig { key }) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to register dictation hotkey");
                return;
            }
        };
        info!(key = service.key(), "Hotkey listener running");

        let host = local_hostname();
        let mut is_recording = false;
        loop {
            if service.was_pressed() {
                let trigger = if is_recording {
                    Trigger::StopRecording
                } else {
                    Trigger::StartRecording { language: None }
                };
                is_recording = !is_recording;
                let message = CoordinatorMessage::Trigger {
                    origin_id: LOCAL_ORIGIN,
                    hostname: host.clone(),
                    trigger,
                };
                if trigger_tx.blocking_send(message).is_err() {
                    return;
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    })
    .await;
}

/// Machine name used as the settings-override key for local sessions.
fn local_hostname() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "local".to_string())
}
