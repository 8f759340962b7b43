mod controller;
mod http;
mod input;
mod ipc;
mod player;
mod presets;
mod resolver;
mod timeline;

use bakelite_core::config::Config;
use bakelite_core::store::Store;
use input::InputEvent;
use player::{EngineConfig, EngineEvent};
use resolver::YtDlpResolver;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Everything external funnels through one channel into one loop: hardware
/// input, engine events, and the shutdown signal.
#[derive(Debug)]
enum DaemonEvent {
    Input(InputEvent),
    Engine(EngineEvent),
    Shutdown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging under the data dir; the appliance has no terminal.
    let data_dir = bakelite_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,bakelite_daemon=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let store = Store::new(config.daemon.data_dir.clone());
    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(256);

    // Engine events ride their own channel and get folded into the daemon
    // channel here.
    let (engine_tx, mut engine_rx) = mpsc::channel::<EngineEvent>(64);
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = engine_rx.recv().await {
                if event_tx.send(DaemonEvent::Engine(event)).await.is_err() {
                    break;
                }
            }
        });
    }

    let engine_cfg = EngineConfig {
        player_binary: config.player.binary.clone(),
        sounds_dir: config.player.sounds_dir.clone(),
    };
    let controller = controller::build(engine_cfg, Arc::new(YtDlpResolver), store, engine_tx).await;

    // Trace state-change notifications; external consumers poll /api/state.
    {
        let mut state_rx = controller.subscribe();
        let ctrl = controller.clone();
        tokio::spawn(async move {
            loop {
                match state_rx.recv().await {
                    Ok(_) => {
                        let snap = ctrl.snapshot().await;
                        tracing::debug!(
                            "State: station {} volume {} status {:?}",
                            snap.station_index,
                            snap.volume,
                            snap.status
                        );
                    }
                    // Lagging just means notifications coalesced.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    controller.startup().await;

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            controller.clone(),
        );
    }

    spawn_stdin_reader(event_tx.clone());

    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = event_tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("Daemon initialised, running event loop");
    let mut filter = input::InputFilter::new();
    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::Input(ev) => {
                if filter.accept(ev) {
                    input::dispatch(&controller, ev).await;
                }
            }
            DaemonEvent::Engine(ev) => controller.handle_engine_event(ev).await,
            DaemonEvent::Shutdown => break,
        }
    }

    info!("Shutting down");
    controller.shutdown().await;
    Ok(())
}

/// Line-oriented control on stdin, standing in for the hardware knobs when
/// the daemon runs on a development machine.
fn spawn_stdin_reader(tx: mpsc::Sender<DaemonEvent>) {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = match line.trim() {
                "n" | "next" => InputEvent::StationNext,
                "p" | "prev" => InputEvent::StationPrev,
                "+" => InputEvent::VolumeUp,
                "-" => InputEvent::VolumeDown,
                "o" | "power" => InputEvent::PowerButton,
                "" => continue,
                other => {
                    warn!("Unknown input command: {}", other);
                    continue;
                }
            };
            if tx.send(DaemonEvent::Input(event)).await.is_err() {
                break;
            }
        }
    });
}
