//! Playback engine: supervises the external player process(es).
//!
//! One primary stream slot plus a persistent looping "static" ambience
//! process.  A fixed-interval poll drives the stream status state machine;
//! volume ramps run as short-lived cancellable tasks.  During a crossfade the
//! outgoing process is *retired*: ownership of the child moves into a reaper
//! task that fades it out and always terminates it, so no switch burst can
//! orphan a process.

use crate::ipc::ControlChannel;
use crate::presets;
use crate::resolver::{needs_resolution, StreamResolver};
use bakelite_core::platform;
use bakelite_core::state::StreamStatus;
use bakelite_core::store::{DurationCache, Store};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Status poll interval while a primary process is alive.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Bounded wait for a graceful quit before force-terminating.
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);
/// Resolved stream URLs are time-limited tokens; re-resolve after this age.
const STREAM_URL_TTL: Duration = Duration::from_secs(30 * 60);
/// Discrete steps per volume ramp.
const FADE_STEPS: u32 = 20;
/// Total crossfade cleanup window: fade plus settle time before the kill.
const RETIRE_WINDOW: Duration = Duration::from_secs(3);
/// Fade-out duration for a retired stream.
const RETIRE_FADE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Player binary override; `None` means discover mpv via the platform
    /// helper.
    pub player_binary: Option<PathBuf>,
    /// Directory holding `static.(wav|mp3|ogg)` for the ambience channel.
    pub sounds_dir: PathBuf,
}

/// Events flowing up to the daemon loop.  Best-effort: rapid repeats may
/// coalesce, consumers re-pull state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    StatusChanged,
    /// The primary process reached natural end-of-file (not a user stop).
    StreamEnded,
}

struct Slot {
    child: Child,
    channel: ControlChannel,
    gen: u64,
}

struct AmbienceSlot {
    child: Child,
    channel: ControlChannel,
}

/// An outgoing stream handed off for crossfade cleanup.  Owning the child
/// here is the orphan-proofing: only the reaper task can (and always does)
/// terminate it.
pub struct RetiredStream {
    child: Child,
    channel: ControlChannel,
    cancel: CancellationToken,
    start_volume: u8,
}

impl RetiredStream {
    /// Fade to silence in the background and reap the process.  The kill
    /// fires when the cleanup window closes *or* immediately when a newer
    /// switch cancels the token — either way it happens exactly once,
    /// because this task owns the child.
    pub fn fade_out_and_reap(self) {
        let RetiredStream {
            mut child,
            channel,
            cancel,
            start_volume,
        } = self;

        tokio::spawn(async move {
            // Immediate drop to 70% makes headroom for the static overlay.
            let ducked = start_volume as f64 * 0.7;
            channel.set_property("volume", json!(ducked)).await;

            fade_ramp(&channel, ducked, 0.0, RETIRE_FADE, &cancel).await;

            let settle = RETIRE_WINDOW.saturating_sub(RETIRE_FADE);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(settle) => {}
            }

            let _ = child.kill().await;
            let _ = child.wait().await;
            channel.cleanup_socket();
            debug!("Retired stream reaped");
        });
    }
}

struct EngineState {
    primary: Option<Slot>,
    status: StreamStatus,
    target_volume: u8,
    static_percent: u8,
    static_audible: bool,
    ambience: Option<AmbienceSlot>,
    preset: String,
    loudness_normalization: bool,
    /// Cancels in-flight primary fades; rotated when a newer fade or switch
    /// supersedes them.
    fade_token: CancellationToken,
    /// Cancels an in-flight ambience ramp.
    ambience_token: CancellationToken,
    next_gen: u64,
    socket_counter: u64,
}

struct Inner {
    state: Mutex<EngineState>,
    resolver: Arc<dyn StreamResolver>,
    durations: Mutex<DurationCache>,
    stream_urls: Mutex<HashMap<String, (String, SystemTime)>>,
    store: Store,
    events: mpsc::Sender<EngineEvent>,
    cfg: EngineConfig,
}

#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<Inner>,
}

impl PlaybackEngine {
    pub async fn new(
        cfg: EngineConfig,
        resolver: Arc<dyn StreamResolver>,
        store: Store,
        events: mpsc::Sender<EngineEvent>,
    ) -> Self {
        sweep_orphan_sockets().await;

        let durations = store.load_durations();
        let engine = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(EngineState {
                    primary: None,
                    status: StreamStatus::Stopped,
                    target_volume: 40,
                    static_percent: 60,
                    static_audible: false,
                    ambience: None,
                    preset: "flat".to_string(),
                    loudness_normalization: false,
                    fade_token: CancellationToken::new(),
                    ambience_token: CancellationToken::new(),
                    next_gen: 1,
                    socket_counter: 0,
                }),
                resolver,
                durations: Mutex::new(durations),
                stream_urls: Mutex::new(HashMap::new()),
                store,
                events,
                cfg,
            }),
        };

        // Persistent ambience process, muted and looping, so fade-in has no
        // process-start latency.
        {
            let mut st = engine.inner.state.lock().await;
            engine.spawn_ambience_locked(&mut st, true, 0.0);
        }

        engine
    }

    // ── primary stream ───────────────────────────────────────────────────────

    /// Launch a stream.  `exclusive` stops the current primary first;
    /// non-exclusive starts leave the previous process untouched (the caller
    /// retires it), under a fresh IPC socket path so both stay addressable.
    pub async fn start(&self, url: &str, start_position: f64, exclusive: bool) -> bool {
        if exclusive {
            self.stop().await;
        }

        let (socket_path, gen, volume, chain) = {
            let mut st = self.inner.state.lock().await;
            let path = if exclusive {
                platform::primary_socket_path()
            } else {
                st.socket_counter += 1;
                platform::numbered_socket_path(st.socket_counter)
            };
            st.status = StreamStatus::Loading;
            let gen = st.next_gen;
            st.next_gen += 1;
            (
                path,
                gen,
                st.target_volume,
                presets::filter_chain(&st.preset, st.loudness_normalization),
            )
        };
        self.emit(EngineEvent::StatusChanged).await;

        let play_url = if needs_resolution(url) {
            self.stream_url_for(url)
                .await
                .unwrap_or_else(|| url.to_string())
        } else {
            url.to_string()
        };

        let Some(binary) = self
            .inner
            .cfg
            .player_binary
            .clone()
            .or_else(platform::find_player_binary)
        else {
            error!("Player binary not found; cannot start stream");
            self.set_status(StreamStatus::Error).await;
            return false;
        };

        let channel = ControlChannel::new(socket_path.clone());
        channel.cleanup_socket();

        let mut cmd = Command::new(&binary);
        cmd.arg(format!("--input-ipc-server={}", socket_path.display()))
            .arg("--no-video")
            .arg("--no-terminal")
            .arg(format!("--volume={}", volume));
        if start_position > 0.0 {
            cmd.arg(format!("--start={}", start_position as u64));
        }
        if !chain.is_empty() {
            cmd.arg(format!("--af={}", chain));
        }
        cmd.arg(&play_url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to launch player {:?}: {}", binary, e);
                self.set_status(StreamStatus::Error).await;
                return false;
            }
        };

        {
            let mut st = self.inner.state.lock().await;
            st.primary = Some(Slot {
                child,
                channel,
                gen,
            });
        }
        if start_position > 0.0 {
            info!("Started stream {} at {:.0}s", url, start_position);
        } else {
            info!("Started stream {}", url);
        }

        let engine = self.clone();
        tokio::spawn(async move { engine.poll_status(gen).await });
        true
    }

    /// Graceful stop: `quit` over IPC with a bounded wait, then a hard kill.
    /// Always clears the slot and socket artifact.  Idempotent.
    pub async fn stop(&self) {
        let (slot, changed) = {
            let mut st = self.inner.state.lock().await;
            st.fade_token.cancel();
            st.fade_token = CancellationToken::new();
            let changed = st.status != StreamStatus::Stopped;
            st.status = StreamStatus::Stopped;
            (st.primary.take(), changed)
        };

        if let Some(mut slot) = slot {
            slot.channel.quit().await;
            if tokio::time::timeout(QUIT_TIMEOUT, slot.child.wait())
                .await
                .is_err()
            {
                warn!("Player did not quit in time, killing");
                let _ = slot.child.kill().await;
                let _ = slot.child.wait().await;
            }
            slot.channel.cleanup_socket();
            info!("Playback stopped");
        }

        if changed {
            self.emit(EngineEvent::StatusChanged).await;
        }
    }

    /// Hand the current primary over for crossfade cleanup.  Returns `None`
    /// unless something is playing or loading.  The returned stream keeps its
    /// own control channel so it accepts fade commands after a new primary
    /// has started.
    pub async fn retire_primary(&self) -> Option<RetiredStream> {
        let mut st = self.inner.state.lock().await;
        if !matches!(st.status, StreamStatus::Playing | StreamStatus::Loading) {
            return None;
        }
        let slot = st.primary.take()?;
        st.fade_token.cancel();
        st.fade_token = CancellationToken::new();
        Some(RetiredStream {
            child: slot.child,
            channel: slot.channel,
            cancel: st.fade_token.child_token(),
            start_volume: st.target_volume,
        })
    }

    /// Ramp the current primary from its live level down to silence.  Does
    /// not change the target volume.
    pub async fn fade_out_primary(&self, duration: Duration) {
        let (channel, from, token) = {
            let mut st = self.inner.state.lock().await;
            let Some(channel) = st.primary.as_ref().map(|s| s.channel.clone()) else {
                return;
            };
            st.fade_token.cancel();
            st.fade_token = CancellationToken::new();
            (
                channel,
                st.target_volume as f64,
                st.fade_token.child_token(),
            )
        };
        tokio::spawn(async move {
            fade_ramp(&channel, from, 0.0, duration, &token).await;
        });
    }

    /// Ramp the current primary from silence up to the target volume; used
    /// when audio resumes without a full restart.
    pub async fn fade_in_primary(&self, duration: Duration) {
        let (channel, to, token) = {
            let mut st = self.inner.state.lock().await;
            let Some(channel) = st.primary.as_ref().map(|s| s.channel.clone()) else {
                return;
            };
            st.fade_token.cancel();
            st.fade_token = CancellationToken::new();
            (
                channel,
                st.target_volume as f64,
                st.fade_token.child_token(),
            )
        };
        tokio::spawn(async move {
            channel.set_property("volume", json!(0.0)).await;
            fade_ramp(&channel, 0.0, to, duration, &token).await;
            channel.set_property("volume", json!(to)).await;
        });
    }

    // ── volume ───────────────────────────────────────────────────────────────

    /// Clamp, record, and push live to the primary; the ambience channel
    /// follows proportionally while it is audible.
    pub async fn set_volume(&self, level: u8) {
        let level = level.min(100);
        let (primary, ambience) = {
            let mut st = self.inner.state.lock().await;
            st.target_volume = level;
            let primary = st.primary.as_ref().map(|s| s.channel.clone());
            let ambience = if st.static_audible {
                st.ambience
                    .as_ref()
                    .map(|a| (a.channel.clone(), ambience_volume(level, st.static_percent)))
            } else {
                None
            };
            (primary, ambience)
        };
        if let Some(channel) = primary {
            channel.set_property("volume", json!(level)).await;
        }
        if let Some((channel, vol)) = ambience {
            channel.set_property("volume", json!(vol)).await;
        }
        debug!("Volume set to {}", level);
    }

    pub async fn volume(&self) -> u8 {
        self.inner.state.lock().await.target_volume
    }

    pub async fn set_static_percent(&self, percent: u8) {
        self.inner.state.lock().await.static_percent = percent.min(100);
    }

    // ── ambience channel ─────────────────────────────────────────────────────

    /// Unmute the static overlay immediately, respawning its process first if
    /// it died.  No-op when no static sound is installed or already audible.
    pub async fn ambience_in(&self) {
        let push = {
            let mut st = self.inner.state.lock().await;
            if st.static_audible {
                return;
            }
            st.ambience_token.cancel();
            st.ambience_token = CancellationToken::new();
            let vol = ambience_volume(st.target_volume, st.static_percent);

            let alive = match st.ambience.as_mut() {
                Some(slot) => slot.child.try_wait().ok().flatten().is_none(),
                None => false,
            };
            if alive {
                st.static_audible = true;
                st.ambience.as_ref().map(|a| (a.channel.clone(), vol))
            } else if self.spawn_ambience_locked(&mut st, true, vol) {
                st.static_audible = true;
                None // volume already set via the spawn args
            } else {
                return;
            }
        };
        if let Some((channel, vol)) = push {
            channel.set_property("volume", json!(vol)).await;
        }
    }

    /// Fade the static overlay down to silence.  Mutes only — the process
    /// keeps running so the next fade-in is instant.
    pub async fn ambience_out(&self, duration: Duration) {
        let (channel, from, token) = {
            let mut st = self.inner.state.lock().await;
            if !st.static_audible {
                return;
            }
            let Some(channel) = st.ambience.as_ref().map(|a| a.channel.clone()) else {
                st.static_audible = false;
                return;
            };
            st.static_audible = false;
            st.ambience_token.cancel();
            st.ambience_token = CancellationToken::new();
            (
                channel,
                ambience_volume(st.target_volume, st.static_percent),
                st.ambience_token.child_token(),
            )
        };
        tokio::spawn(async move {
            fade_ramp(&channel, from, 0.0, duration, &token).await;
            channel.set_property("volume", json!(0.0)).await;
            debug!("Static overlay faded to mute");
        });
    }

    /// Immediately silence the static overlay (the OFF path wants no fade).
    pub async fn mute_ambience(&self) {
        let channel = {
            let mut st = self.inner.state.lock().await;
            st.ambience_token.cancel();
            st.ambience_token = CancellationToken::new();
            st.static_audible = false;
            st.ambience.as_ref().map(|a| a.channel.clone())
        };
        if let Some(channel) = channel {
            channel.set_property("volume", json!(0.0)).await;
        }
    }

    /// Play the static cue once, un-looped — the "no signal" indication when
    /// switching into an empty pack.
    pub async fn play_ambience_once(&self) {
        let mut st = self.inner.state.lock().await;
        st.ambience_token.cancel();
        st.ambience_token = CancellationToken::new();
        if let Some(mut slot) = st.ambience.take() {
            let _ = slot.child.start_kill();
        }
        let vol = st.target_volume as f64;
        if self.spawn_ambience_locked(&mut st, false, vol) {
            st.static_audible = true;
        }
    }

    pub async fn static_audible(&self) -> bool {
        self.inner.state.lock().await.static_audible
    }

    /// Spawn the ambience player.  Returns false (quietly) when no static
    /// sound file is installed or the binary is missing.
    fn spawn_ambience_locked(&self, st: &mut EngineState, looping: bool, volume: f64) -> bool {
        let Some(sound) = find_static_sound(&self.inner.cfg.sounds_dir) else {
            debug!("No static sound available");
            return false;
        };
        let Some(binary) = self
            .inner
            .cfg
            .player_binary
            .clone()
            .or_else(platform::find_player_binary)
        else {
            warn!("Player binary not found; static overlay disabled");
            return false;
        };

        let socket_path = platform::ambience_socket_path();
        let channel = ControlChannel::new(socket_path.clone());
        channel.cleanup_socket();

        let mut cmd = Command::new(binary);
        cmd.arg(format!("--input-ipc-server={}", socket_path.display()))
            .arg("--no-video")
            .arg("--no-terminal")
            .arg(format!("--volume={}", volume));
        if looping {
            cmd.arg("--loop=inf");
        }
        cmd.arg(&sound)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.spawn() {
            Ok(child) => {
                st.ambience = Some(AmbienceSlot { child, channel });
                info!("Started static overlay process (loop={})", looping);
                true
            }
            Err(e) => {
                warn!("Failed to start static overlay: {}", e);
                false
            }
        }
    }

    // ── duration / stream-url caches ─────────────────────────────────────────

    /// Cache-first duration lookup.  A miss resolves once, opportunistically
    /// caching the stream URL from the same call, and persists the result —
    /// including `None`, which marks a live source that must not be
    /// re-queried.
    pub async fn duration_for(&self, url: &str) -> Option<f64> {
        {
            let durations = self.inner.durations.lock().await;
            if let Some(cached) = durations.get(url) {
                return *cached;
            }
        }

        let duration = match self.inner.resolver.resolve(url).await {
            Ok(resolved) => {
                if resolved.is_live {
                    debug!("{} is a live source", url);
                }
                if let Some(stream_url) = resolved.stream_url {
                    self.inner
                        .stream_urls
                        .lock()
                        .await
                        .insert(url.to_string(), (stream_url, SystemTime::now()));
                }
                resolved.duration
            }
            Err(e) => {
                warn!("Resolution failed for {}: {}", url, e);
                None
            }
        };

        let mut durations = self.inner.durations.lock().await;
        durations.insert(url.to_string(), duration);
        if let Err(e) = self.inner.store.save_durations(&durations) {
            warn!("Failed to persist duration cache: {}", e);
        }
        duration
    }

    pub async fn duration_cached(&self, url: &str) -> bool {
        self.inner.durations.lock().await.contains_key(url)
    }

    /// Cache-first direct stream URL, re-resolved past the TTL — resolved
    /// URLs are expiring tokens from the resolution service.
    pub async fn stream_url_for(&self, url: &str) -> Option<String> {
        {
            let cache = self.inner.stream_urls.lock().await;
            if let Some((stream_url, resolved_at)) = cache.get(url) {
                let fresh = resolved_at
                    .elapsed()
                    .map(|age| age < STREAM_URL_TTL)
                    .unwrap_or(false);
                if fresh {
                    return Some(stream_url.clone());
                }
            }
        }

        match self.inner.resolver.resolve(url).await {
            Ok(resolved) => {
                if let Some(stream_url) = resolved.stream_url {
                    self.inner
                        .stream_urls
                        .lock()
                        .await
                        .insert(url.to_string(), (stream_url.clone(), SystemTime::now()));
                    Some(stream_url)
                } else {
                    None
                }
            }
            Err(e) => {
                warn!("Error resolving stream URL for {}: {}", url, e);
                None
            }
        }
    }

    // ── audio presets ────────────────────────────────────────────────────────

    /// Select a named preset; hot-applies the filter chain when a primary
    /// stream is live, otherwise it takes effect on the next start.
    pub async fn apply_preset(&self, name: &str) -> bool {
        if !presets::is_valid(name) {
            warn!("Unknown audio preset: {}", name);
            return false;
        }
        let (channel, chain) = {
            let mut st = self.inner.state.lock().await;
            st.preset = name.to_string();
            (
                st.primary.as_ref().map(|s| s.channel.clone()),
                presets::filter_chain(&st.preset, st.loudness_normalization),
            )
        };
        if let Some(channel) = channel {
            channel.set_audio_filter(&chain).await;
        }
        info!("Audio preset set to: {}", name);
        true
    }

    pub async fn preset(&self) -> String {
        self.inner.state.lock().await.preset.clone()
    }

    pub async fn set_loudness_normalization(&self, enabled: bool) {
        let (channel, chain) = {
            let mut st = self.inner.state.lock().await;
            st.loudness_normalization = enabled;
            (
                st.primary.as_ref().map(|s| s.channel.clone()),
                presets::filter_chain(&st.preset, st.loudness_normalization),
            )
        };
        if let Some(channel) = channel {
            channel.set_audio_filter(&chain).await;
        }
    }

    // ── status ───────────────────────────────────────────────────────────────

    pub async fn status(&self) -> StreamStatus {
        self.inner.state.lock().await.status
    }

    async fn set_status(&self, status: StreamStatus) {
        let changed = {
            let mut st = self.inner.state.lock().await;
            let changed = st.status != status;
            st.status = status;
            changed
        };
        if changed {
            self.emit(EngineEvent::StatusChanged).await;
        }
    }

    async fn emit(&self, event: EngineEvent) {
        let _ = self.inner.events.send(event).await;
    }

    /// Fixed-interval status poll for one primary process generation.  Ends
    /// when the slot is replaced or the process exits.
    async fn poll_status(&self, gen: u64) {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            enum Step {
                Exited(Option<std::process::ExitStatus>, StreamStatus),
                Alive(ControlChannel),
                Done,
            }

            let step = {
                let mut st = self.inner.state.lock().await;
                match st.primary.as_mut() {
                    Some(slot) if slot.gen == gen => match slot.child.try_wait() {
                        Ok(Some(exit)) => {
                            let prev = st.status;
                            if prev == StreamStatus::Stopped {
                                Step::Done
                            } else {
                                let slot = st.primary.take().expect("slot present");
                                slot.channel.cleanup_socket();
                                Step::Exited(Some(exit), prev)
                            }
                        }
                        Ok(None) => Step::Alive(slot.channel.clone()),
                        Err(_) => Step::Done,
                    },
                    _ => Step::Done,
                }
            };

            match step {
                Step::Done => break,
                Step::Exited(exit, prev) => {
                    let clean = exit.map(|e| e.success()).unwrap_or(false);
                    if clean && prev == StreamStatus::Playing {
                        info!("Primary stream reached end of file");
                        self.set_status(StreamStatus::Stopped).await;
                        self.emit(EngineEvent::StreamEnded).await;
                    } else {
                        warn!("Player process exited unexpectedly");
                        self.set_status(StreamStatus::Error).await;
                    }
                    break;
                }
                Step::Alive(channel) => {
                    let paused = channel
                        .get_property("pause")
                        .await
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let buffering = channel
                        .get_property("paused-for-cache")
                        .await
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let idle = channel
                        .get_property("core-idle")
                        .await
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let has_position = channel
                        .get_property("time-pos")
                        .await
                        .and_then(|v| v.as_f64())
                        .map(|t| t > 0.0)
                        .unwrap_or(false);

                    let new_status = if paused || buffering || idle || !has_position {
                        StreamStatus::Loading
                    } else {
                        StreamStatus::Playing
                    };

                    let transition = {
                        let mut st = self.inner.state.lock().await;
                        match st.primary.as_ref() {
                            Some(slot) if slot.gen == gen => {
                                let prev = st.status;
                                st.status = new_status;
                                if prev != new_status {
                                    Some((prev, st.target_volume))
                                } else {
                                    None
                                }
                            }
                            _ => break,
                        }
                    };

                    if let Some((prev, volume)) = transition {
                        debug!("Stream status {:?} -> {:?}", prev, new_status);
                        if prev == StreamStatus::Loading && new_status == StreamStatus::Playing {
                            // The stream may have ignored volume commands
                            // while it wasn't accepting input yet.
                            channel.set_property("volume", json!(volume)).await;
                            self.ambience_out(Duration::from_millis(800)).await;
                        }
                        self.emit(EngineEvent::StatusChanged).await;
                    }
                }
            }
        }
    }

    /// Full teardown at daemon shutdown: stop the primary and, unlike every
    /// other path, actually terminate the ambience process.
    pub async fn shutdown(&self) {
        self.stop().await;
        let slot = self.inner.state.lock().await.ambience.take();
        if let Some(mut slot) = slot {
            let _ = slot.child.kill().await;
            let _ = slot.child.wait().await;
            slot.channel.cleanup_socket();
        }
        info!("Playback engine shut down");
    }
}

fn ambience_volume(volume: u8, static_percent: u8) -> f64 {
    volume as f64 * static_percent as f64 / 100.0
}

fn find_static_sound(sounds_dir: &std::path::Path) -> Option<PathBuf> {
    for ext in ["wav", "mp3", "ogg"] {
        let path = sounds_dir.join(format!("static.{}", ext));
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Linear volume ramp in discrete steps; stops early when the token is
/// cancelled by a superseding fade or switch.
async fn fade_ramp(
    channel: &ControlChannel,
    from: f64,
    to: f64,
    duration: Duration,
    cancel: &CancellationToken,
) {
    let step = duration / FADE_STEPS;
    for i in 1..=FADE_STEPS {
        if cancel.is_cancelled() {
            return;
        }
        let frac = i as f64 / FADE_STEPS as f64;
        let vol = (from + (to - from) * frac).max(0.0);
        channel.set_property("volume", json!(vol)).await;
        tokio::time::sleep(step).await;
    }
}

/// Quit and unlink any player sockets left behind by a previous run.
async fn sweep_orphan_sockets() {
    let prefixes = ["bakelite-mpv", "bakelite-static"];
    let Ok(entries) = std::fs::read_dir(std::env::temp_dir()) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".sock") || !prefixes.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        info!("Cleaning up orphaned player socket: {}", name);
        let channel = ControlChannel::new(entry.path());
        channel.quit().await;
        channel.cleanup_socket();
    }
}
