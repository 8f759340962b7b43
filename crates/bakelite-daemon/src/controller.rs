//! Station controller: the authoritative selection state machine.
//!
//! Owns the catalog, the dial position, and the settings behind one async
//! mutex.  Selection changes apply under that lock and return promptly; the
//! resolve-and-start tail of a switch runs on a background task that
//! re-checks the switch epoch under the lock, so a stale start can never
//! override a newer selection and knob input is never queued behind the
//! resolver.  Playback status is the engine's claim about the stream; the
//! dial position here stays authoritative even while the stream errors.

use crate::player::{EngineConfig, PlaybackEngine};
use crate::resolver::needs_resolution;
use crate::timeline::VirtualTimeline;
use bakelite_core::catalog::{new_id, Catalog, Station};
use bakelite_core::settings::Settings;
use bakelite_core::state::{PackSummary, PrefetchProgress, RadioSnapshot, StationSummary};
use bakelite_core::store::Store;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Outbound notification.  Carries no payload: consumers pull a fresh
/// snapshot, so missed or coalesced events cannot leave them stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    StateChanged,
}

struct ControllerState {
    catalog: Catalog,
    settings: Settings,
    /// 1-based dial position; 0 is OFF.
    current_index: usize,
    /// Dial position before the radio went off, for volume-as-power restore.
    last_index: usize,
    /// Monotonic switch counter.
    epoch: u64,
    prefetch: Option<PrefetchProgress>,
}

pub struct StationController {
    /// Shared with the deferred switch tasks, which re-check the epoch under
    /// this lock before starting playback.
    state: Arc<Mutex<ControllerState>>,
    engine: PlaybackEngine,
    timeline: Arc<VirtualTimeline>,
    store: Store,
    events: broadcast::Sender<RadioEvent>,
}

impl StationController {
    pub fn new(engine: PlaybackEngine, store: Store) -> Self {
        let catalog = store.load_catalog();
        let settings = store.load_settings();
        let (events, _) = broadcast::channel(32);
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                catalog,
                settings,
                current_index: 0,
                last_index: 0,
                epoch: 0,
                prefetch: None,
            })),
            engine,
            timeline: Arc::new(VirtualTimeline::new()),
            store,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.events.subscribe()
    }

    fn notify(&self) {
        let _ = self.events.send(RadioEvent::StateChanged);
    }

    /// Boot sequence: push settings into the engine, seed the broadcast
    /// timelines, kick off the parallel duration prefetch for the active
    /// pack, then auto-start at station 1 if configured.
    pub async fn startup(self: &Arc<Self>) {
        let (settings, all_urls, prefetch_urls) = {
            let st = self.state.lock().await;
            let all: Vec<String> = st
                .catalog
                .packs
                .iter()
                .flat_map(|p| p.stations.iter().map(|s| s.url.clone()))
                .collect();
            let active: Vec<String> = st
                .catalog
                .active_pack()
                .map(|p| p.stations.iter().map(|s| s.url.clone()).collect())
                .unwrap_or_default();
            (st.settings.clone(), all, active)
        };

        self.engine
            .set_volume(settings.default_volume.min(settings.max_volume))
            .await;
        self.engine
            .set_static_percent(settings.static_volume_percent)
            .await;
        self.engine
            .set_loudness_normalization(settings.loudness_normalization)
            .await;
        self.engine.apply_preset(&settings.audio_preset).await;

        self.timeline.seed(all_urls.iter().map(String::as_str));

        let mut uncached = Vec::new();
        for url in prefetch_urls {
            if !self.engine.duration_cached(&url).await {
                uncached.push(url);
            }
        }
        if !uncached.is_empty() {
            self.spawn_prefetch(uncached, true);
        }

        if settings.auto_start {
            info!("Auto-starting playback at station 1");
            self.switch_to_station(1).await;
        }
        self.notify();
    }

    /// Resolve durations for `urls` in the background, surfacing progress in
    /// the snapshot.  Parallel at boot; sequential after a pack change so a
    /// large pack doesn't stampede the resolver mid-session.
    fn spawn_prefetch(self: &Arc<Self>, urls: Vec<String>, parallel: bool) {
        let ctrl = Arc::clone(self);
        tokio::spawn(async move {
            let total = urls.len();
            {
                let mut st = ctrl.state.lock().await;
                st.prefetch = Some(PrefetchProgress { total, complete: 0 });
            }
            ctrl.notify();
            info!("Prefetching durations for {} stations", total);

            if parallel {
                let mut set = tokio::task::JoinSet::new();
                for url in urls {
                    let engine = ctrl.engine.clone();
                    set.spawn(async move {
                        engine.duration_for(&url).await;
                    });
                }
                while set.join_next().await.is_some() {
                    ctrl.bump_prefetch().await;
                }
            } else {
                for url in urls {
                    ctrl.engine.duration_for(&url).await;
                    ctrl.bump_prefetch().await;
                }
            }

            ctrl.state.lock().await.prefetch = None;
            ctrl.notify();
            info!("Duration prefetch complete");
        });
    }

    async fn bump_prefetch(&self) {
        {
            let mut st = self.state.lock().await;
            if let Some(p) = st.prefetch.as_mut() {
                p.complete += 1;
            }
        }
        self.notify();
    }

    // ── tuning ───────────────────────────────────────────────────────────────

    /// Tune the dial.  0 is OFF; anything above the station count clamps to
    /// the last station.  Equal target is a no-op.  A valid switch retires
    /// the old stream into the crossfade reaper, brings static in, and
    /// returns; resolving and starting the new stream happens on a
    /// background task so a slow resolver never blocks the next command.
    pub async fn switch_to_station(&self, index: usize) {
        let mut st = self.state.lock().await;
        let count = st.catalog.station_count();

        if index > 0 && count == 0 {
            // Tuning into nothing: the no-signal cue, then silence.
            if st.current_index != 0 {
                st.current_index = 0;
            }
            st.epoch += 1;
            warn!("No stations in the active pack");
            self.engine.play_ambience_once().await;
            self.engine.stop().await;
            drop(st);
            self.notify();
            return;
        }

        let target = index.min(count);
        if target == st.current_index {
            return;
        }

        if target == 0 {
            st.current_index = 0;
            // Invalidate any in-flight switch task so it cannot start
            // playback after the radio went off.
            st.epoch += 1;
            self.engine.mute_ambience().await;
            self.engine.stop().await;
            info!("Radio off");
            drop(st);
            self.notify();
            return;
        }

        st.epoch += 1;
        st.current_index = target;
        st.last_index = target;
        let epoch = st.epoch;
        let station = st
            .catalog
            .station_at(target)
            .cloned()
            .expect("clamped index is in range");

        debug!("Switch epoch {} -> station {}", epoch, target);

        // Static first so the gap between streams is never dead air; the
        // retired stream fades underneath it and is reaped on its own clock.
        let retired = self.engine.retire_primary().await;
        self.engine.ambience_in().await;
        if let Some(retired) = retired {
            retired.fade_out_and_reap();
        }

        drop(st);
        self.notify();

        // Resolution can take seconds on a cache miss.  It runs off the
        // lock; the epoch re-check under the lock makes a superseded task
        // stand down instead of clobbering the newer selection.
        let engine = self.engine.clone();
        let timeline = Arc::clone(&self.timeline);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        tokio::spawn(async move {
            let duration = engine.duration_for(&station.url).await;
            if needs_resolution(&station.url) {
                // Refresh a TTL-stale stream URL now, so start() below hits
                // the cache instead of resolving under the lock.
                engine.stream_url_for(&station.url).await;
            }
            let st = state.lock().await;
            if st.epoch != epoch {
                debug!("Switch epoch {} superseded, standing down", epoch);
                return;
            }
            let position = timeline.position_for(&station.url, duration);
            engine.start(&station.url, position, false).await;
            info!("Tuned to station {}: {}", target, station.name);
            drop(st);
            let _ = events.send(RadioEvent::StateChanged);
        });
    }

    /// Step to the next dial position, wrapping from the last back to 1.
    /// Ignored while the radio is off.
    pub async fn next_station(&self) {
        let target = {
            let st = self.state.lock().await;
            let count = st.catalog.station_count();
            if st.current_index == 0 || count == 0 {
                return;
            }
            if st.current_index >= count {
                1
            } else {
                st.current_index + 1
            }
        };
        self.switch_to_station(target).await;
    }

    /// Step to the previous dial position, wrapping from 1 to the last.
    pub async fn previous_station(&self) {
        let target = {
            let st = self.state.lock().await;
            let count = st.catalog.station_count();
            if st.current_index == 0 || count == 0 {
                return;
            }
            if st.current_index <= 1 {
                count
            } else {
                st.current_index - 1
            }
        };
        self.switch_to_station(target).await;
    }

    pub async fn toggle_power(&self) {
        let target = {
            let st = self.state.lock().await;
            if st.current_index == 0 {
                st.last_index.max(1)
            } else {
                0
            }
        };
        self.switch_to_station(target).await;
    }

    // ── volume ───────────────────────────────────────────────────────────────

    /// Volume doubles as the power switch: turning it to 0 while on
    /// remembers the station and switches off; raising it from 0 while off
    /// restores that station.
    pub async fn set_volume(&self, level: u8) {
        let (clamped, action) = {
            let mut st = self.state.lock().await;
            let clamped = level.min(st.settings.max_volume);
            let action = if clamped == 0 && st.current_index > 0 {
                st.last_index = st.current_index;
                Some(0)
            } else if clamped > 0 && st.current_index == 0 && st.catalog.station_count() > 0 {
                Some(st.last_index.max(1))
            } else {
                None
            };
            (clamped, action)
        };

        self.engine.set_volume(clamped).await;
        match action {
            Some(target) => self.switch_to_station(target).await,
            None => self.notify(),
        }
    }

    pub async fn change_volume(&self, delta: i8) {
        let current = self.engine.volume().await as i16;
        let level = (current + delta as i16).clamp(0, 100) as u8;
        self.set_volume(level).await;
    }

    // ── stream lifecycle ─────────────────────────────────────────────────────

    /// A finite stream ran out: restart it from the top so the virtual
    /// broadcast keeps looping.  Live streams ending is an upstream outage
    /// we don't paper over.
    pub async fn on_stream_ended(&self) {
        let station = {
            let st = self.state.lock().await;
            if st.current_index == 0 {
                return;
            }
            st.catalog.station_at(st.current_index).cloned()
        };
        let Some(station) = station else { return };

        match self.engine.duration_for(&station.url).await {
            Some(_) => {
                info!("Stream ended, looping {} from the start", station.name);
                self.engine.start(&station.url, 0.0, true).await;
            }
            None => {
                warn!("Live stream {} ended; not restarting", station.name);
            }
        }
        self.notify();
    }

    /// Entry point for engine events arriving through the daemon loop.
    pub async fn handle_engine_event(&self, event: crate::player::EngineEvent) {
        match event {
            crate::player::EngineEvent::StreamEnded => self.on_stream_ended().await,
            crate::player::EngineEvent::StatusChanged => self.notify(),
        }
    }

    // ── catalog mutations ────────────────────────────────────────────────────

    pub async fn create_pack(&self, name: &str) -> String {
        let id = new_id();
        {
            let mut st = self.state.lock().await;
            st.catalog.packs.push(bakelite_core::catalog::Pack {
                id: id.clone(),
                name: name.to_string(),
                stations: Vec::new(),
            });
            if st.catalog.active_pack_id.is_none() {
                st.catalog.active_pack_id = Some(id.clone());
            }
            self.persist_catalog(&st);
        }
        info!("Created pack: {}", name);
        self.notify();
        id
    }

    pub async fn update_pack(&self, pack_id: &str, name: &str) -> bool {
        let found = {
            let mut st = self.state.lock().await;
            let found = match st.catalog.pack_mut(pack_id) {
                Some(pack) => {
                    pack.name = name.to_string();
                    true
                }
                None => false,
            };
            if found {
                self.persist_catalog(&st);
            }
            found
        };
        if found {
            self.notify();
        }
        found
    }

    pub async fn delete_pack(&self, pack_id: &str) -> bool {
        let (found, was_active) = {
            let mut st = self.state.lock().await;
            let before = st.catalog.packs.len();
            let was_active = st.catalog.active_pack_id.as_deref() == Some(pack_id);
            st.catalog.packs.retain(|p| p.id != pack_id);
            let found = st.catalog.packs.len() != before;
            if found {
                st.catalog.validate_active_pack();
                self.persist_catalog(&st);
            }
            (found, found && was_active)
        };
        if was_active {
            // The dial was pointing into a pack that no longer exists.
            self.switch_to_station(0).await;
        }
        if found {
            info!("Deleted pack {}", pack_id);
            self.notify();
        }
        found
    }

    /// Activate a pack.  Playing resumes at station 1 of the new pack; an
    /// off radio stays off.  Durations for the new pack prefetch in the
    /// background.
    pub async fn set_active_pack(self: &Arc<Self>, pack_id: &str) -> bool {
        let (was_on, urls) = {
            let mut st = self.state.lock().await;
            if st.catalog.pack(pack_id).is_none() {
                return false;
            }
            st.catalog.active_pack_id = Some(pack_id.to_string());
            let was_on = st.current_index > 0;
            // Reset so the upcoming switch to 1 is never an equal-index no-op.
            st.current_index = 0;
            st.last_index = 0;
            let urls: Vec<String> = st
                .catalog
                .active_pack()
                .map(|p| p.stations.iter().map(|s| s.url.clone()).collect())
                .unwrap_or_default();
            self.persist_catalog(&st);
            (was_on, urls)
        };
        info!("Active pack set to {}", pack_id);

        self.timeline.seed(urls.iter().map(String::as_str));
        let mut uncached = Vec::new();
        for url in urls {
            if !self.engine.duration_cached(&url).await {
                uncached.push(url);
            }
        }
        if !uncached.is_empty() {
            self.spawn_prefetch(uncached, false);
        }

        if was_on {
            self.switch_to_station(1).await;
        } else {
            self.notify();
        }
        true
    }

    /// Cycle to the next pack in catalog order, wrapping at the end.
    pub async fn next_pack(self: &Arc<Self>) {
        let next_id = {
            let st = self.state.lock().await;
            if st.catalog.packs.len() < 2 {
                return;
            }
            let pos = st
                .catalog
                .active_pack_id
                .as_deref()
                .and_then(|id| st.catalog.packs.iter().position(|p| p.id == id))
                .unwrap_or(0);
            let next = (pos + 1) % st.catalog.packs.len();
            st.catalog.packs[next].id.clone()
        };
        self.set_active_pack(&next_id).await;
    }

    pub async fn add_station(&self, pack_id: &str, name: &str, url: &str) -> Option<String> {
        let id = {
            let mut st = self.state.lock().await;
            let pack = st.catalog.pack_mut(pack_id)?;
            let id = new_id();
            pack.stations.push(Station {
                id: id.clone(),
                name: name.to_string(),
                url: url.to_string(),
            });
            self.persist_catalog(&st);
            id
        };
        info!("Added station {} to pack {}", name, pack_id);
        self.notify();
        Some(id)
    }

    pub async fn update_station(
        &self,
        pack_id: &str,
        station_id: &str,
        name: &str,
        url: &str,
    ) -> bool {
        let found = {
            let mut st = self.state.lock().await;
            let found = st
                .catalog
                .pack_mut(pack_id)
                .and_then(|p| p.stations.iter_mut().find(|s| s.id == station_id))
                .map(|s| {
                    s.name = name.to_string();
                    s.url = url.to_string();
                })
                .is_some();
            if found {
                self.persist_catalog(&st);
            }
            found
        };
        if found {
            self.notify();
        }
        found
    }

    pub async fn delete_station(&self, pack_id: &str, station_id: &str) -> bool {
        let (found, reselect) = {
            let mut st = self.state.lock().await;
            let Some(pack) = st.catalog.pack_mut(pack_id) else {
                return false;
            };
            let before = pack.stations.len();
            pack.stations.retain(|s| s.id != station_id);
            let found = pack.stations.len() != before;
            if !found {
                return false;
            }
            self.persist_catalog(&st);
            // Dial past the end of a shrunken active pack: re-clamp.
            let count = st.catalog.station_count();
            let reselect = if st.current_index > count {
                Some(count)
            } else {
                None
            };
            (found, reselect)
        };
        if let Some(target) = reselect {
            self.switch_to_station(target).await;
        }
        info!("Deleted station {} from pack {}", station_id, pack_id);
        self.notify();
        found
    }

    pub async fn reorder_stations(&self, pack_id: &str, station_ids: &[String]) -> bool {
        let found = {
            let mut st = self.state.lock().await;
            let found = match st.catalog.pack_mut(pack_id) {
                Some(pack) => {
                    pack.reorder(station_ids);
                    true
                }
                None => false,
            };
            if found {
                self.persist_catalog(&st);
            }
            found
        };
        if found {
            self.notify();
        }
        found
    }

    // ── settings ─────────────────────────────────────────────────────────────

    /// Replace the settings wholesale, forwarding each audio-facing field to
    /// the engine.  Lowering the volume cap clamps the live volume.
    pub async fn update_settings(&self, mut settings: Settings) {
        settings.sanitize();

        let live = self.engine.volume().await;
        if live > settings.max_volume {
            self.engine.set_volume(settings.max_volume).await;
        }
        self.engine
            .set_static_percent(settings.static_volume_percent)
            .await;
        self.engine
            .set_loudness_normalization(settings.loudness_normalization)
            .await;
        self.engine.apply_preset(&settings.audio_preset).await;

        {
            let mut st = self.state.lock().await;
            st.settings = settings;
            if let Err(e) = self.store.save_settings(&st.settings) {
                warn!("Failed to persist settings: {}", e);
            }
        }
        info!("Settings updated");
        self.notify();
    }

    pub async fn set_preset(&self, name: &str) -> bool {
        if !self.engine.apply_preset(name).await {
            return false;
        }
        {
            let mut st = self.state.lock().await;
            st.settings.audio_preset = name.to_string();
            if let Err(e) = self.store.save_settings(&st.settings) {
                warn!("Failed to persist settings: {}", e);
            }
        }
        self.notify();
        true
    }

    pub async fn settings(&self) -> Settings {
        self.state.lock().await.settings.clone()
    }

    // ── read surface ─────────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> RadioSnapshot {
        let (pack, station, index, prefetch) = {
            let st = self.state.lock().await;
            let pack = st.catalog.active_pack().map(|p| PackSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                station_count: p.stations.len(),
            });
            let station = st.catalog.station_at(st.current_index).map(|s| StationSummary {
                id: s.id.clone(),
                name: s.name.clone(),
                index: st.current_index,
            });
            (pack, station, st.current_index, st.prefetch.clone())
        };
        RadioSnapshot {
            pack,
            station,
            station_index: index,
            volume: self.engine.volume().await,
            status: self.engine.status().await,
            is_on: index > 0,
            static_audible: self.engine.static_audible().await,
            audio_preset: self.engine.preset().await,
            prefetch,
        }
    }

    pub async fn current_index(&self) -> usize {
        self.state.lock().await.current_index
    }

    pub async fn catalog(&self) -> Catalog {
        self.state.lock().await.catalog.clone()
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
        info!("Controller shut down");
    }

    fn persist_catalog(&self, st: &ControllerState) {
        if let Err(e) = self.store.save_catalog(&st.catalog) {
            warn!("Failed to persist catalog: {}", e);
        }
    }
}

/// Build the engine + controller pair the daemon runs.
pub async fn build(
    cfg: EngineConfig,
    resolver: Arc<dyn crate::resolver::StreamResolver>,
    store: Store,
    engine_events: tokio::sync::mpsc::Sender<crate::player::EngineEvent>,
) -> Arc<StationController> {
    let engine = PlaybackEngine::new(cfg, resolver, store.clone(), engine_events).await;
    Arc::new(StationController::new(engine, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ResolveError, ResolveFuture, ResolvedStream, StreamResolver};
    use bakelite_core::catalog::Pack;
    use bakelite_core::state::StreamStatus;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubResolver {
        calls: AtomicUsize,
    }

    impl StubResolver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StreamResolver for StubResolver {
        fn resolve<'a>(&'a self, url: &'a str) -> ResolveFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let live = url.contains("live");
            Box::pin(async move {
                Ok::<_, ResolveError>(ResolvedStream {
                    is_live: live,
                    duration: if live { None } else { Some(300.0) },
                    stream_url: None,
                })
            })
        }
    }

    fn seeded_catalog(urls: &[&str]) -> Catalog {
        Catalog {
            packs: vec![Pack {
                id: "p1".into(),
                name: "Pack One".into(),
                stations: urls
                    .iter()
                    .enumerate()
                    .map(|(i, url)| Station {
                        id: format!("s{}", i + 1),
                        name: format!("Station {}", i + 1),
                        url: url.to_string(),
                    })
                    .collect(),
            }],
            active_pack_id: Some("p1".into()),
        }
    }

    async fn controller_with_resolver(
        tag: &str,
        catalog: Catalog,
        resolver: Arc<dyn StreamResolver>,
    ) -> Arc<StationController> {
        let dir = std::env::temp_dir().join(format!(
            "bakelite-ctrl-test-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let store = Store::new(dir);
        store.save_catalog(&catalog).unwrap();

        let (tx, _rx) = tokio::sync::mpsc::channel(64);
        let engine = PlaybackEngine::new(
            EngineConfig {
                // Launch always fails; selection and cache behavior is what
                // these tests observe.
                player_binary: Some(PathBuf::from("/nonexistent/no-such-player")),
                sounds_dir: store.data_dir().join("sounds"),
            },
            resolver,
            store.clone(),
            tx,
        )
        .await;
        engine.set_volume(40).await;
        Arc::new(StationController::new(engine, store))
    }

    async fn test_controller(
        tag: &str,
        catalog: Catalog,
    ) -> (Arc<StationController>, Arc<StubResolver>) {
        let resolver = StubResolver::new();
        let ctrl = controller_with_resolver(tag, catalog, resolver.clone()).await;
        (ctrl, resolver)
    }

    /// Let spawned switch tails run to completion.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn out_of_range_index_clamps_to_last_station() {
        let (ctrl, _) = test_controller(
            "clamp",
            seeded_catalog(&["https://a.example/s", "https://b.example/s"]),
        )
        .await;
        ctrl.switch_to_station(99).await;
        assert_eq!(ctrl.current_index().await, 2);
    }

    #[tokio::test]
    async fn switching_to_zero_turns_off() {
        let (ctrl, _) = test_controller("off", seeded_catalog(&["https://a.example/s"])).await;
        ctrl.switch_to_station(1).await;
        assert_eq!(ctrl.current_index().await, 1);
        ctrl.switch_to_station(0).await;
        assert_eq!(ctrl.current_index().await, 0);
        assert!(!ctrl.snapshot().await.is_on);
    }

    #[tokio::test]
    async fn volume_zero_acts_as_power_off_and_restores() {
        let (ctrl, _) = test_controller(
            "vol-power",
            seeded_catalog(&["https://a.example/s", "https://b.example/s"]),
        )
        .await;
        ctrl.switch_to_station(2).await;

        ctrl.set_volume(0).await;
        assert_eq!(ctrl.current_index().await, 0);

        ctrl.set_volume(25).await;
        assert_eq!(ctrl.current_index().await, 2);
        assert_eq!(ctrl.snapshot().await.volume, 25);
    }

    #[tokio::test]
    async fn next_and_previous_wrap_around() {
        let (ctrl, _) = test_controller(
            "wrap",
            seeded_catalog(&[
                "https://a.example/s",
                "https://b.example/s",
                "https://c.example/s",
            ]),
        )
        .await;

        // Ignored while off.
        ctrl.next_station().await;
        assert_eq!(ctrl.current_index().await, 0);

        ctrl.switch_to_station(3).await;
        ctrl.next_station().await;
        assert_eq!(ctrl.current_index().await, 1);
        ctrl.previous_station().await;
        assert_eq!(ctrl.current_index().await, 3);
    }

    #[tokio::test]
    async fn toggle_power_remembers_the_station() {
        let (ctrl, _) = test_controller(
            "toggle",
            seeded_catalog(&["https://a.example/s", "https://b.example/s"]),
        )
        .await;
        ctrl.switch_to_station(2).await;
        ctrl.toggle_power().await;
        assert_eq!(ctrl.current_index().await, 0);
        ctrl.toggle_power().await;
        assert_eq!(ctrl.current_index().await, 2);
    }

    #[tokio::test]
    async fn rapid_switching_lands_on_the_last_target() {
        let (ctrl, resolver) = test_controller(
            "rapid",
            seeded_catalog(&[
                "https://a.example/s",
                "https://b.example/s",
                "https://c.example/s",
            ]),
        )
        .await;
        for target in [1, 2, 3, 1, 2] {
            ctrl.switch_to_station(target).await;
        }
        assert_eq!(ctrl.current_index().await, 2);
        settle().await;
        // Three distinct urls, each resolved exactly once despite five
        // switches.
        assert_eq!(resolver.call_count(), 3);
        assert_eq!(ctrl.current_index().await, 2);
    }

    #[tokio::test]
    async fn live_stream_ending_does_not_restart_or_re_resolve() {
        let (ctrl, resolver) =
            test_controller("live-eof", seeded_catalog(&["https://a.example/live"])).await;
        ctrl.switch_to_station(1).await;
        settle().await;
        let calls = resolver.call_count();

        ctrl.on_stream_ended().await;
        assert_eq!(resolver.call_count(), calls);
        // Nothing restarted: launch failure path left the engine in Error,
        // and a restart attempt would have flipped it through Loading.
        assert_eq!(ctrl.snapshot().await.status, StreamStatus::Error);
        assert_eq!(ctrl.current_index().await, 1);
    }

    #[tokio::test]
    async fn deleting_stations_keeps_the_dial_valid() {
        let (ctrl, _) = test_controller(
            "delete",
            seeded_catalog(&["https://a.example/s", "https://b.example/s"]),
        )
        .await;
        ctrl.switch_to_station(2).await;

        assert!(ctrl.delete_station("p1", "s2").await);
        assert_eq!(ctrl.current_index().await, 1);

        assert!(ctrl.delete_station("p1", "s1").await);
        assert_eq!(ctrl.current_index().await, 0);
        assert!(!ctrl.snapshot().await.is_on);
    }

    #[tokio::test]
    async fn empty_pack_switch_goes_silent() {
        let (ctrl, _) = test_controller("empty", seeded_catalog(&[])).await;
        ctrl.switch_to_station(1).await;
        assert_eq!(ctrl.current_index().await, 0);
    }

    #[tokio::test]
    async fn pack_change_restarts_at_station_one_when_on() {
        let (ctrl, _) = test_controller(
            "pack-change",
            seeded_catalog(&["https://a.example/s", "https://b.example/s"]),
        )
        .await;
        ctrl.create_pack("Second").await;
        let second_id = ctrl.catalog().await.packs[1].id.clone();
        ctrl.add_station(&second_id, "Lone", "https://x.example/s")
            .await
            .unwrap();

        ctrl.switch_to_station(2).await;
        assert!(ctrl.set_active_pack(&second_id).await);
        assert_eq!(ctrl.current_index().await, 1);

        // Off radio stays off across a pack change.
        ctrl.switch_to_station(0).await;
        assert!(ctrl.set_active_pack("p1").await);
        assert_eq!(ctrl.current_index().await, 0);
    }

    #[tokio::test]
    async fn next_pack_cycles_with_wraparound() {
        let (ctrl, _) = test_controller("next-pack", seeded_catalog(&["https://a.example/s"])).await;
        ctrl.create_pack("Second").await;
        let ids: Vec<String> = ctrl.catalog().await.packs.iter().map(|p| p.id.clone()).collect();

        ctrl.next_pack().await;
        assert_eq!(ctrl.catalog().await.active_pack_id.as_ref(), Some(&ids[1]));
        ctrl.next_pack().await;
        assert_eq!(ctrl.catalog().await.active_pack_id.as_ref(), Some(&ids[0]));
    }

    #[tokio::test]
    async fn deleting_the_active_pack_turns_off_and_falls_back() {
        let (ctrl, _) =
            test_controller("delete-pack", seeded_catalog(&["https://a.example/s"])).await;
        ctrl.create_pack("Backup").await;
        ctrl.switch_to_station(1).await;

        assert!(ctrl.delete_pack("p1").await);
        assert_eq!(ctrl.current_index().await, 0);
        let catalog = ctrl.catalog().await;
        assert_eq!(catalog.packs.len(), 1);
        assert_eq!(
            catalog.active_pack_id.as_deref(),
            Some(catalog.packs[0].id.as_str())
        );
    }

    #[tokio::test]
    async fn lowering_max_volume_clamps_live_volume() {
        let (ctrl, _) = test_controller("settings", seeded_catalog(&["https://a.example/s"])).await;
        ctrl.set_volume(80).await;

        let mut settings = ctrl.settings().await;
        settings.max_volume = 50;
        ctrl.update_settings(settings).await;

        assert_eq!(ctrl.snapshot().await.volume, 50);
        // Further requests above the new cap clamp too.
        ctrl.set_volume(90).await;
        assert_eq!(ctrl.snapshot().await.volume, 50);
    }

    #[tokio::test]
    async fn snapshot_reflects_selection() {
        let (ctrl, _) = test_controller(
            "snapshot",
            seeded_catalog(&["https://a.example/s", "https://b.example/s"]),
        )
        .await;
        ctrl.switch_to_station(2).await;
        let snap = ctrl.snapshot().await;
        assert!(snap.is_on);
        assert_eq!(snap.station_index, 2);
        assert_eq!(snap.station.as_ref().unwrap().name, "Station 2");
        assert_eq!(snap.pack.as_ref().unwrap().station_count, 2);
    }

    #[tokio::test]
    async fn notifications_fire_on_state_changes() {
        let (ctrl, _) = test_controller("notify", seeded_catalog(&["https://a.example/s"])).await;
        let mut rx = ctrl.subscribe();
        ctrl.switch_to_station(1).await;
        assert_eq!(rx.recv().await.unwrap(), RadioEvent::StateChanged);
    }

    /// Resolves after a fixed delay, standing in for a slow yt-dlp run.
    struct SlowResolver {
        delay: Duration,
    }

    impl StreamResolver for SlowResolver {
        fn resolve<'a>(&'a self, _url: &'a str) -> ResolveFuture<'a> {
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok::<_, ResolveError>(ResolvedStream {
                    is_live: false,
                    duration: Some(300.0),
                    stream_url: None,
                })
            })
        }
    }

    fn slow_resolver() -> Arc<SlowResolver> {
        Arc::new(SlowResolver {
            delay: Duration::from_millis(200),
        })
    }

    #[tokio::test]
    async fn commands_are_not_queued_behind_a_slow_resolver() {
        let ctrl = controller_with_resolver(
            "slow-switch",
            seeded_catalog(&["https://a.example/s"]),
            slow_resolver(),
        )
        .await;

        let begin = std::time::Instant::now();
        ctrl.switch_to_station(1).await;
        assert!(begin.elapsed() < Duration::from_millis(100));
        assert_eq!(ctrl.current_index().await, 1);

        // Volume lands immediately while the resolution is still in flight.
        let begin = std::time::Instant::now();
        ctrl.set_volume(55).await;
        assert!(begin.elapsed() < Duration::from_millis(100));
        assert_eq!(ctrl.snapshot().await.volume, 55);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(ctrl.current_index().await, 1);
    }

    #[tokio::test]
    async fn superseded_switch_keeps_the_newest_selection() {
        let ctrl = controller_with_resolver(
            "slow-supersede",
            seeded_catalog(&["https://a.example/s", "https://b.example/s"]),
            slow_resolver(),
        )
        .await;

        ctrl.switch_to_station(1).await;
        ctrl.switch_to_station(2).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ctrl.current_index().await, 2);
        assert_eq!(ctrl.snapshot().await.station.unwrap().index, 2);
    }

    #[tokio::test]
    async fn power_off_cancels_an_in_flight_switch() {
        let ctrl = controller_with_resolver(
            "slow-off",
            seeded_catalog(&["https://a.example/s"]),
            slow_resolver(),
        )
        .await;

        ctrl.switch_to_station(1).await;
        ctrl.switch_to_station(0).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        // The stale resolution must not start playback on an off radio.
        assert_eq!(ctrl.current_index().await, 0);
        assert_eq!(ctrl.snapshot().await.status, StreamStatus::Stopped);
    }
}
