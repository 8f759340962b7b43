use serde::{Deserialize, Serialize};

/// Playback status of the primary stream slot as observed by the engine's
/// poll loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Stopped,
    Loading,
    Playing,
    Error,
}

/// Summary of the active pack for the request surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackSummary {
    pub id: String,
    pub name: String,
    pub station_count: usize,
}

/// Summary of the currently tuned station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSummary {
    pub id: String,
    pub name: String,
    pub index: usize,
}

/// Boot-time prefetch progress, present only while resolving the active pack.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrefetchProgress {
    pub total: usize,
    pub complete: usize,
}

/// Full externally visible state.  Consumers receive a bare change
/// notification and pull this snapshot; it carries everything the request
/// surface needs to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioSnapshot {
    pub pack: Option<PackSummary>,
    pub station: Option<StationSummary>,
    pub station_index: usize,
    pub volume: u8,
    pub status: StreamStatus,
    pub is_on: bool,
    pub static_audible: bool,
    pub audio_preset: String,
    pub prefetch: Option<PrefetchProgress>,
}
