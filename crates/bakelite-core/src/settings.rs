use serde::{Deserialize, Serialize};

/// User-facing runtime settings, persisted separately from the daemon config
/// so the request surface can edit them while the daemon runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Volume applied at startup (capped at max_volume).
    #[serde(default = "default_volume")]
    pub default_volume: u8,
    /// Hard volume ceiling, for speaker protection.
    #[serde(default = "default_max_volume")]
    pub max_volume: u8,
    /// Static overlay loudness as a percentage of the main volume.
    #[serde(default = "default_static_percent")]
    pub static_volume_percent: u8,
    #[serde(default)]
    pub loudness_normalization: bool,
    /// Start playing station 1 after boot-time prefetch completes.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
    #[serde(default = "default_preset")]
    pub audio_preset: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            max_volume: default_max_volume(),
            static_volume_percent: default_static_percent(),
            loudness_normalization: false,
            auto_start: default_auto_start(),
            audio_preset: default_preset(),
        }
    }
}

fn default_volume() -> u8 {
    40
}

fn default_max_volume() -> u8 {
    100
}

fn default_static_percent() -> u8 {
    60
}

fn default_auto_start() -> bool {
    true
}

fn default_preset() -> String {
    "flat".to_string()
}

impl Settings {
    /// Clamp fields into their valid ranges after an external edit.
    pub fn sanitize(&mut self) {
        self.max_volume = self.max_volume.clamp(1, 100);
        self.default_volume = self.default_volume.min(self.max_volume);
        self.static_volume_percent = self.static_volume_percent.min(100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_appliance() {
        let s = Settings::default();
        assert_eq!(s.default_volume, 40);
        assert_eq!(s.max_volume, 100);
        assert_eq!(s.static_volume_percent, 60);
        assert!(!s.loudness_normalization);
        assert!(s.auto_start);
        assert_eq!(s.audio_preset, "flat");
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut s = Settings {
            default_volume: 90,
            max_volume: 0,
            static_volume_percent: 200,
            ..Settings::default()
        };
        s.sanitize();
        assert_eq!(s.max_volume, 1);
        assert_eq!(s.default_volume, 1);
        assert_eq!(s.static_volume_percent, 100);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let s: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.default_volume, 40);
        assert!(s.auto_start);
    }
}
