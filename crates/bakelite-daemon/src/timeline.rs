//! Virtual broadcast timeline.
//!
//! Every station gets a synthetic "broadcast start" instant in the past.
//! Tuning in to a finite-length source then lands wherever a perpetually
//! looping broadcast of it would currently be, instead of restarting at 0.
//! Start times live only in memory: each daemon run reseeds them, so the
//! schedule resets per boot but stays internally consistent for the run.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const DAY_SECS: f64 = 24.0 * 60.0 * 60.0;

pub struct VirtualTimeline {
    /// url → epoch seconds of the synthetic broadcast start.
    starts: Mutex<HashMap<String, f64>>,
}

fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl VirtualTimeline {
    pub fn new() -> Self {
        Self {
            starts: Mutex::new(HashMap::new()),
        }
    }

    /// Seed start times for every known station: a uniformly random instant
    /// up to 24h in the past.  Already-seeded urls keep their start.
    pub fn seed<'a>(&self, urls: impl IntoIterator<Item = &'a str>) {
        let now = epoch_now();
        let mut rng = rand::thread_rng();
        let mut starts = self.starts.lock().unwrap();
        for url in urls {
            starts
                .entry(url.to_string())
                .or_insert_with(|| now - rng.gen_range(0.0..DAY_SECS));
        }
    }

    /// Position in seconds where playback of `url` should resume.  Live and
    /// unknown-duration sources always join at the live edge (0).
    pub fn position_for(&self, url: &str, duration: Option<f64>) -> f64 {
        self.position_at(url, duration, epoch_now())
    }

    /// Deterministic variant of [`position_for`] used by tests and by the
    /// simulated-clock paths.
    pub fn position_at(&self, url: &str, duration: Option<f64>, now: f64) -> f64 {
        let duration = match duration {
            Some(d) if d > 0.0 => d,
            _ => return 0.0,
        };

        let mut starts = self.starts.lock().unwrap();
        let start = *starts.entry(url.to_string()).or_insert_with(|| {
            // Stations added after startup: seed within one loop of the track.
            now - rand::thread_rng().gen_range(0.0..duration)
        });

        let elapsed = (now - start).max(0.0);
        elapsed % duration
    }
}

impl Default for VirtualTimeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/show";

    #[test]
    fn live_sources_always_join_at_zero() {
        let tl = VirtualTimeline::new();
        assert_eq!(tl.position_at(URL, None, 1_000_000.0), 0.0);
        assert_eq!(tl.position_at(URL, None, 2_000_000.0), 0.0);
        assert_eq!(tl.position_at(URL, Some(0.0), 1_000.0), 0.0);
    }

    #[test]
    fn position_is_always_within_duration() {
        let tl = VirtualTimeline::new();
        tl.seed([URL].into_iter());
        for i in 0..50 {
            let now = epoch_now() + i as f64 * 37.0;
            let pos = tl.position_at(URL, Some(300.0), now);
            assert!((0.0..300.0).contains(&pos), "position {} out of range", pos);
        }
    }

    #[test]
    fn elapsed_time_advances_position_modulo_duration() {
        let tl = VirtualTimeline::new();
        let now = 1_700_000_000.0;
        let duration = 300.0;
        let p0 = tl.position_at(URL, Some(duration), now);
        let p1 = tl.position_at(URL, Some(duration), now + 125.0);
        let delta = (p1 - p0).rem_euclid(duration);
        assert!((delta - 125.0).abs() < 1e-6);
    }

    #[test]
    fn finite_station_wraps_like_a_looping_broadcast() {
        // Pack scenario from the design notes: A(300s), tune in, wait 305s.
        let tl = VirtualTimeline::new();
        let now = 1_700_000_000.0;
        let p0 = tl.position_at("A", Some(300.0), now);
        let p1 = tl.position_at("A", Some(300.0), now + 305.0);
        let expected = (p0 + 305.0) % 300.0;
        assert!((p1 - expected).abs() < 1e-6);
        // Live station B reports 0 regardless of elapsed time.
        assert_eq!(tl.position_at("B", None, now + 9999.0), 0.0);
    }

    #[test]
    fn seed_does_not_reseed_known_urls() {
        let tl = VirtualTimeline::new();
        let now = 1_700_000_000.0;
        let p0 = tl.position_at(URL, Some(600.0), now);
        tl.seed([URL].into_iter());
        let p1 = tl.position_at(URL, Some(600.0), now);
        assert!((p1 - p0).abs() < 1e-6);
    }
}
