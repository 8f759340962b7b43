//! Physical-control input boundary.
//!
//! Hardware readers (rotary encoders, buttons) live outside the daemon and
//! feed `InputEvent`s in; this module owns the mapping to controller
//! operations and the station-change debounce.  Volume events are never
//! debounced: a turning knob should track continuously.

use crate::controller::StationController;
use std::time::{Duration, Instant};
use tracing::debug;

/// Minimum gap between accepted station-class events.
pub const STATION_DEBOUNCE: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    StationNext,
    StationPrev,
    /// Reserved button on the tuning knob; accepted but currently unmapped.
    StationButton,
    VolumeUp,
    VolumeDown,
    PowerButton,
}

impl InputEvent {
    fn is_station_class(self) -> bool {
        matches!(
            self,
            InputEvent::StationNext | InputEvent::StationPrev | InputEvent::StationButton
        )
    }
}

/// Stateful debounce filter.  One instance per input source, owned by the
/// daemon loop.
pub struct InputFilter {
    last_station_event: Option<Instant>,
}

impl InputFilter {
    pub fn new() -> Self {
        Self {
            last_station_event: None,
        }
    }

    pub fn accept(&mut self, event: InputEvent) -> bool {
        self.accept_at(event, Instant::now())
    }

    /// Deterministic-clock variant of [`accept`].
    pub fn accept_at(&mut self, event: InputEvent, now: Instant) -> bool {
        if !event.is_station_class() {
            return true;
        }
        if let Some(last) = self.last_station_event {
            if now.duration_since(last) < STATION_DEBOUNCE {
                debug!("Debounced {:?}", event);
                return false;
            }
        }
        self.last_station_event = Some(now);
        true
    }
}

impl Default for InputFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Map one accepted input event onto the controller.
pub async fn dispatch(controller: &StationController, event: InputEvent) {
    match event {
        InputEvent::StationNext => controller.next_station().await,
        InputEvent::StationPrev => controller.previous_station().await,
        InputEvent::StationButton => {}
        InputEvent::VolumeUp => controller.change_volume(1).await,
        InputEvent::VolumeDown => controller.change_volume(-1).await,
        InputEvent::PowerButton => controller.toggle_power().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_station_event_passes() {
        let mut filter = InputFilter::new();
        assert!(filter.accept_at(InputEvent::StationNext, Instant::now()));
    }

    #[test]
    fn station_events_inside_the_window_are_dropped() {
        let mut filter = InputFilter::new();
        let t0 = Instant::now();
        assert!(filter.accept_at(InputEvent::StationNext, t0));
        assert!(!filter.accept_at(InputEvent::StationNext, t0 + Duration::from_millis(100)));
        assert!(!filter.accept_at(InputEvent::StationPrev, t0 + Duration::from_millis(700)));
        assert!(filter.accept_at(InputEvent::StationPrev, t0 + Duration::from_millis(800)));
    }

    #[test]
    fn volume_events_are_never_debounced() {
        let mut filter = InputFilter::new();
        let t0 = Instant::now();
        assert!(filter.accept_at(InputEvent::StationNext, t0));
        for i in 0..10 {
            let t = t0 + Duration::from_millis(i * 10);
            assert!(filter.accept_at(InputEvent::VolumeUp, t));
            assert!(filter.accept_at(InputEvent::VolumeDown, t));
        }
    }

    #[test]
    fn power_button_is_not_debounced_by_station_events() {
        let mut filter = InputFilter::new();
        let t0 = Instant::now();
        assert!(filter.accept_at(InputEvent::StationNext, t0));
        assert!(filter.accept_at(InputEvent::PowerButton, t0 + Duration::from_millis(10)));
    }

    #[test]
    fn debounce_window_restarts_on_each_accepted_event() {
        let mut filter = InputFilter::new();
        let t0 = Instant::now();
        assert!(filter.accept_at(InputEvent::StationNext, t0));
        let t1 = t0 + Duration::from_millis(800);
        assert!(filter.accept_at(InputEvent::StationNext, t1));
        // Window measured from t1, not t0.
        assert!(!filter.accept_at(InputEvent::StationNext, t1 + Duration::from_millis(400)));
    }
}
