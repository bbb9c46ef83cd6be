//! On-level reset.
//!
//! Lights should come back at their previous brightness after a power cut.
//! Devices occasionally lose that setting (firmware updates, re-pairing), so
//! whenever a light settles with any other `on_level` it is written back to
//! "previous".

use serde_json::Value;
use tokio::time::Instant;
use tracing::info;

use crate::engine::Command;
use crate::engine::History;
use crate::engine::OnLevel;
use crate::engine::Policy;

/// Recent on-levels kept per light; only the value at a closing deadline and
/// anything observed after it are ever needed.
const RECENT_ON_LEVELS: usize = 4;

/// Per-light state for on-level reset.
#[derive(Debug)]
pub struct OnLevelReset {
    recent: History<OnLevel>,
}

impl OnLevelReset {
    /// The most recently observed on-level.
    pub fn last(&self) -> Option<&OnLevel> {
        self.recent.latest()
    }
}

impl Policy for OnLevelReset {
    type Update = OnLevel;
    type Settings = ();
    const NAME: &'static str = "on_level";

    fn new(_: &()) -> Self {
        Self {
            recent: History::new(RECENT_ON_LEVELS),
        }
    }

    fn parse(payload: &Value) -> Option<OnLevel> {
        OnLevel::from_payload(payload)
    }

    fn observe(&mut self, device: &str, now: Instant, update: OnLevel) -> bool {
        if self.last() != Some(&update) {
            info!(device, on_level = %update, "Received on_level");
        }
        self.recent.insert(now, update);
        true
    }

    fn decide(&mut self, device: &str, deadline: Instant) -> Option<Command> {
        let last = self.recent.floor(deadline)?;
        if *last == OnLevel::Previous {
            return None;
        }

        info!(device, was = %last, "Resetting on_level to previous");
        Some(Command::SetOnLevel(OnLevel::Previous))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_non_previous_is_reset() {
        let now = Instant::now();
        let mut fixer = OnLevelReset::new(&());

        assert!(fixer.observe("test", now, OnLevel::Level(255)));
        assert_eq!(
            fixer.decide("test", now),
            Some(Command::SetOnLevel(OnLevel::Previous))
        );

        fixer.observe("test", now, OnLevel::Other("minimum".to_string()));
        assert_eq!(
            fixer.decide("test", now),
            Some(Command::SetOnLevel(OnLevel::Previous))
        );
    }

    #[test]
    fn test_previous_is_left_alone() {
        let now = Instant::now();
        let mut fixer = OnLevelReset::new(&());

        for _ in 0..3 {
            fixer.observe("test", now, OnLevel::Previous);
            assert_eq!(fixer.decide("test", now), None);
        }
    }

    #[test]
    fn test_decides_on_latest_value() {
        let now = Instant::now();
        let mut fixer = OnLevelReset::new(&());

        fixer.observe("test", now, OnLevel::Level(10));
        fixer.observe("test", now, OnLevel::Previous);
        assert_eq!(fixer.last(), Some(&OnLevel::Previous));
        assert_eq!(fixer.decide("test", now), None);
    }

    #[test]
    fn test_decision_ignores_updates_after_deadline() {
        let base = Instant::now();
        let deadline = base + Duration::from_secs(1);
        let mut fixer = OnLevelReset::new(&());

        fixer.observe("test", base, OnLevel::Previous);
        fixer.observe("test", deadline + Duration::from_millis(10), OnLevel::Level(40));
        assert_eq!(fixer.decide("test", deadline), None);

        let mut fixer = OnLevelReset::new(&());
        fixer.observe("test", base, OnLevel::Level(40));
        fixer.observe("test", deadline + Duration::from_millis(10), OnLevel::Previous);
        assert_eq!(
            fixer.decide("test", deadline),
            Some(Command::SetOnLevel(OnLevel::Previous))
        );
    }

    #[test]
    fn test_nothing_observed() {
        let mut fixer = OnLevelReset::new(&());
        assert_eq!(fixer.decide("test", Instant::now()), None);
    }
}
