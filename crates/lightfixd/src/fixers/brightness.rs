//! Brightness rollback.
//!
//! Some bulbs end a dimming transition at brightness 1 (or 0) while still
//! reporting `ON`, which leaves them visually off. Once such a light settles
//! the fixer restores the brightness it had before.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::info;

use crate::engine::Command;
use crate::engine::History;
use crate::engine::LightState;
use crate::engine::Policy;
use crate::engine::DEFAULT_HISTORY_SIZE;

/// Brightness used when history holds nothing usable.
pub const FALLBACK_BRIGHTNESS: u8 = 255;

/// Brightness at or below which an "on" light counts as broken.
const MIN_USABLE_BRIGHTNESS: u8 = 1;

/// Distance between probes for [`RollbackStrategy::Step`].
const STEP: Duration = Duration::from_secs(1);

/// How the replacement brightness is chosen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RollbackStrategy {
    /// Brightest "on" state seen during the last `lookback` of on-time.
    #[default]
    Windowed,
    /// Most recent usable state, probing history at one second steps.
    Step,
}

#[derive(Debug, Clone)]
pub struct BrightnessSettings {
    /// Snapshots retained per light.
    pub history_size: usize,

    /// Powered-on time to look back over with [`RollbackStrategy::Windowed`].
    pub lookback: Duration,

    pub strategy: RollbackStrategy,
}

impl Default for BrightnessSettings {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            lookback: Duration::from_secs(10),
            strategy: RollbackStrategy::default(),
        }
    }
}

/// Per-light state for brightness rollback.
#[derive(Debug)]
pub struct BrightnessRollback {
    history: History<LightState>,
    settings: BrightnessSettings,
}

impl BrightnessRollback {
    pub fn history(&self) -> &History<LightState> {
        &self.history
    }

    /// Brightness to restore, given the history up to `now`.
    ///
    /// Always in `2..=255`.
    pub fn replacement(&self, now: Instant) -> u8 {
        let found = match self.settings.strategy {
            RollbackStrategy::Windowed => self.windowed_max(now),
            RollbackStrategy::Step => self.step_back(now),
        };
        found.unwrap_or(FALLBACK_BRIGHTNESS)
    }

    fn windowed_max(&self, now: Instant) -> Option<u8> {
        let mut on_time = Duration::ZERO;
        let mut until = now;
        let mut best: Option<u8> = None;

        for (at, state) in self.history.iter_desc(now) {
            if state.on {
                on_time += until.saturating_duration_since(at);
                if state.brightness > MIN_USABLE_BRIGHTNESS {
                    best = best.max(Some(state.brightness));
                }
            }
            until = at;

            if on_time >= self.settings.lookback {
                break;
            }
        }

        best
    }

    fn step_back(&self, now: Instant) -> Option<u8> {
        let mut at = now.checked_sub(STEP)?;
        loop {
            let (key, state) = self.history.floor_entry(at)?;
            if state.brightness > MIN_USABLE_BRIGHTNESS {
                return Some(state.brightness);
            }
            // Every probe down to `key` lands on this same entry; go straight
            // to the first probe below it.
            let probes = at.duration_since(key).as_nanos() / STEP.as_nanos() + 1;
            let skip = u64::try_from(probes * STEP.as_nanos()).ok()?;
            at = at.checked_sub(Duration::from_nanos(skip))?;
        }
    }
}

impl Policy for BrightnessRollback {
    type Update = LightState;
    type Settings = BrightnessSettings;
    const NAME: &'static str = "brightness";

    fn new(settings: &BrightnessSettings) -> Self {
        Self {
            history: History::new(settings.history_size),
            settings: settings.clone(),
        }
    }

    fn parse(payload: &Value) -> Option<LightState> {
        LightState::from_payload(payload)
    }

    fn observe(&mut self, device: &str, now: Instant, update: LightState) -> bool {
        if self.history.latest() == Some(&update) {
            return false;
        }

        info!(device, on = update.on, brightness = update.brightness, "Received update");
        self.history.insert(now, update);
        true
    }

    fn decide(&mut self, device: &str, deadline: Instant) -> Option<Command> {
        let current = *self.history.floor(deadline)?;
        if !current.on || current.brightness > MIN_USABLE_BRIGHTNESS {
            return None;
        }

        let brightness = self.replacement(deadline);
        info!(
            device,
            was = current.brightness,
            brightness,
            strategy = %self.settings.strategy,
            "Rolling back brightness"
        );
        Some(Command::SetBrightness(brightness))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(base: Instant, s: f64) -> Instant {
        base + Duration::from_secs_f64(s)
    }

    fn fixer(strategy: RollbackStrategy) -> BrightnessRollback {
        BrightnessRollback::new(&BrightnessSettings {
            strategy,
            ..Default::default()
        })
    }

    fn with_history(strategy: RollbackStrategy, entries: &[(f64, bool, u8)]) -> (BrightnessRollback, Instant) {
        let base = Instant::now();
        let mut fixer = fixer(strategy);
        for &(at, on, brightness) in entries {
            fixer.observe("test", secs(base, at), LightState::new(on, brightness));
        }
        (fixer, base)
    }

    #[test]
    fn test_redundant_update_is_ignored() {
        let base = Instant::now();
        let mut fixer = fixer(RollbackStrategy::Windowed);

        assert!(fixer.observe("test", base, LightState::new(true, 100)));
        assert!(!fixer.observe("test", secs(base, 1.0), LightState::new(true, 100)));
        assert!(fixer.observe("test", secs(base, 2.0), LightState::new(false, 100)));
        assert!(!fixer.observe("test", secs(base, 3.0), LightState::new(false, 3)));
        assert_eq!(fixer.history().len(), 2);
    }

    #[test]
    fn test_off_light_is_left_alone() {
        let (mut fixer, base) = with_history(RollbackStrategy::Windowed, &[(0.0, true, 200), (1.0, false, 1)]);
        assert_eq!(fixer.decide("test", secs(base, 1.5)), None);
    }

    #[test]
    fn test_bright_light_is_left_alone() {
        let (mut fixer, base) = with_history(RollbackStrategy::Windowed, &[(0.0, true, 1), (1.0, true, 2)]);
        assert_eq!(fixer.decide("test", secs(base, 1.5)), None);
    }

    #[test]
    fn test_empty_history_decides_nothing() {
        let mut fixer = fixer(RollbackStrategy::Windowed);
        assert_eq!(fixer.decide("test", Instant::now()), None);
    }

    #[test]
    fn test_rollback_recalls_previous_brightness() {
        for strategy in [RollbackStrategy::Windowed, RollbackStrategy::Step] {
            let (mut fixer, base) = with_history(strategy, &[(0.0, true, 200), (1.0, true, 1)]);
            assert_eq!(
                fixer.decide("test", secs(base, 1.5)),
                Some(Command::SetBrightness(200)),
                "strategy {}",
                strategy
            );
        }
    }

    #[test]
    fn test_rollback_defaults_to_full_brightness() {
        for strategy in [RollbackStrategy::Windowed, RollbackStrategy::Step] {
            let (mut fixer, base) =
                with_history(strategy, &[(0.0, true, 0), (1.0, true, 1), (2.0, true, 0)]);
            assert_eq!(
                fixer.decide("test", secs(base, 2.5)),
                Some(Command::SetBrightness(255)),
                "strategy {}",
                strategy
            );
        }
    }

    #[test]
    fn test_rollback_with_single_dim_entry() {
        let (mut fixer, base) = with_history(RollbackStrategy::Windowed, &[(0.0, true, 1)]);
        assert_eq!(
            fixer.decide("test", secs(base, 0.5)),
            Some(Command::SetBrightness(FALLBACK_BRIGHTNESS))
        );
    }

    #[test]
    fn test_windowed_takes_brightest_within_window() {
        let (fixer, base) = with_history(
            RollbackStrategy::Windowed,
            &[(0.0, true, 120), (2.0, true, 240), (4.0, true, 80), (6.0, true, 1)],
        );
        assert_eq!(fixer.replacement(secs(base, 6.5)), 240);
    }

    #[test]
    fn test_windowed_stops_after_lookback_of_on_time() {
        // 250 was last seen more than 10s of on-time ago.
        let (fixer, base) = with_history(
            RollbackStrategy::Windowed,
            &[(0.0, true, 250), (1.0, true, 90), (12.0, true, 1)],
        );
        assert_eq!(fixer.replacement(secs(base, 12.5)), 90);
    }

    #[test]
    fn test_windowed_does_not_count_off_time() {
        // A long off period does not use up the window.
        let (fixer, base) = with_history(
            RollbackStrategy::Windowed,
            &[(0.0, true, 180), (2.0, false, 180), (600.0, true, 1)],
        );
        assert_eq!(fixer.replacement(secs(base, 600.5)), 180);
    }

    #[test]
    fn test_windowed_ignores_off_brightness() {
        let (fixer, base) = with_history(
            RollbackStrategy::Windowed,
            &[(0.0, false, 250), (1.0, true, 1)],
        );
        assert_eq!(fixer.replacement(secs(base, 1.5)), FALLBACK_BRIGHTNESS);
    }

    #[test]
    fn test_step_finds_most_recent_usable_state() {
        let (fixer, base) = with_history(
            RollbackStrategy::Step,
            &[(0.0, true, 250), (1.0, true, 90), (1.8, true, 1), (3.0, true, 0)],
        );
        // Probes 2.5s (dim), 1.5s (90).
        assert_eq!(fixer.replacement(secs(base, 3.5)), 90);
    }

    #[test]
    fn test_decision_ignores_updates_after_deadline() {
        for strategy in [RollbackStrategy::Windowed, RollbackStrategy::Step] {
            // Dim at the deadline (1.5s), brightened again just after.
            let (mut fixer, base) = with_history(
                strategy,
                &[(0.0, true, 200), (1.0, true, 1), (1.6, true, 150)],
            );
            assert_eq!(
                fixer.decide("test", secs(base, 1.5)),
                Some(Command::SetBrightness(200)),
                "strategy {}",
                strategy
            );

            // Bright at the deadline, dimmed just after: not settled yet.
            let (mut fixer, base) =
                with_history(strategy, &[(0.0, true, 200), (1.0, true, 1)]);
            assert_eq!(fixer.decide("test", secs(base, 0.5)), None, "strategy {}", strategy);
        }
    }

    #[test]
    fn test_windowed_ignores_brightness_after_deadline() {
        let (fixer, base) = with_history(
            RollbackStrategy::Windowed,
            &[(0.0, true, 90), (1.0, true, 1), (2.0, true, 250)],
        );
        assert_eq!(fixer.replacement(secs(base, 1.5)), 90);
    }

    #[test]
    fn test_step_probes_on_whole_seconds() {
        // Probes 7s and 6s (both dim), then 5s, which precedes the 90 entry.
        let (fixer, base) = with_history(
            RollbackStrategy::Step,
            &[(0.0, true, 200), (5.2, true, 90), (5.5, true, 1)],
        );
        assert_eq!(fixer.replacement(secs(base, 8.0)), 200);
    }

    #[test]
    fn test_step_over_long_dim_period() {
        let (fixer, base) = with_history(
            RollbackStrategy::Step,
            &[(0.0, true, 180), (10.0, true, 1)],
        );
        let month = 30.0 * 24.0 * 3600.0;
        assert_eq!(fixer.replacement(secs(base, month)), 180);
    }

    #[test]
    fn test_replacement_always_in_range() {
        for strategy in [RollbackStrategy::Windowed, RollbackStrategy::Step] {
            for brightness in [0u8, 1, 2, 3, 128, 255] {
                let (fixer, base) =
                    with_history(strategy, &[(0.0, true, brightness), (1.0, true, 1)]);
                let value = fixer.replacement(secs(base, 1.5));
                assert!(value >= 2, "{} with {}", strategy, brightness);
            }
        }
    }

    #[test]
    fn test_retention_applies_to_history() {
        let base = Instant::now();
        let mut fixer = BrightnessRollback::new(&BrightnessSettings {
            history_size: 3,
            ..Default::default()
        });
        for i in 0..5u8 {
            fixer.observe("test", secs(base, f64::from(i)), LightState::new(true, 10 + i));
        }
        assert_eq!(fixer.history().len(), 3);
    }
}
