use crate::{config::EnvConfig, types::SensorState};

/// How long the hot/humid condition must hold before the fan is switched on.
pub const FAN_TRIGGER_HOLD_MS: u64 = 120_000;

/// Runtime state of the fan hysteresis. The fan output itself lives in `RelayState`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanController {
    trigger_start_ms: Option<u64>,
}

impl FanController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides the next fan output. `fan_on` is the current relay state; the returned
    /// value is what the relay should be after this tick.
    pub fn tick(
        &mut self,
        automatic: bool,
        fan_on: bool,
        sensors: &SensorState,
        env: &EnvConfig,
        now_ms: u64,
    ) -> bool {
        if !automatic {
            self.trigger_start_ms = None;
            return fan_on;
        }

        if fan_on {
            if should_release(sensors, env) {
                self.trigger_start_ms = None;
                return false;
            }
            return true;
        }

        if !should_trigger(sensors, env) {
            self.trigger_start_ms = None;
            return false;
        }

        let start = *self.trigger_start_ms.get_or_insert(now_ms);
        if now_ms.wrapping_sub(start) >= FAN_TRIGGER_HOLD_MS {
            self.trigger_start_ms = None;
            true
        } else {
            false
        }
    }

    /// Time left before a continuing trigger condition switches the fan on.
    pub fn hold_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.trigger_start_ms
            .map(|start| FAN_TRIGGER_HOLD_MS.saturating_sub(now_ms.wrapping_sub(start)))
    }
}

fn should_trigger(sensors: &SensorState, env: &EnvConfig) -> bool {
    let hot = sensors
        .temperature_c
        .is_some_and(|temp| temp >= env.fan_on_temp_c);
    let humid = sensors
        .humidity_rh
        .is_some_and(|hum| hum.trunc() >= f32::from(env.fan_hum_on));
    hot || humid
}

fn should_release(sensors: &SensorState, env: &EnvConfig) -> bool {
    let cool = sensors
        .temperature_c
        .map_or(true, |temp| temp <= env.fan_off_temp_c);
    let dry = sensors
        .humidity_rh
        .map_or(true, |hum| hum.trunc() <= f32::from(env.fan_hum_off));
    cool && dry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensors(temperature_c: Option<f32>, humidity_rh: Option<f32>) -> SensorState {
        SensorState {
            temperature_c,
            humidity_rh,
            ..SensorState::default()
        }
    }

    #[test]
    fn turns_on_exactly_when_hold_elapses() {
        let env = EnvConfig::default();
        let hot = sensors(Some(30.0), Some(50.0));
        let mut fan = FanController::new();

        assert!(!fan.tick(true, false, &hot, &env, 0));
        assert!(!fan.tick(true, false, &hot, &env, 60_000));
        assert!(!fan.tick(true, false, &hot, &env, 119_999));
        assert!(fan.tick(true, false, &hot, &env, 120_000));
    }

    #[test]
    fn single_quiet_tick_restarts_hold() {
        let env = EnvConfig::default();
        let hot = sensors(Some(30.0), Some(50.0));
        let quiet = sensors(Some(27.0), Some(50.0));
        let mut fan = FanController::new();

        assert!(!fan.tick(true, false, &hot, &env, 0));
        assert!(!fan.tick(true, false, &hot, &env, 100_000));
        assert!(!fan.tick(true, false, &quiet, &env, 110_000));
        assert_eq!(fan.hold_remaining_ms(110_000), None);
        assert!(!fan.tick(true, false, &hot, &env, 120_000));
        assert!(!fan.tick(true, false, &hot, &env, 239_999));
        assert!(fan.tick(true, false, &hot, &env, 240_000));
    }

    #[test]
    fn humidity_alone_triggers_on_whole_percent() {
        let env = EnvConfig::default();
        let mut fan = FanController::new();

        assert!(!fan.tick(true, false, &sensors(None, Some(79.9)), &env, 0));
        assert_eq!(fan.hold_remaining_ms(0), None);
        assert!(!fan.tick(true, false, &sensors(None, Some(80.0)), &env, 1_000));
        assert!(fan.tick(true, false, &sensors(None, Some(80.4)), &env, 121_000));
    }

    #[test]
    fn releases_immediately_when_both_conditions_clear() {
        let env = EnvConfig::default();
        let mut fan = FanController::new();

        assert!(fan.tick(true, true, &sensors(Some(26.5), Some(60.0)), &env, 0));
        assert!(fan.tick(true, true, &sensors(Some(25.0), Some(75.0)), &env, 1_000));
        assert!(!fan.tick(true, true, &sensors(Some(26.0), Some(70.0)), &env, 2_000));
    }

    #[test]
    fn humidity_release_uses_whole_percent() {
        let env = EnvConfig::default();
        let mut fan = FanController::new();

        assert!(fan.tick(true, true, &sensors(Some(25.0), Some(71.0)), &env, 0));
        assert!(!fan.tick(true, true, &sensors(Some(25.0), Some(70.5)), &env, 1_000));
    }

    #[test]
    fn missing_sensors_satisfy_release() {
        let env = EnvConfig::default();
        let mut fan = FanController::new();

        assert!(!fan.tick(true, true, &sensors(None, None), &env, 0));
        assert!(!fan.tick(true, false, &sensors(None, None), &env, 200_000));
    }

    #[test]
    fn manual_mode_leaves_output_and_clears_timer() {
        let env = EnvConfig::default();
        let hot = sensors(Some(35.0), None);
        let mut fan = FanController::new();

        assert!(!fan.tick(true, false, &hot, &env, 0));
        assert!(fan.hold_remaining_ms(0).is_some());
        assert!(fan.tick(false, true, &hot, &env, 50_000));
        assert_eq!(fan.hold_remaining_ms(50_000), None);
        assert!(!fan.tick(false, false, &hot, &env, 500_000));
    }

    #[test]
    fn hold_tolerates_clock_wraparound() {
        let env = EnvConfig::default();
        let hot = sensors(Some(30.0), None);
        let start = u64::MAX - 50_000;
        let mut fan = FanController::new();

        assert!(!fan.tick(true, false, &hot, &env, start));
        assert_eq!(fan.hold_remaining_ms(0), Some(69_999));
        assert!(!fan.tick(true, false, &hot, &env, 69_998));
        assert!(fan.tick(true, false, &hot, &env, 69_999));
    }
}
