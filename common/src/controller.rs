use thiserror::Error;

use crate::{
    config::{ConfigUpdate, GreenhouseConfig},
    fan::FanController,
    history::HistorySample,
    profile::{self, ProfileError},
    pump::{PumpController, PumpInputs},
    types::{
        Actuator, ChamberStatus, ControllerStatus, FanStatus, LocalTime, PumpStatus, RelayChange,
        RelayState, RelayStatus, RelaysStatus, SensorState,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ToggleError {
    #[error("{0} is under automatic control")]
    Automatic(Actuator),
}

/// Owns the configuration, the latest sensor readings, the relay outputs and the
/// fan/pump runtime state. The caller drives it with `tick` at a fixed cadence.
#[derive(Debug, Clone)]
pub struct GreenhouseController {
    config: GreenhouseConfig,
    sensors: SensorState,
    relays: RelayState,
    fan: FanController,
    pump: PumpController,
}

impl GreenhouseController {
    pub fn new(mut config: GreenhouseConfig) -> Self {
        config.sanitize();
        Self {
            config,
            sensors: SensorState::default(),
            relays: RelayState::default(),
            fan: FanController::new(),
            pump: PumpController::new(),
        }
    }

    pub fn config(&self) -> &GreenhouseConfig {
        &self.config
    }

    pub fn sensors(&self) -> &SensorState {
        &self.sensors
    }

    pub fn relays(&self) -> RelayState {
        self.relays
    }

    pub fn update_sensors(&mut self, sensors: SensorState) {
        self.sensors = sensors;
    }

    /// Runs one control cycle: light schedules (only with a known local time), fan
    /// hysteresis, then the pump cycle. Returns the relay transitions it made.
    pub fn tick(&mut self, now_ms: u64, local_time: Option<LocalTime>) -> Vec<RelayChange> {
        let before = self.relays;

        if let Some(time) = local_time {
            let minute = time.minute_of_day();
            if self.config.light1.enabled {
                self.relays.light1 = self.config.light1.is_on_at(minute);
            }
            if self.config.light2.enabled {
                self.relays.light2 = self.config.light2.is_on_at(minute);
            }
        }

        self.relays.fan = self.fan.tick(
            self.config.auto_fan,
            self.relays.fan,
            &self.sensors,
            &self.config.env,
            now_ms,
        );

        let inputs = PumpInputs {
            automatic: self.config.auto_pump,
            soil: self.sensors.soil(),
            chambers: [&self.config.chamber1, &self.config.chamber2],
            env: &self.config.env,
        };
        if let Some(on) = self.pump.tick(&inputs, now_ms) {
            self.relays.pump = on;
        }

        before.changes_to(&self.relays)
    }

    /// Flips a relay under manual control and returns its new state.
    pub fn toggle(&mut self, actuator: Actuator) -> Result<bool, ToggleError> {
        if self.config.is_automatic(actuator) {
            return Err(ToggleError::Automatic(actuator));
        }
        let on = !self.relays.get(actuator);
        self.relays.set(actuator, on);
        Ok(on)
    }

    pub fn set_automatic(&mut self, actuator: Actuator, automatic: bool) -> bool {
        self.config.set_automatic(actuator, automatic)
    }

    pub fn update_config(&mut self, update: &ConfigUpdate) -> bool {
        update.apply_to(&mut self.config)
    }

    pub fn apply_grow_profile(&mut self, profile_id: i32) -> Result<&'static str, ProfileError> {
        profile::apply_grow_profile(&mut self.config, profile_id)
    }

    pub fn apply_grow_profile_to_chamber(
        &mut self,
        chamber_idx: usize,
        profile_id: i32,
    ) -> Result<&'static str, ProfileError> {
        profile::apply_grow_profile_to_chamber(&mut self.config, chamber_idx, profile_id)
    }

    pub fn history_sample(&self, epoch_secs: Option<i64>) -> HistorySample {
        HistorySample {
            ts: epoch_secs.unwrap_or(0),
            temperature_c: self.sensors.temperature_c,
            humidity_rh: self.sensors.humidity_rh,
            soil1: self.sensors.soil1_percent,
            soil2: self.sensors.soil2_percent,
            light1: self.relays.light1,
            light2: self.relays.light2,
        }
    }

    pub fn status(&self, now_ms: u64, time_synced: bool) -> ControllerStatus {
        let soil = self.sensors.soil();
        let chambers = [&self.config.chamber1, &self.config.chamber2]
            .into_iter()
            .enumerate()
            .map(|(idx, chamber)| ChamberStatus {
                idx,
                id: idx + 1,
                name: chamber.name.clone(),
                soil: soil[idx],
                soil_dry_threshold: chamber.soil_dry_threshold,
                soil_wet_threshold: chamber.soil_wet_threshold,
                profile_id: chamber.profile_id,
                light_relay_id: if idx == 0 {
                    Actuator::Light1.as_str()
                } else {
                    Actuator::Light2.as_str()
                },
            })
            .collect();

        ControllerStatus {
            temperature_c: self.sensors.temperature_c,
            humidity_rh: self.sensors.humidity_rh,
            chambers,
            relays: RelaysStatus {
                light1: self.relay_status(Actuator::Light1),
                light2: self.relay_status(Actuator::Light2),
                fan: self.relay_status(Actuator::Fan),
                pump: self.relay_status(Actuator::Pump),
            },
            pump: PumpStatus {
                running: self.pump.is_running(),
                active_dry_mask: self.pump.active_dry_mask().bits(),
                runtime_ms: self.pump.runtime_ms(now_ms),
                cooldown_remaining_ms: self.pump.cooldown_remaining_ms(&self.config.env, now_ms),
                dry_hold_remaining_ms: self.pump.dry_hold_remaining_ms(now_ms),
            },
            fan: FanStatus {
                trigger_hold_remaining_ms: self.fan.hold_remaining_ms(now_ms),
            },
            time_synced,
            timezone: self.config.timezone().label,
        }
    }

    fn relay_status(&self, actuator: Actuator) -> RelayStatus {
        let schedule = match actuator {
            Actuator::Light1 => Some(self.config.light1.window_label()),
            Actuator::Light2 => Some(self.config.light2.window_label()),
            Actuator::Fan | Actuator::Pump => None,
        };
        RelayStatus {
            state: self.relays.get(actuator),
            auto: self.config.is_automatic(actuator),
            schedule,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pump::ChamberMask;

    fn soil_sensors(soil1: u8, soil2: u8) -> SensorState {
        SensorState {
            temperature_c: Some(22.0),
            humidity_rh: Some(50.0),
            soil1_percent: soil1,
            soil2_percent: soil2,
        }
    }

    fn change(actuator: Actuator, on: bool) -> RelayChange {
        RelayChange { actuator, on }
    }

    #[test]
    fn pump_cycle_follows_triggering_chamber() {
        let mut controller = GreenhouseController::new(GreenhouseConfig::default());
        controller.update_sensors(soil_sensors(20, 80));

        assert!(controller.tick(1_000_000, None).is_empty());
        assert!(controller.tick(1_060_000, None).is_empty());
        assert_eq!(
            controller.tick(1_120_000, None),
            vec![change(Actuator::Pump, true)]
        );
        assert_eq!(
            controller.pump.active_dry_mask(),
            ChamberMask::CHAMBER_1
        );

        controller.update_sensors(soil_sensors(40, 80));
        assert!(controller.tick(1_125_000, None).is_empty());

        controller.update_sensors(soil_sensors(46, 80));
        assert_eq!(
            controller.tick(1_130_000, None),
            vec![change(Actuator::Pump, false)]
        );
        assert!(!controller.relays().pump);
    }

    #[test]
    fn lights_follow_schedule_only_with_known_time() {
        let mut config = GreenhouseConfig::default();
        config.light1.enabled = true;
        let mut controller = GreenhouseController::new(config);

        assert!(controller.tick(0, None).is_empty());
        assert_eq!(
            controller.tick(1_000, Some(LocalTime::new(8, 0))),
            vec![change(Actuator::Light1, true)]
        );
        assert!(controller.tick(2_000, None).is_empty());
        assert!(controller.relays().light1);
        assert_eq!(
            controller.tick(3_000, Some(LocalTime::new(20, 0))),
            vec![change(Actuator::Light1, false)]
        );
        assert!(!controller.relays().light2);
    }

    #[test]
    fn toggle_is_rejected_in_automatic_mode() {
        let mut controller = GreenhouseController::new(GreenhouseConfig::default());

        assert_eq!(
            controller.toggle(Actuator::Fan),
            Err(ToggleError::Automatic(Actuator::Fan))
        );
        assert_eq!(controller.toggle(Actuator::Light2), Ok(true));
        assert_eq!(controller.toggle(Actuator::Light2), Ok(false));

        assert!(controller.set_automatic(Actuator::Fan, false));
        assert!(!controller.set_automatic(Actuator::Fan, false));
        assert_eq!(controller.toggle(Actuator::Fan), Ok(true));
    }

    #[test]
    fn manual_lights_ignore_schedule() {
        let mut controller = GreenhouseController::new(GreenhouseConfig::default());
        controller.toggle(Actuator::Light1).unwrap();

        assert!(controller.tick(0, Some(LocalTime::new(23, 0))).is_empty());
        assert!(controller.relays().light1);
    }

    #[test]
    fn manual_pump_is_left_alone() {
        let mut config = GreenhouseConfig::default();
        config.auto_pump = false;
        let mut controller = GreenhouseController::new(config);
        controller.update_sensors(soil_sensors(0, 0));

        assert_eq!(controller.toggle(Actuator::Pump), Ok(true));
        for now in [0, 200_000, 400_000] {
            assert!(controller.tick(now, None).is_empty());
        }
        assert!(controller.relays().pump);
    }

    #[test]
    fn fan_turns_on_after_hold_and_off_when_cool() {
        let mut controller = GreenhouseController::new(GreenhouseConfig::default());
        controller.update_sensors(SensorState {
            temperature_c: Some(29.0),
            ..soil_sensors(50, 50)
        });

        assert!(controller.tick(0, None).is_empty());
        assert_eq!(
            controller.status(30_000, false).fan.trigger_hold_remaining_ms,
            Some(90_000)
        );
        assert_eq!(
            controller.tick(120_000, None),
            vec![change(Actuator::Fan, true)]
        );

        controller.update_sensors(soil_sensors(50, 50));
        assert_eq!(
            controller.tick(121_000, None),
            vec![change(Actuator::Fan, false)]
        );
    }

    #[test]
    fn missing_sensors_do_not_trigger_anything() {
        let mut controller = GreenhouseController::new(GreenhouseConfig::default());
        controller.update_sensors(SensorState::from_raw(f32::NAN, f32::NAN, 50, 50));

        for now in (0..=600_000).step_by(60_000) {
            assert!(controller.tick(now, None).is_empty());
        }
    }

    #[test]
    fn status_reports_chambers_and_relays() {
        let mut controller = GreenhouseController::new(GreenhouseConfig::default());
        controller.update_sensors(soil_sensors(33, 61));

        let status = controller.status(0, true);

        assert_eq!(status.chambers.len(), 2);
        assert_eq!(status.chambers[1].id, 2);
        assert_eq!(status.chambers[1].soil, 61);
        assert_eq!(status.chambers[1].light_relay_id, "light2");
        assert_eq!(status.relays.light1.schedule.as_deref(), Some("08:00\u{2013}20:00"));
        assert!(status.relays.pump.auto);
        assert!(!status.relays.light1.auto);
        assert_eq!(status.timezone, "UTC");
        assert!(status.time_synced);
    }

    #[test]
    fn history_sample_uses_zero_without_clock() {
        let mut controller = GreenhouseController::new(GreenhouseConfig::default());
        controller.update_sensors(soil_sensors(12, 34));
        controller.toggle(Actuator::Light2).unwrap();

        let sample = controller.history_sample(None);

        assert_eq!(sample.ts, 0);
        assert_eq!((sample.soil1, sample.soil2), (12, 34));
        assert!(!sample.light1);
        assert!(sample.light2);
        assert_eq!(controller.history_sample(Some(1_700_000_000)).ts, 1_700_000_000);
    }

    #[test]
    fn profile_application_flows_into_control() {
        let mut controller = GreenhouseController::new(GreenhouseConfig::default());

        assert_eq!(controller.apply_grow_profile(2), Ok("Vegetative"));
        assert_eq!(controller.config().env.pump_max_on_sec, 25);
        assert!(controller.config().light1.enabled);
        assert_eq!(
            controller.apply_grow_profile_to_chamber(5, 1),
            Err(ProfileError::InvalidChamber(5))
        );
        assert_eq!(
            controller.tick(0, Some(LocalTime::new(7, 0))),
            vec![change(Actuator::Light1, true), change(Actuator::Light2, true)]
        );
    }
}
