use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    Light1,
    Light2,
    Fan,
    Pump,
}

impl Actuator {
    pub const ALL: [Actuator; 4] = [Self::Light1, Self::Light2, Self::Fan, Self::Pump];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light1 => "light1",
            Self::Light2 => "light2",
            Self::Fan => "fan",
            Self::Pump => "pump",
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown actuator `{0}`")]
pub struct ParseActuatorError(pub String);

impl FromStr for Actuator {
    type Err = ParseActuatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light1" => Ok(Self::Light1),
            "light2" => Ok(Self::Light2),
            "fan" => Ok(Self::Fan),
            "pump" => Ok(Self::Pump),
            _ => Err(ParseActuatorError(value.to_string())),
        }
    }
}

/// Wall-clock time of day. Absence of a synced clock is modelled as `Option<LocalTime>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub hour: u8,
    pub minute: u8,
}

impl LocalTime {
    pub fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    pub fn from_chrono<T: chrono::Timelike>(time: &T) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn minute_of_day(self) -> i32 {
        i32::from(self.hour) * 60 + i32::from(self.minute)
    }
}

/// Latest reading from the sensor collaborator. `None` means the reading is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorState {
    #[serde(rename = "temperatureC")]
    pub temperature_c: Option<f32>,
    #[serde(rename = "humidityRH")]
    pub humidity_rh: Option<f32>,
    #[serde(rename = "soil1Percent")]
    pub soil1_percent: u8,
    #[serde(rename = "soil2Percent")]
    pub soil2_percent: u8,
}

impl SensorState {
    /// Builds a snapshot from raw driver values, mapping NaN and infinities to `None`.
    pub fn from_raw(temperature_c: f32, humidity_rh: f32, soil1: i32, soil2: i32) -> Self {
        Self {
            temperature_c: temperature_c.is_finite().then_some(temperature_c),
            humidity_rh: humidity_rh.is_finite().then_some(humidity_rh),
            soil1_percent: soil1.clamp(0, 100) as u8,
            soil2_percent: soil2.clamp(0, 100) as u8,
        }
    }

    pub fn soil(&self) -> [u8; 2] {
        [self.soil1_percent, self.soil2_percent]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayState {
    pub light1: bool,
    pub light2: bool,
    pub fan: bool,
    pub pump: bool,
}

impl RelayState {
    pub fn get(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Light1 => self.light1,
            Actuator::Light2 => self.light2,
            Actuator::Fan => self.fan,
            Actuator::Pump => self.pump,
        }
    }

    pub fn set(&mut self, actuator: Actuator, on: bool) {
        match actuator {
            Actuator::Light1 => self.light1 = on,
            Actuator::Light2 => self.light2 = on,
            Actuator::Fan => self.fan = on,
            Actuator::Pump => self.pump = on,
        }
    }

    /// Transitions needed to go from `self` to `next`, in actuator order.
    pub fn changes_to(&self, next: &RelayState) -> Vec<RelayChange> {
        Actuator::ALL
            .into_iter()
            .filter(|actuator| self.get(*actuator) != next.get(*actuator))
            .map(|actuator| RelayChange {
                actuator,
                on: next.get(actuator),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayChange {
    pub actuator: Actuator,
    pub on: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub state: bool,
    pub auto: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelaysStatus {
    pub light1: RelayStatus,
    pub light2: RelayStatus,
    pub fan: RelayStatus,
    pub pump: RelayStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChamberStatus {
    pub idx: usize,
    pub id: usize,
    pub name: String,
    pub soil: u8,
    #[serde(rename = "soilDryThreshold")]
    pub soil_dry_threshold: i32,
    #[serde(rename = "soilWetThreshold")]
    pub soil_wet_threshold: i32,
    #[serde(rename = "profileId")]
    pub profile_id: i32,
    #[serde(rename = "lightRelayId")]
    pub light_relay_id: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PumpStatus {
    pub running: bool,
    #[serde(rename = "activeDryMask")]
    pub active_dry_mask: u8,
    #[serde(rename = "runtimeMs")]
    pub runtime_ms: u64,
    #[serde(rename = "cooldownRemainingMs")]
    pub cooldown_remaining_ms: u64,
    #[serde(rename = "dryHoldRemainingMs")]
    pub dry_hold_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FanStatus {
    #[serde(rename = "triggerHoldRemainingMs")]
    pub trigger_hold_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(rename = "temperatureC")]
    pub temperature_c: Option<f32>,
    #[serde(rename = "humidityRH")]
    pub humidity_rh: Option<f32>,
    pub chambers: Vec<ChamberStatus>,
    pub relays: RelaysStatus,
    pub pump: PumpStatus,
    pub fan: FanStatus,
    #[serde(rename = "timeSynced")]
    pub time_synced: bool,
    pub timezone: &'static str,
}
