use serde::{Deserialize, Serialize};

use crate::{
    schedule::{parse_time_to_minutes, LightSchedule},
    types::Actuator,
};

pub const CHAMBER_COUNT: usize = 2;
pub const DEFAULT_CHAMBER_NAMES: [&str; CHAMBER_COUNT] = ["Chamber 1", "Chamber 2"];
pub const DEFAULT_SOIL_DRY: i32 = 35;
pub const DEFAULT_SOIL_WET: i32 = 45;
pub const MAX_CHAMBER_NAME_CHARS: usize = 24;

const DEFAULT_FAN_ON_TEMP_C: f32 = 28.0;
const DEFAULT_FAN_OFF_TEMP_C: f32 = 26.0;
const DEFAULT_FAN_HUM_ON: u8 = 80;
const DEFAULT_FAN_HUM_OFF: u8 = 70;
const DEFAULT_PUMP_MIN_OFF_SEC: u32 = 5 * 60;
const DEFAULT_PUMP_MAX_ON_SEC: u32 = 30;
const MIN_PUMP_MIN_OFF_SEC: u32 = 10;
const MIN_PUMP_MAX_ON_SEC: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub fan_on_temp_c: f32,
    pub fan_off_temp_c: f32,
    pub fan_hum_on: u8,
    pub fan_hum_off: u8,
    pub pump_min_off_sec: u32,
    pub pump_max_on_sec: u32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            fan_on_temp_c: DEFAULT_FAN_ON_TEMP_C,
            fan_off_temp_c: DEFAULT_FAN_OFF_TEMP_C,
            fan_hum_on: DEFAULT_FAN_HUM_ON,
            fan_hum_off: DEFAULT_FAN_HUM_OFF,
            pump_min_off_sec: DEFAULT_PUMP_MIN_OFF_SEC,
            pump_max_on_sec: DEFAULT_PUMP_MAX_ON_SEC,
        }
    }
}

impl EnvConfig {
    pub fn sanitize(&mut self) -> bool {
        let before = *self;

        self.reset_inverted_bands();
        if self.pump_min_off_sec < MIN_PUMP_MIN_OFF_SEC {
            self.pump_min_off_sec = DEFAULT_PUMP_MIN_OFF_SEC;
        }
        if self.pump_max_on_sec < MIN_PUMP_MAX_ON_SEC {
            self.pump_max_on_sec = DEFAULT_PUMP_MAX_ON_SEC;
        }

        *self != before
    }

    fn reset_inverted_bands(&mut self) {
        if !self.fan_on_temp_c.is_finite()
            || !self.fan_off_temp_c.is_finite()
            || self.fan_off_temp_c >= self.fan_on_temp_c
        {
            self.fan_on_temp_c = DEFAULT_FAN_ON_TEMP_C;
            self.fan_off_temp_c = DEFAULT_FAN_OFF_TEMP_C;
        }

        self.fan_hum_on = self.fan_hum_on.min(100);
        self.fan_hum_off = self.fan_hum_off.min(100);
        if self.fan_hum_off >= self.fan_hum_on {
            self.fan_hum_on = DEFAULT_FAN_HUM_ON;
            self.fan_hum_off = DEFAULT_FAN_HUM_OFF;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChamberConfig {
    pub name: String,
    pub soil_dry_threshold: i32,
    pub soil_wet_threshold: i32,
    pub profile_id: i32,
}

impl ChamberConfig {
    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            soil_dry_threshold: DEFAULT_SOIL_DRY,
            soil_wet_threshold: DEFAULT_SOIL_WET,
            profile_id: -1,
        }
    }

    /// Repairs the chamber in place and reports whether any field changed.
    ///
    /// The name is stripped of angle brackets and control characters and trimmed; an
    /// empty or over-long result falls back to `default_name`. Thresholds are clamped to
    /// 0-100 and reset to 35/45 when the wet threshold is not above the dry one.
    pub fn normalize(&mut self, default_name: &str) -> bool {
        let mut changed = false;

        let sanitized = sanitize_chamber_name(&self.name);
        if sanitized != self.name {
            self.name = sanitized;
            changed = true;
        }
        let name_len = self.name.chars().count();
        if name_len < 1 || name_len > MAX_CHAMBER_NAME_CHARS {
            self.name = default_name.to_string();
            changed = true;
        }

        let dry = self.soil_dry_threshold.clamp(0, 100);
        let wet = self.soil_wet_threshold.clamp(0, 100);
        if wet <= dry {
            self.soil_dry_threshold = DEFAULT_SOIL_DRY;
            self.soil_wet_threshold = DEFAULT_SOIL_WET;
            changed = true;
        } else if dry != self.soil_dry_threshold || wet != self.soil_wet_threshold {
            self.soil_dry_threshold = dry;
            self.soil_wet_threshold = wet;
            changed = true;
        }

        if self.profile_id < -1 {
            self.profile_id = -1;
            changed = true;
        }

        changed
    }

    pub fn is_dry(&self, soil_percent: u8) -> bool {
        i32::from(soil_percent) < self.soil_dry_threshold
    }

    pub fn is_wet(&self, soil_percent: u8) -> bool {
        i32::from(soil_percent) > self.soil_wet_threshold
    }
}

pub fn sanitize_chamber_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '<' && *c != '>' && !c.is_ascii_control())
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneOption {
    pub label: &'static str,
    pub iana: &'static str,
}

pub static TIMEZONES: [TimezoneOption; 7] = [
    TimezoneOption {
        label: "UTC",
        iana: "UTC",
    },
    TimezoneOption {
        label: "Europe/Berlin",
        iana: "Europe/Berlin",
    },
    TimezoneOption {
        label: "Europe/London",
        iana: "Europe/London",
    },
    TimezoneOption {
        label: "US/Eastern",
        iana: "America/New_York",
    },
    TimezoneOption {
        label: "US/Central",
        iana: "America/Chicago",
    },
    TimezoneOption {
        label: "US/Mountain",
        iana: "America/Denver",
    },
    TimezoneOption {
        label: "US/Pacific",
        iana: "America/Los_Angeles",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenhouseConfig {
    pub env: EnvConfig,
    pub light1: LightSchedule,
    pub light2: LightSchedule,
    pub auto_fan: bool,
    pub auto_pump: bool,
    pub tz_index: usize,
    pub chamber1: ChamberConfig,
    pub chamber2: ChamberConfig,
}

impl Default for GreenhouseConfig {
    fn default() -> Self {
        Self {
            env: EnvConfig::default(),
            light1: LightSchedule::default(),
            light2: LightSchedule::default(),
            auto_fan: true,
            auto_pump: true,
            tz_index: 0,
            chamber1: ChamberConfig::with_name(DEFAULT_CHAMBER_NAMES[0]),
            chamber2: ChamberConfig::with_name(DEFAULT_CHAMBER_NAMES[1]),
        }
    }
}

impl GreenhouseConfig {
    /// Brings every field back inside its invariants. Returns whether anything changed,
    /// so the caller can decide to persist the repaired document.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = self.env.sanitize();
        changed |= self.light1.sanitize();
        changed |= self.light2.sanitize();
        changed |= self.normalize_chambers();

        if self.tz_index >= TIMEZONES.len() {
            self.tz_index = 0;
            changed = true;
        }

        changed
    }

    pub fn normalize_chambers(&mut self) -> bool {
        let first = self.chamber1.normalize(DEFAULT_CHAMBER_NAMES[0]);
        let second = self.chamber2.normalize(DEFAULT_CHAMBER_NAMES[1]);
        first || second
    }

    pub fn chamber(&self, idx: usize) -> Option<&ChamberConfig> {
        match idx {
            0 => Some(&self.chamber1),
            1 => Some(&self.chamber2),
            _ => None,
        }
    }

    /// The chamber at `idx` together with the light it is wired to.
    pub fn chamber_with_light_mut(
        &mut self,
        idx: usize,
    ) -> Option<(&mut ChamberConfig, &mut LightSchedule)> {
        match idx {
            0 => Some((&mut self.chamber1, &mut self.light1)),
            1 => Some((&mut self.chamber2, &mut self.light2)),
            _ => None,
        }
    }

    pub fn timezone(&self) -> &'static TimezoneOption {
        &TIMEZONES[self.tz_index.min(TIMEZONES.len() - 1)]
    }

    pub fn is_automatic(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Light1 => self.light1.enabled,
            Actuator::Light2 => self.light2.enabled,
            Actuator::Fan => self.auto_fan,
            Actuator::Pump => self.auto_pump,
        }
    }

    pub fn set_automatic(&mut self, actuator: Actuator, automatic: bool) -> bool {
        let flag = match actuator {
            Actuator::Light1 => &mut self.light1.enabled,
            Actuator::Light2 => &mut self.light2.enabled,
            Actuator::Fan => &mut self.auto_fan,
            Actuator::Pump => &mut self.auto_pump,
        };
        let changed = *flag != automatic;
        *flag = automatic;
        changed
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub greenhouse: GreenhouseConfig,
    /// Global soil thresholds written before chambers were configured separately.
    #[serde(rename = "soilDry", default, skip_serializing)]
    pub legacy_soil_dry: Option<i32>,
    #[serde(rename = "soilWet", default, skip_serializing)]
    pub legacy_soil_wet: Option<i32>,
}

impl RuntimeConfig {
    pub fn new(greenhouse: GreenhouseConfig) -> Self {
        Self {
            greenhouse,
            ..Self::default()
        }
    }

    /// Parses a stored document, migrating legacy soil thresholds and sanitizing the
    /// result. The flag reports whether the document should be written back.
    pub fn from_json(raw: &[u8]) -> Result<(Self, bool), serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;
        let has_chambers = value
            .get("greenhouse")
            .map(|greenhouse| {
                greenhouse.get("chamber1").is_some() || greenhouse.get("chamber2").is_some()
            })
            .unwrap_or(false);

        let mut runtime: RuntimeConfig = serde_json::from_value(value)?;
        let mut changed = false;

        let legacy_dry = runtime.legacy_soil_dry.take();
        let legacy_wet = runtime.legacy_soil_wet.take();
        if legacy_dry.is_some() || legacy_wet.is_some() {
            if !has_chambers {
                for (chamber, name) in [
                    (&mut runtime.greenhouse.chamber1, DEFAULT_CHAMBER_NAMES[0]),
                    (&mut runtime.greenhouse.chamber2, DEFAULT_CHAMBER_NAMES[1]),
                ] {
                    *chamber = ChamberConfig {
                        name: name.to_string(),
                        soil_dry_threshold: legacy_dry.unwrap_or(DEFAULT_SOIL_DRY),
                        soil_wet_threshold: legacy_wet.unwrap_or(DEFAULT_SOIL_WET),
                        profile_id: -1,
                    };
                }
            }
            changed = true;
        }

        changed |= runtime.greenhouse.sanitize();
        Ok((runtime, changed))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LightScheduleUpdate {
    #[serde(default)]
    pub on: Option<String>,
    #[serde(default)]
    pub off: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChamberUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "soilDry", default)]
    pub soil_dry: Option<i32>,
    #[serde(rename = "soilWet", default)]
    pub soil_wet: Option<i32>,
    #[serde(rename = "profileId", default)]
    pub profile_id: Option<i32>,
}

/// Partial configuration update. Absent fields are left untouched; present ones are
/// validated or clamped before they are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(rename = "fanOnTemp", default)]
    pub fan_on_temp_c: Option<f32>,
    #[serde(rename = "fanOffTemp", default)]
    pub fan_off_temp_c: Option<f32>,
    #[serde(rename = "fanHumOn", default)]
    pub fan_hum_on: Option<i32>,
    #[serde(rename = "fanHumOff", default)]
    pub fan_hum_off: Option<i32>,
    #[serde(rename = "pumpMinOffSec", default)]
    pub pump_min_off_sec: Option<u32>,
    #[serde(rename = "pumpMaxOnSec", default)]
    pub pump_max_on_sec: Option<u32>,
    #[serde(default)]
    pub light1: Option<LightScheduleUpdate>,
    #[serde(default)]
    pub light2: Option<LightScheduleUpdate>,
    #[serde(rename = "autoFan", default)]
    pub auto_fan: Option<bool>,
    #[serde(rename = "autoPump", default)]
    pub auto_pump: Option<bool>,
    #[serde(default)]
    pub chamber1: Option<ChamberUpdate>,
    #[serde(default)]
    pub chamber2: Option<ChamberUpdate>,
    #[serde(rename = "tzIndex", default)]
    pub tz_index: Option<i64>,
}

impl ConfigUpdate {
    pub fn apply_to(&self, config: &mut GreenhouseConfig) -> bool {
        let before = config.clone();

        let accepts_temp = |value: f32| value > 0.0 && value < 80.0;
        if let Some(value) = self.fan_on_temp_c.filter(|v| accepts_temp(*v)) {
            config.env.fan_on_temp_c = value;
        }
        if let Some(value) = self.fan_off_temp_c.filter(|v| accepts_temp(*v)) {
            config.env.fan_off_temp_c = value;
        }
        if let Some(value) = self.fan_hum_on {
            config.env.fan_hum_on = value.clamp(0, 100) as u8;
        }
        if let Some(value) = self.fan_hum_off {
            config.env.fan_hum_off = value.clamp(0, 100) as u8;
        }
        config.env.reset_inverted_bands();

        if let Some(value) = self.pump_min_off_sec.filter(|v| (10..=36_000).contains(v)) {
            config.env.pump_min_off_sec = value;
        }
        if let Some(value) = self.pump_max_on_sec.filter(|v| (5..=3_600).contains(v)) {
            config.env.pump_max_on_sec = value;
        }

        for (update, light) in [
            (&self.light1, &mut config.light1),
            (&self.light2, &mut config.light2),
        ] {
            if let Some(update) = update {
                update.apply_to(light);
            }
        }

        if let Some(value) = self.auto_fan {
            config.auto_fan = value;
        }
        if let Some(value) = self.auto_pump {
            config.auto_pump = value;
        }

        for (update, chamber) in [
            (&self.chamber1, &mut config.chamber1),
            (&self.chamber2, &mut config.chamber2),
        ] {
            if let Some(update) = update {
                update.apply_to(chamber);
            }
        }
        config.normalize_chambers();

        if let Some(value) = self.tz_index {
            config.tz_index = value.clamp(0, TIMEZONES.len() as i64 - 1) as usize;
        }

        *config != before
    }
}

impl LightScheduleUpdate {
    fn apply_to(&self, light: &mut LightSchedule) {
        if let Some(minutes) = self.on.as_deref().and_then(parse_time_to_minutes) {
            light.on_minutes = minutes;
        }
        if let Some(minutes) = self.off.as_deref().and_then(parse_time_to_minutes) {
            light.off_minutes = minutes;
        }
        if let Some(enabled) = self.enabled {
            light.enabled = enabled;
        }
        light.sanitize();
    }
}

impl ChamberUpdate {
    fn apply_to(&self, chamber: &mut ChamberConfig) {
        if let Some(name) = &self.name {
            chamber.name = name.trim().to_string();
        }
        if let Some(value) = self.soil_dry {
            chamber.soil_dry_threshold = value.clamp(0, 100);
        }
        if let Some(value) = self.soil_wet {
            chamber.soil_wet_threshold = value.clamp(0, 100);
        }
        if let Some(value) = self.profile_id {
            chamber.profile_id = value;
        }
    }
}
