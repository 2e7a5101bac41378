use serde::Serialize;
use thiserror::Error;

use crate::{
    config::{ChamberConfig, EnvConfig, GreenhouseConfig, CHAMBER_COUNT, DEFAULT_CHAMBER_NAMES},
    schedule::LightSchedule,
};

/// Index of the "Custom" entry; applying it changes nothing.
pub const CUSTOM_PROFILE_ID: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("unknown grow profile {0}")]
    UnknownProfile(i32),
    #[error("invalid chamber index {0}")]
    InvalidChamber(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChamberPreset {
    #[serde(rename = "soilDry")]
    pub soil_dry: i32,
    #[serde(rename = "soilWet")]
    pub soil_wet: i32,
    pub light: LightSchedule,
}

/// One entry of the fixed preset table. `auto_fan`/`auto_pump` are only written to the
/// configuration when set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GrowProfile {
    pub label: &'static str,
    pub env: EnvConfig,
    pub chambers: [ChamberPreset; CHAMBER_COUNT],
    #[serde(rename = "autoFan")]
    pub auto_fan: Option<bool>,
    #[serde(rename = "autoPump")]
    pub auto_pump: Option<bool>,
}

const fn env(
    fan_on_temp_c: f32,
    fan_off_temp_c: f32,
    fan_hum_on: u8,
    fan_hum_off: u8,
    pump_min_off_sec: u32,
    pump_max_on_sec: u32,
) -> EnvConfig {
    EnvConfig {
        fan_on_temp_c,
        fan_off_temp_c,
        fan_hum_on,
        fan_hum_off,
        pump_min_off_sec,
        pump_max_on_sec,
    }
}

const fn both_chambers(
    soil_dry: i32,
    soil_wet: i32,
    on_minutes: u16,
    off_minutes: u16,
) -> [ChamberPreset; CHAMBER_COUNT] {
    let preset = ChamberPreset {
        soil_dry,
        soil_wet,
        light: LightSchedule {
            on_minutes,
            off_minutes,
            enabled: true,
        },
    };
    [preset, preset]
}

pub static GROW_PROFILES: [GrowProfile; 4] = [
    GrowProfile {
        label: "Custom",
        env: env(28.0, 26.0, 80, 70, 300, 30),
        chambers: both_chambers(35, 45, 8 * 60, 20 * 60),
        auto_fan: None,
        auto_pump: None,
    },
    GrowProfile {
        label: "Seedling",
        env: env(27.0, 25.0, 78, 68, 240, 20),
        chambers: both_chambers(40, 55, 6 * 60, 24 * 60 - 1),
        auto_fan: Some(true),
        auto_pump: Some(true),
    },
    GrowProfile {
        label: "Vegetative",
        env: env(28.0, 26.0, 75, 65, 300, 25),
        chambers: both_chambers(38, 52, 6 * 60, 24 * 60 - 1),
        auto_fan: Some(true),
        auto_pump: Some(true),
    },
    GrowProfile {
        label: "Flowering",
        env: env(27.0, 25.0, 72, 62, 420, 20),
        chambers: both_chambers(35, 50, 8 * 60, 20 * 60),
        auto_fan: Some(true),
        auto_pump: Some(true),
    },
];

pub fn grow_profile(profile_id: i32) -> Result<&'static GrowProfile, ProfileError> {
    usize::try_from(profile_id)
        .ok()
        .and_then(|idx| GROW_PROFILES.get(idx))
        .ok_or(ProfileError::UnknownProfile(profile_id))
}

/// Applies a preset to the whole greenhouse: environment, both chambers with their
/// lights, and the automation flags the preset declares.
pub fn apply_grow_profile(
    config: &mut GreenhouseConfig,
    profile_id: i32,
) -> Result<&'static str, ProfileError> {
    let profile = grow_profile(profile_id)?;
    if profile_id == CUSTOM_PROFILE_ID {
        return Ok(profile.label);
    }

    config.env = profile.env;
    for idx in 0..CHAMBER_COUNT {
        if let Some((chamber, light)) = config.chamber_with_light_mut(idx) {
            apply_chamber_preset(chamber, light, &profile.chambers[idx], profile_id, idx);
        }
    }
    if let Some(auto_fan) = profile.auto_fan {
        config.auto_fan = auto_fan;
    }
    if let Some(auto_pump) = profile.auto_pump {
        config.auto_pump = auto_pump;
    }

    Ok(profile.label)
}

/// Applies a preset to one chamber and the light wired to it. Global settings are left
/// alone.
pub fn apply_grow_profile_to_chamber(
    config: &mut GreenhouseConfig,
    chamber_idx: usize,
    profile_id: i32,
) -> Result<&'static str, ProfileError> {
    let profile = grow_profile(profile_id)?;
    let (chamber, light) = config
        .chamber_with_light_mut(chamber_idx)
        .ok_or(ProfileError::InvalidChamber(chamber_idx))?;
    if profile_id == CUSTOM_PROFILE_ID {
        return Ok(profile.label);
    }

    apply_chamber_preset(
        chamber,
        light,
        &profile.chambers[chamber_idx],
        profile_id,
        chamber_idx,
    );
    Ok(profile.label)
}

fn apply_chamber_preset(
    chamber: &mut ChamberConfig,
    light: &mut LightSchedule,
    preset: &ChamberPreset,
    profile_id: i32,
    chamber_idx: usize,
) {
    chamber.soil_dry_threshold = preset.soil_dry;
    chamber.soil_wet_threshold = preset.soil_wet;
    chamber.profile_id = profile_id;
    chamber.normalize(DEFAULT_CHAMBER_NAMES[chamber_idx]);

    *light = preset.light;
    light.sanitize();
}
