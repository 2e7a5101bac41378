use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: i32 = 24 * 60;
pub const DEFAULT_LIGHT_ON_MINUTES: u16 = 8 * 60;
pub const DEFAULT_LIGHT_OFF_MINUTES: u16 = 20 * 60;

/// Daily on/off window for one light. `enabled` means the control cycle follows the
/// window; otherwise the light is under manual control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightSchedule {
    pub on_minutes: u16,
    pub off_minutes: u16,
    pub enabled: bool,
}

impl Default for LightSchedule {
    fn default() -> Self {
        Self {
            on_minutes: DEFAULT_LIGHT_ON_MINUTES,
            off_minutes: DEFAULT_LIGHT_OFF_MINUTES,
            enabled: false,
        }
    }
}

impl LightSchedule {
    pub fn is_on_at(&self, now_minutes: i32) -> bool {
        schedule_is_on(
            i32::from(self.on_minutes),
            i32::from(self.off_minutes),
            now_minutes,
        )
    }

    /// Clamps both times into the day and replaces a zero-length window with the
    /// default 08:00-20:00 window. Returns whether anything changed.
    pub fn sanitize(&mut self) -> bool {
        let before = *self;
        let last_minute = (MINUTES_PER_DAY - 1) as u16;
        self.on_minutes = self.on_minutes.min(last_minute);
        self.off_minutes = self.off_minutes.min(last_minute);
        if self.on_minutes == self.off_minutes {
            self.on_minutes = DEFAULT_LIGHT_ON_MINUTES;
            self.off_minutes = DEFAULT_LIGHT_OFF_MINUTES;
        }
        *self != before
    }

    pub fn window_label(&self) -> String {
        format!(
            "{}\u{2013}{}",
            minutes_to_time_str(i32::from(self.on_minutes)),
            minutes_to_time_str(i32::from(self.off_minutes))
        )
    }
}

/// Whether a light with the given window is on at `now_min`. All inputs are taken
/// modulo one day. A window whose start equals its end is always off.
pub fn schedule_is_on(on_min: i32, off_min: i32, now_min: i32) -> bool {
    let on_min = on_min.rem_euclid(MINUTES_PER_DAY);
    let off_min = off_min.rem_euclid(MINUTES_PER_DAY);
    let now_min = now_min.rem_euclid(MINUTES_PER_DAY);

    if on_min == off_min {
        return false;
    }

    if on_min < off_min {
        (on_min..off_min).contains(&now_min)
    } else {
        // Window crosses midnight.
        now_min >= on_min || now_min < off_min
    }
}

pub fn minutes_to_time_str(minutes: i32) -> String {
    let minutes = minutes.max(0) % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Parses `HH:MM` into minutes since midnight.
pub fn parse_time_to_minutes(value: &str) -> Option<u16> {
    let (hours, minutes) = value.trim().split_once(':')?;
    let hours = hours.trim().parse::<u16>().ok()?;
    let minutes = minutes.trim().parse::<u16>().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}
