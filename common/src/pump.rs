use crate::config::{ChamberConfig, EnvConfig, CHAMBER_COUNT};

/// How long a chamber must stay dry before the pump starts.
pub const PUMP_TRIGGER_HOLD_MS: u64 = 120_000;

/// Set of chambers, bit 0 for chamber 1 and bit 1 for chamber 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChamberMask(u8);

impl ChamberMask {
    pub const EMPTY: ChamberMask = ChamberMask(0);
    pub const CHAMBER_1: ChamberMask = ChamberMask(0x01);
    pub const CHAMBER_2: ChamberMask = ChamberMask(0x02);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, chamber_idx: usize) -> bool {
        chamber_idx < CHAMBER_COUNT && self.0 & (1 << chamber_idx) != 0
    }

    pub fn insert(&mut self, chamber_idx: usize) {
        if chamber_idx < CHAMBER_COUNT {
            self.0 |= 1 << chamber_idx;
        }
    }

    fn matching(predicate: impl Fn(usize) -> bool) -> Self {
        let mut mask = Self::EMPTY;
        for idx in 0..CHAMBER_COUNT {
            if predicate(idx) {
                mask.insert(idx);
            }
        }
        mask
    }
}

/// Inputs the pump needs from the rest of the controller for one tick.
#[derive(Debug, Clone, Copy)]
pub struct PumpInputs<'a> {
    pub automatic: bool,
    pub soil: [u8; CHAMBER_COUNT],
    pub chambers: [&'a ChamberConfig; CHAMBER_COUNT],
    pub env: &'a EnvConfig,
}

/// Runtime state of the pump cycle. Kept apart from the relay so a manual toggle does
/// not disturb an automatic cycle's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpController {
    running: bool,
    start_ms: u64,
    last_stop_ms: Option<u64>,
    active_dry_mask: ChamberMask,
    dry_start_ms: Option<u64>,
}

impl PumpController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn active_dry_mask(&self) -> ChamberMask {
        self.active_dry_mask
    }

    /// Runs one pump decision. Returns `Some(on)` when the cycle starts or stops the
    /// pump, `None` when the relay should be left alone.
    pub fn tick(&mut self, inputs: &PumpInputs<'_>, now_ms: u64) -> Option<bool> {
        if !inputs.automatic {
            self.dry_start_ms = None;
            return None;
        }

        if self.running {
            return self.check_stop(inputs, now_ms);
        }

        let dry = ChamberMask::matching(|idx| inputs.chambers[idx].is_dry(inputs.soil[idx]));
        if dry.is_empty() {
            self.dry_start_ms = None;
            return None;
        }

        let dry_since = *self.dry_start_ms.get_or_insert(now_ms);
        let hold_met = now_ms.wrapping_sub(dry_since) >= PUMP_TRIGGER_HOLD_MS;
        if !hold_met || !self.min_off_met(inputs.env, now_ms) {
            return None;
        }

        self.running = true;
        self.start_ms = now_ms;
        self.active_dry_mask = dry;
        Some(true)
    }

    fn check_stop(&mut self, inputs: &PumpInputs<'_>, now_ms: u64) -> Option<bool> {
        let satisfied = (0..CHAMBER_COUNT).all(|idx| {
            !self.active_dry_mask.contains(idx) || inputs.chambers[idx].is_wet(inputs.soil[idx])
        });
        let max_on_ms = u64::from(inputs.env.pump_max_on_sec) * 1000;
        let max_on_elapsed = now_ms.wrapping_sub(self.start_ms) > max_on_ms;

        if !satisfied && !max_on_elapsed {
            return None;
        }

        self.running = false;
        self.last_stop_ms = Some(now_ms);
        self.active_dry_mask = ChamberMask::EMPTY;
        self.dry_start_ms = None;
        Some(false)
    }

    fn min_off_met(&self, env: &EnvConfig, now_ms: u64) -> bool {
        let min_off_ms = u64::from(env.pump_min_off_sec) * 1000;
        self.last_stop_ms
            .map_or(true, |stop| now_ms.wrapping_sub(stop) > min_off_ms)
    }

    pub fn runtime_ms(&self, now_ms: u64) -> u64 {
        if self.running {
            now_ms.wrapping_sub(self.start_ms)
        } else {
            0
        }
    }

    pub fn cooldown_remaining_ms(&self, env: &EnvConfig, now_ms: u64) -> u64 {
        let min_off_ms = u64::from(env.pump_min_off_sec) * 1000;
        match self.last_stop_ms {
            Some(stop) if !self.running => min_off_ms.saturating_sub(now_ms.wrapping_sub(stop)),
            _ => 0,
        }
    }

    pub fn dry_hold_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.dry_start_ms
            .map(|start| PUMP_TRIGGER_HOLD_MS.saturating_sub(now_ms.wrapping_sub(start)))
    }
}
