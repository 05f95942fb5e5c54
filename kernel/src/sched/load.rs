//! Load tracker (component C) and the load-average decay law exposed by
//! `get_loadavg` (§6).

use super::constants::{LOADAVG_FSCALE, LOADAVG_FSHIFT, LOAD_WINDOW_US, MAX_LOAD};

/// Sliding-window load estimate for a thread, CPU, or core.
///
/// `update` is the tracker function from §4.2: it folds active time
/// accumulated since `measure_time` into a new `load` value once the
/// window has closed, and otherwise reports "no update" so callers don't
/// treat a stale `load` as freshly computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadTracker {
    pub measure_time: u64,
    pub measure_active_time: u64,
    pub load: u32,
}

impl LoadTracker {
    pub const fn new() -> Self {
        Self { measure_time: 0, measure_active_time: 0, load: 0 }
    }

    /// Record `micros` of active time inside the current window.
    pub fn add_active(&mut self, micros: u64) {
        self.measure_active_time += micros;
    }

    /// Close the window if due. Returns `true` iff `load` was updated.
    pub fn update(&mut self, now: u64) -> bool {
        let elapsed = now.saturating_sub(self.measure_time);
        if elapsed < LOAD_WINDOW_US {
            return false;
        }
        let new_load = if elapsed == 0 {
            0
        } else {
            ((self.measure_active_time as u128 * MAX_LOAD as u128) / elapsed as u128) as u32
        };
        self.load = new_load.min(MAX_LOAD);
        self.measure_time = now;
        self.measure_active_time = 0;
        true
    }
}

/// Unix-style 1/5/15-minute exponentially decaying load average, fixed
/// point scaled by `LOADAVG_FSCALE`, decayed once per
/// `constants::LOADAVG_PERIOD_US` (nominally 5 seconds).
///
/// Decay constants are `exp(-period/window)` for window = 60s, 300s,
/// 900s, pre-scaled into the same fixed point as the original
/// `scheduler_load.cpp`'s `sCExp` table.
pub struct LoadAverage {
    ldavg: [i64; 3],
}

const DECAY: [i64; 3] = [1884, 2014, 2037];

impl LoadAverage {
    pub const fn new() -> Self {
        Self { ldavg: [0; 3] }
    }

    /// Fold one sample of `runnable_count` (the already-computed
    /// `sum_over_cores(thread_count) - 1` from §6) into the three
    /// averages.
    pub fn sample(&mut self, runnable_count: i64) {
        for i in 0..3 {
            self.ldavg[i] = (DECAY[i] * self.ldavg[i]
                + runnable_count * LOADAVG_FSCALE * (LOADAVG_FSCALE - DECAY[i]))
                >> LOADAVG_FSHIFT;
        }
    }

    /// Current `{ldavg[3], fscale}` as exposed by `get_loadavg`.
    pub fn snapshot(&self) -> ([i64; 3], i64) {
        (self.ldavg, LOADAVG_FSCALE)
    }
}

impl Default for LoadAverage {
    fn default() -> Self {
        Self::new()
    }
}
