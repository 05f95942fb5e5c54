//! Tunable constants for the scheduler core.
//!
//! Grouped in one place the way the original `scheduler_common.h` groups
//! them, rather than threaded through as runtime configuration.

/// Number of priority bands, `0..MAX_PRIORITY` (exclusive upper bound is
/// `MAX_PRIORITY + 1` distinct bands).
pub const MAX_PRIORITY: u32 = 120;

/// Priority below which a thread is considered idle-class.
pub const LOWEST_ACTIVE_PRIORITY: u32 = 1;

/// First priority value reserved for real-time threads.
pub const FIRST_REAL_TIME_PRIORITY: u32 = 100;

/// Priority assigned to the per-CPU idle thread.
pub const IDLE_PRIORITY: u32 = 0;

/// Fixed-point scale for load values (0..MAX_LOAD represents 0%..100%).
pub const MAX_LOAD: u32 = 1000;

/// Sliding window length for load measurement, in microseconds.
pub const LOAD_WINDOW_US: u64 = 1_000_000;

/// Thresholds, expressed as fractions of `MAX_LOAD`.
pub const LOW_LOAD: u32 = MAX_LOAD * 20 / 100;
pub const MEDIUM_LOAD: u32 = MAX_LOAD * 40 / 100;
pub const TARGET_LOAD: u32 = MAX_LOAD * 55 / 100;
pub const HIGH_LOAD: u32 = MAX_LOAD * 70 / 100;
pub const VERY_HIGH_LOAD: u32 = (MAX_LOAD + HIGH_LOAD) / 2;
pub const LOAD_DIFFERENCE: u32 = MAX_LOAD * 20 / 100;

/// Active time, since the thread went to sleep, after which the core it
/// last ran on is considered to no longer hold its working set (micros).
pub const CACHE_EXPIRE_US: u64 = 100_000;

/// Penalty floor divisor: the penalty floor is `base_priority / PENALTY_DIVISOR`.
pub const PENALTY_DIVISOR: u32 = 5;

/// Upper bound on the penalty floor.
pub const MAXIMAL_PENALTY_FLOOR: u32 = 25;

/// Quantum table is indexed by thread count on a core, capped here.
pub const MAX_QUANTUM_TABLE_THREADS: usize = 20;

/// Fixed-point scale used by `get_loadavg` (matches the historic
/// `FSCALE = 1 << 11` used by BSD-derived load average reporting).
pub const LOADAVG_FSHIFT: u32 = 11;
pub const LOADAVG_FSCALE: i64 = 1 << LOADAVG_FSHIFT;

/// Load average sampling period, in microseconds (5 seconds).
pub const LOADAVG_PERIOD_US: u64 = 5_000_000;
