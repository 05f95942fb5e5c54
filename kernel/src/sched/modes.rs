//! Scheduling modes (component G), §4.4.
//!
//! The operation mode is a small vtable with exactly two implementations.
//! Everything that differs between "low latency" and "power saving" is
//! confined to this trait: quantum shape, cache-affinity patience, core
//! selection, and how eagerly a thread gets migrated to rebalance load.

use super::constants::{
    CACHE_EXPIRE_US, LOAD_DIFFERENCE, MEDIUM_LOAD, TARGET_LOAD, VERY_HIGH_LOAD,
};
use alloc::vec::Vec;

/// Per-mode quantum shape. §4.4 / §4.8.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantumParams {
    pub base_quantum_us: u64,
    pub minimal_quantum_us: u64,
    pub quantum_multipliers: [u32; 2],
    pub maximum_latency_us: u64,
}

/// A core's current load, as handed to `choose_core` by the caller. Kept
/// as plain data rather than borrowing `CoreLoadHeaps` directly so mode
/// logic can be unit-tested without constructing real heaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreLoad {
    pub core: u32,
    pub load: u32,
    pub package: u32,
    /// Whether every core of `package` is currently idle.
    pub package_idle: bool,
}

pub trait SchedulingMode {
    fn name(&self) -> &'static str;

    fn quantum_params(&self) -> QuantumParams;

    /// Called when this mode becomes the active mode. The stock modes
    /// carry no private state to reset, so the default is a no-op.
    fn switch_to_mode(&self) {}

    /// Whether a thread that hasn't run in `now - since` microseconds
    /// should be treated as having lost its cache affinity.
    fn has_cache_expired(&self, now: u64, since: u64) -> bool {
        now.saturating_sub(since) >= CACHE_EXPIRE_US
    }

    /// Preferred core for a thread that needs (re)placement, given every
    /// core's current load and package-idle state. `None` only if
    /// `cores` is empty.
    fn choose_core(&self, cores: &[CoreLoad]) -> Option<u32>;

    /// Whether a thread currently assigned to a core under
    /// `current_core_load` should be migrated to one under
    /// `target_core_load` instead. This is the load-comparison core of
    /// `rebalance`; the caller combines it with the thread's own load
    /// contribution and the `LoadDifference` margin.
    fn should_rebalance(&self, current_core_load: u32, target_core_load: u32) -> bool;

    /// Migrate hardware interrupt assignments under this mode's policy.
    /// `idle` is whether the calling CPU is currently idle. The default
    /// no-op is appropriate until IRQ assignment is owned by this crate.
    fn rebalance_irqs(&self, _idle: bool) {}
}

/// Spreads threads across as many cores as possible to minimise queueing
/// latency; rebalances eagerly.
pub struct LowLatencyMode;

impl SchedulingMode for LowLatencyMode {
    fn name(&self) -> &'static str {
        "low_latency"
    }

    fn quantum_params(&self) -> QuantumParams {
        QuantumParams {
            base_quantum_us: 3000,
            minimal_quantum_us: 1000,
            quantum_multipliers: [3, 10],
            maximum_latency_us: 10_000,
        }
    }

    fn choose_core(&self, cores: &[CoreLoad]) -> Option<u32> {
        // Prefer a core on a fully idle package: waking a dormant package
        // costs more than picking a core on one already running.
        if let Some(c) = cores.iter().filter(|c| c.package_idle).min_by_key(|c| c.load) {
            return Some(c.core);
        }
        cores.iter().min_by_key(|c| c.load).map(|c| c.core)
    }

    fn should_rebalance(&self, current_core_load: u32, target_core_load: u32) -> bool {
        current_core_load > target_core_load.saturating_add(LOAD_DIFFERENCE)
    }
}

/// Packs threads onto as few cores as possible, up to `TARGET_LOAD`, so
/// idle cores/packages stay idle; rebalances only when a core is badly
/// overloaded relative to an underused one.
pub struct PowerSavingMode;

impl SchedulingMode for PowerSavingMode {
    fn name(&self) -> &'static str {
        "power_saving"
    }

    fn quantum_params(&self) -> QuantumParams {
        QuantumParams {
            base_quantum_us: 2000,
            minimal_quantum_us: 500,
            quantum_multipliers: [3, 10],
            maximum_latency_us: 20_000,
        }
    }

    fn choose_core(&self, cores: &[CoreLoad]) -> Option<u32> {
        let packed = cores
            .iter()
            .filter(|c| c.load < TARGET_LOAD)
            .max_by_key(|c| c.load);
        if let Some(c) = packed {
            return Some(c.core);
        }
        // No non-idle core has room: rather than waking the least-idle
        // package, prefer the package with the most idle cores, so the
        // fewest packages stay awake overall.
        if let Some(c) = cores.iter().filter(|c| c.package_idle).min_by_key(|c| c.core) {
            return Some(c.core);
        }
        cores.iter().min_by_key(|c| c.load).map(|c| c.core)
    }

    fn should_rebalance(&self, current_core_load: u32, target_core_load: u32) -> bool {
        current_core_load >= VERY_HIGH_LOAD && target_core_load < MEDIUM_LOAD
    }
}

pub fn mode_by_name(name: &str) -> Option<alloc::boxed::Box<dyn SchedulingMode + Send + Sync>> {
    match name {
        "low_latency" => Some(alloc::boxed::Box::new(LowLatencyMode)),
        "power_saving" => Some(alloc::boxed::Box::new(PowerSavingMode)),
        _ => None,
    }
}

/// Build `CoreLoad` entries from bare per-core loads, with every core
/// treated as belonging to its own non-idle package. Used by call sites
/// (and tests) that don't need package-aware placement.
pub fn all_core_loads(loads: &[u32]) -> Vec<CoreLoad> {
    loads
        .iter()
        .enumerate()
        .map(|(core, &load)| CoreLoad { core: core as u32, load, package: core as u32, package_idle: false })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================================
    // Quantum parameters
    // ===========================================================

    #[test]
    fn low_latency_quantum_parameters() {
        let q = LowLatencyMode.quantum_params();
        assert_eq!(q.base_quantum_us, 3000);
        assert_eq!(q.minimal_quantum_us, 1000);
        assert_eq!(q.maximum_latency_us, 10_000);
    }

    #[test]
    fn power_saving_quantum_parameters() {
        let q = PowerSavingMode.quantum_params();
        assert_eq!(q.base_quantum_us, 2000);
        assert_eq!(q.minimal_quantum_us, 500);
        assert_eq!(q.maximum_latency_us, 20_000);
    }

    // ===========================================================
    // Cache expiry
    // ===========================================================

    #[test]
    fn cache_not_expired_immediately() {
        assert!(!LowLatencyMode.has_cache_expired(100, 50));
    }

    #[test]
    fn cache_expired_after_threshold() {
        assert!(LowLatencyMode.has_cache_expired(CACHE_EXPIRE_US + 1, 0));
    }

    // ===========================================================
    // choose_core
    // ===========================================================

    #[test]
    fn low_latency_chooses_least_loaded_core() {
        let cores = all_core_loads(&[500, 100, 900]);
        assert_eq!(LowLatencyMode.choose_core(&cores), Some(1));
    }

    #[test]
    fn power_saving_packs_onto_most_loaded_core_under_target() {
        let cores = all_core_loads(&[0, 400, TARGET_LOAD - 10]);
        assert_eq!(PowerSavingMode.choose_core(&cores), Some(2));
    }

    #[test]
    fn power_saving_falls_back_to_lightest_when_all_above_target() {
        let cores = all_core_loads(&[TARGET_LOAD + 10, TARGET_LOAD + 50]);
        assert_eq!(PowerSavingMode.choose_core(&cores), Some(0));
    }

    #[test]
    fn empty_core_list_has_no_choice() {
        assert_eq!(LowLatencyMode.choose_core(&[]), None);
        assert_eq!(PowerSavingMode.choose_core(&[]), None);
    }

    #[test]
    fn low_latency_prefers_idle_package_over_lighter_busy_core() {
        let cores = alloc::vec![
            CoreLoad { core: 0, load: 10, package: 0, package_idle: false },
            CoreLoad { core: 1, load: 200, package: 1, package_idle: true },
        ];
        assert_eq!(LowLatencyMode.choose_core(&cores), Some(1));
    }

    #[test]
    fn power_saving_prefers_idle_package_when_nothing_fits_under_target() {
        let cores = alloc::vec![
            CoreLoad { core: 0, load: TARGET_LOAD + 50, package: 0, package_idle: false },
            CoreLoad { core: 1, load: 0, package: 1, package_idle: true },
        ];
        assert_eq!(PowerSavingMode.choose_core(&cores), Some(1));
    }

    // ===========================================================
    // should_rebalance
    // ===========================================================

    #[test]
    fn low_latency_rebalances_on_moderate_imbalance() {
        assert!(LowLatencyMode.should_rebalance(TARGET_LOAD, TARGET_LOAD / 4));
    }

    #[test]
    fn low_latency_does_not_rebalance_when_close() {
        assert!(!LowLatencyMode.should_rebalance(TARGET_LOAD, TARGET_LOAD - 10));
    }

    #[test]
    fn power_saving_only_rebalances_on_severe_imbalance() {
        assert!(!PowerSavingMode.should_rebalance(TARGET_LOAD, TARGET_LOAD / 4));
        assert!(PowerSavingMode.should_rebalance(VERY_HIGH_LOAD, 10));
    }

    // ===========================================================
    // Lookup by name
    // ===========================================================

    #[test]
    fn mode_by_name_resolves_known_modes() {
        assert_eq!(mode_by_name("low_latency").unwrap().name(), "low_latency");
        assert_eq!(mode_by_name("power_saving").unwrap().name(), "power_saving");
    }

    #[test]
    fn mode_by_name_rejects_unknown() {
        assert!(mode_by_name("turbo").is_none());
    }

    // ===========================================================
    // switch_to_mode / rebalance_irqs
    // ===========================================================

    #[test]
    fn default_switch_to_mode_and_rebalance_irqs_are_callable() {
        LowLatencyMode.switch_to_mode();
        PowerSavingMode.switch_to_mode();
        LowLatencyMode.rebalance_irqs(true);
        PowerSavingMode.rebalance_irqs(false);
    }
}
