//! Per-CPU, per-core, and per-package scheduling state (component F).
//!
//! These are plain data structures with no internal locking: the top
//! level scheduler owns one of each behind the lock granularity §5
//! describes (per-core run-queue lock, per-core CPU-heap lock, a single
//! process-wide core-heaps lock, per-package core-list lock). Keeping
//! locks out of this module lets the placement logic in `pipeline` be
//! unit-tested against plain values.

use super::constants::{HIGH_LOAD, IDLE_PRIORITY, MEDIUM_LOAD};
use super::heap::IndexedHeap;
use super::load::LoadTracker;
use super::queue::RunQueue;
use super::thread::ThreadId;
use alloc::vec::Vec;

/// One logical CPU. Tracks what placement and preemption need to know
/// about the thread currently sitting on it, plus its own pinned run
/// queue (§3/§4.1): threads affined to exactly this CPU via
/// `cpu_mask` bypass the core's shared queue entirely and live here.
pub struct CpuEntry {
    pub id: u32,
    pub core: u32,
    pub running: Option<ThreadId>,
    pub running_priority: u32,
    pub enabled: bool,
    /// This CPU's pinned run queue.
    pub pinned_queue: RunQueue<ThreadId>,
    pub pinned_thread_count: u32,
    /// This CPU's own load measurement, independent of its siblings';
    /// summed into the parent core's aggregate (§3, §4.2).
    pub load: LoadTracker,
    /// Handle of the quantum timer currently armed for this CPU, if any.
    pub pending_timer: Option<u64>,
}

impl CpuEntry {
    pub fn new(id: u32, core: u32) -> Self {
        Self {
            id,
            core,
            running: None,
            running_priority: IDLE_PRIORITY,
            enabled: true,
            pinned_queue: RunQueue::new(),
            pinned_thread_count: 0,
            load: LoadTracker::new(),
            pending_timer: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_none() || self.running_priority == IDLE_PRIORITY
    }

    pub fn set_running(&mut self, thread: ThreadId, priority: u32) {
        self.running = Some(thread);
        self.running_priority = priority;
    }

    pub fn clear_running(&mut self) {
        self.running = None;
        self.running_priority = IDLE_PRIORITY;
    }
}

/// One physical core: its run queue, the heap of its CPUs keyed by the
/// priority each is currently running (lowest first, so the least
/// important running thread is the preemption target), its load, and its
/// starvation counter.
pub struct CoreEntry {
    pub id: u32,
    pub package: u32,
    pub run_queue: RunQueue<ThreadId>,
    /// Min-heap of this core's CPUs, keyed by `running_priority`.
    pub cpu_heap: IndexedHeap<u32, u32>,
    pub load: LoadTracker,
    /// Incremented whenever the head of the run queue, or an idle thread,
    /// is dequeued in its place — i.e. whenever something ran ahead of
    /// what should have. Gates penalty cancellation (§4.9).
    pub starvation_counter: u64,
    pub thread_count: u32,
}

impl CoreEntry {
    pub fn new(id: u32, package: u32) -> Self {
        Self {
            id,
            package,
            run_queue: RunQueue::new(),
            cpu_heap: IndexedHeap::new(false),
            load: LoadTracker::new(),
            starvation_counter: 0,
            thread_count: 0,
        }
    }

    pub fn record_starvation(&mut self) {
        self.starvation_counter += 1;
    }

    /// CPU on this core currently running the lowest-priority thread;
    /// the natural preemption/placement target.
    pub fn least_important_cpu(&self) -> Option<(u32, u32)> {
        self.cpu_heap.peek().map(|(priority, cpu)| (cpu, priority))
    }
}

/// A package (socket) and the cores belonging to it.
pub struct PackageEntry {
    pub id: u32,
    pub cores: Vec<u32>,
    idle_cores: Vec<u32>,
}

impl PackageEntry {
    pub fn new(id: u32, cores: Vec<u32>) -> Self {
        let idle_cores = cores.clone();
        Self { id, cores, idle_cores }
    }

    pub fn is_idle(&self) -> bool {
        self.idle_cores.len() == self.cores.len()
    }

    pub fn mark_core_active(&mut self, core: u32) {
        self.idle_cores.retain(|&c| c != core);
    }

    pub fn mark_core_idle(&mut self, core: u32) {
        if !self.idle_cores.contains(&core) {
            self.idle_cores.push(core);
        }
    }

    pub fn idle_core_count(&self) -> usize {
        self.idle_cores.len()
    }
}

/// The global pair of core-load heaps: cores below `HIGH_LOAD` and cores
/// at or above it, kept separate so `choose_core` can prefer an
/// under-loaded core without scanning every one. Mirrors the
/// two-bucket split the original scheduler's load balancer uses.
pub struct CoreLoadHeaps {
    below_high: IndexedHeap<u32, u32>,
    at_or_above_high: IndexedHeap<u32, u32>,
}

impl CoreLoadHeaps {
    pub fn new() -> Self {
        Self { below_high: IndexedHeap::new(false), at_or_above_high: IndexedHeap::new(false) }
    }

    pub fn insert(&mut self, core: u32, load: u32) {
        if load < HIGH_LOAD {
            self.below_high.push(load, core);
        } else {
            self.at_or_above_high.push(load, core);
        }
    }

    /// Move `core`'s entry to reflect `new_load`, migrating it between
    /// buckets if it crossed the hysteresis band. Promotion into the
    /// high-load bucket happens at `HIGH_LOAD`; demotion back out only
    /// happens once load drops below `MEDIUM_LOAD`, so a core hovering
    /// between the two thresholds doesn't flap between buckets every
    /// sample.
    pub fn update_load(&mut self, core: u32, new_load: u32) {
        let was_below = self.below_high.contains(core);
        let was_above = self.at_or_above_high.contains(core);

        let now_below = if was_above { new_load < MEDIUM_LOAD } else { new_load < HIGH_LOAD };

        if was_below && now_below {
            self.below_high.modify_key(core, new_load);
        } else if was_above && !now_below {
            self.at_or_above_high.modify_key(core, new_load);
        } else if was_below {
            self.below_high.remove(core);
            self.at_or_above_high.push(new_load, core);
        } else if was_above {
            self.at_or_above_high.remove(core);
            self.below_high.push(new_load, core);
        } else {
            self.insert(core, new_load);
        }
    }

    /// Lightest loaded core among those below `HIGH_LOAD`, if any.
    pub fn lightest_below_high(&self) -> Option<(u32, u32)> {
        self.below_high.peek().map(|(load, core)| (core, load))
    }

    /// Lightest loaded core overall, falling back to the high-load bucket
    /// when every core has crossed the threshold.
    pub fn lightest_overall(&self) -> Option<(u32, u32)> {
        self.lightest_below_high()
            .or_else(|| self.at_or_above_high.peek().map(|(load, core)| (core, load)))
    }
}

impl Default for CoreLoadHeaps {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================================
    // CpuEntry
    // ===========================================================

    #[test]
    fn fresh_cpu_is_idle() {
        let cpu = CpuEntry::new(0, 0);
        assert!(cpu.is_idle());
    }

    #[test]
    fn cpu_running_a_thread_is_not_idle() {
        let mut cpu = CpuEntry::new(0, 0);
        cpu.set_running(ThreadId::new(1), 50);
        assert!(!cpu.is_idle());
        assert_eq!(cpu.running_priority, 50);
    }

    #[test]
    fn clearing_running_restores_idle() {
        let mut cpu = CpuEntry::new(0, 0);
        cpu.set_running(ThreadId::new(1), 50);
        cpu.clear_running();
        assert!(cpu.is_idle());
        assert_eq!(cpu.running_priority, IDLE_PRIORITY);
    }

    // ===========================================================
    // CoreEntry
    // ===========================================================

    #[test]
    fn least_important_cpu_finds_lowest_priority() {
        let mut core = CoreEntry::new(0, 0);
        core.cpu_heap.push(50, 0);
        core.cpu_heap.push(10, 1);
        core.cpu_heap.push(80, 2);
        assert_eq!(core.least_important_cpu(), Some((1, 10)));
    }

    #[test]
    fn starvation_counter_increments() {
        let mut core = CoreEntry::new(0, 0);
        core.record_starvation();
        core.record_starvation();
        assert_eq!(core.starvation_counter, 2);
    }

    // ===========================================================
    // PackageEntry
    // ===========================================================

    #[test]
    fn fresh_package_is_fully_idle() {
        let pkg = PackageEntry::new(0, alloc::vec![0, 1]);
        assert!(pkg.is_idle());
        assert_eq!(pkg.idle_core_count(), 2);
    }

    #[test]
    fn marking_core_active_reduces_idle_count() {
        let mut pkg = PackageEntry::new(0, alloc::vec![0, 1]);
        pkg.mark_core_active(0);
        assert!(!pkg.is_idle());
        assert_eq!(pkg.idle_core_count(), 1);
    }

    #[test]
    fn marking_core_idle_again_restores_full_idle() {
        let mut pkg = PackageEntry::new(0, alloc::vec![0, 1]);
        pkg.mark_core_active(0);
        pkg.mark_core_idle(0);
        assert!(pkg.is_idle());
    }

    // ===========================================================
    // CoreLoadHeaps
    // ===========================================================

    #[test]
    fn lightest_below_high_prefers_lowest_load() {
        let mut heaps = CoreLoadHeaps::new();
        heaps.insert(0, 100);
        heaps.insert(1, 50);
        heaps.insert(2, 200);
        assert_eq!(heaps.lightest_below_high(), Some((1, 50)));
    }

    #[test]
    fn core_crossing_high_load_moves_buckets() {
        let mut heaps = CoreLoadHeaps::new();
        heaps.insert(0, 100);
        heaps.update_load(0, HIGH_LOAD + 50);
        assert_eq!(heaps.lightest_below_high(), None);
        assert_eq!(heaps.lightest_overall(), Some((0, HIGH_LOAD + 50)));
    }

    #[test]
    fn core_dropping_below_high_load_moves_back() {
        let mut heaps = CoreLoadHeaps::new();
        heaps.insert(0, HIGH_LOAD + 50);
        heaps.update_load(0, 10);
        assert_eq!(heaps.lightest_below_high(), Some((0, 10)));
    }

    #[test]
    fn lightest_overall_falls_back_when_all_high() {
        let mut heaps = CoreLoadHeaps::new();
        heaps.insert(0, HIGH_LOAD + 10);
        heaps.insert(1, HIGH_LOAD + 5);
        assert_eq!(heaps.lightest_overall(), Some((1, HIGH_LOAD + 5)));
    }

    #[test]
    fn core_between_medium_and_high_does_not_demote() {
        // A core that crossed into the high bucket, then dropped to a
        // load between MEDIUM_LOAD and HIGH_LOAD, must stay in the high
        // bucket until it drops below MEDIUM_LOAD.
        let mut heaps = CoreLoadHeaps::new();
        heaps.insert(0, HIGH_LOAD + 50);
        heaps.update_load(0, (MEDIUM_LOAD + HIGH_LOAD) / 2);
        assert_eq!(heaps.lightest_below_high(), None);
        assert_eq!(heaps.lightest_overall(), Some((0, (MEDIUM_LOAD + HIGH_LOAD) / 2)));

        heaps.update_load(0, MEDIUM_LOAD - 1);
        assert_eq!(heaps.lightest_below_high(), Some((0, MEDIUM_LOAD - 1)));
    }

    #[test]
    fn cpu_entry_has_own_pinned_queue_and_load() {
        let cpu = CpuEntry::new(0, 0);
        assert!(cpu.pinned_queue.is_empty());
        assert_eq!(cpu.pinned_thread_count, 0);
        assert!(cpu.pending_timer.is_none());
    }
}
