//! Thread scheduling state (component E).
//!
//! Holds the dynamic priority bookkeeping, quantum accounting, sleep
//! history, and run-queue link for one schedulable thread. Unlike the
//! wholesale `Thread` control block this module used to define, this is
//! only the slice the scheduler core itself needs; the rest of a thread's
//! identity (address space, registers, exit state) belongs to whatever
//! owns the thread table, not to this crate.

use super::constants::{
    FIRST_REAL_TIME_PRIORITY, IDLE_PRIORITY, LOWEST_ACTIVE_PRIORITY, MAXIMAL_PENALTY_FLOOR,
    PENALTY_DIVISOR,
};
use super::load::LoadTracker;
use super::queue::{Link, LinkStore};
use hashbrown::HashMap;

/// Opaque handle into whatever arena owns `ThreadSchedulingState` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl ThreadId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Dynamic scheduling state for one thread. §3, §4.8, §4.9.
#[derive(Clone, Copy, Debug)]
pub struct ThreadSchedulingState {
    pub id: ThreadId,

    /// Priority a thread was created or re-niced with. Never mutated by
    /// the penalty model.
    pub base_priority: u32,
    /// Short-term penalty, incremented every time a quantum is used up
    /// without the thread sleeping. Capped so it can never by itself push
    /// the effective priority below this thread's penalty floor.
    pub priority_penalty: u32,
    /// Long-term penalty, wrapped modulo the penalty floor once
    /// `priority_penalty` alone has saturated.
    pub additional_penalty: u32,

    /// Quantum currently assigned to this thread, in microseconds.
    /// Copied from the active mode (possibly scaled by thread count) each
    /// time a fresh quantum starts.
    pub base_quantum: u64,
    /// Microseconds of quantum remaining.
    pub time_left: i64,
    /// Quantum time this thread was preempted out of and is owed back on
    /// its next run.
    pub stolen_time: u64,
    /// Timestamp the current quantum began.
    pub quantum_start: u64,

    /// Timestamp this thread last went to sleep (blocked or yielded).
    pub went_sleep: u64,
    /// `measure_active_time` of its core at the moment it went to sleep,
    /// used to judge whether the core was idle while it slept.
    pub went_sleep_active: u64,
    /// The core's starvation counter at the moment it went to sleep; if
    /// unchanged by the time it wakes, no other thread was starved.
    pub went_sleep_count: u64,

    pub load: LoadTracker,

    /// Core this thread is currently assigned to, if any.
    pub core: Option<u32>,
    /// Whether this thread currently sits in a run queue.
    pub enqueued: bool,
    /// CPU affinity mask; `None` means "any CPU".
    pub cpu_mask: Option<u64>,
    pub is_idle: bool,

    link: Link<ThreadId>,
}

impl ThreadSchedulingState {
    pub fn new(id: ThreadId, base_priority: u32) -> Self {
        Self {
            id,
            base_priority,
            priority_penalty: 0,
            additional_penalty: 0,
            base_quantum: 0,
            time_left: 0,
            stolen_time: 0,
            quantum_start: 0,
            went_sleep: 0,
            went_sleep_active: 0,
            went_sleep_count: 0,
            load: LoadTracker::new(),
            core: None,
            enqueued: false,
            cpu_mask: None,
            is_idle: false,
            link: Link::default(),
        }
    }

    pub fn new_idle(id: ThreadId) -> Self {
        let mut state = Self::new(id, IDLE_PRIORITY);
        state.is_idle = true;
        state
    }

    pub fn is_real_time(&self) -> bool {
        self.base_priority >= FIRST_REAL_TIME_PRIORITY
    }

    /// Lowest priority this thread's penalty is allowed to push it to.
    /// Real-time and idle threads have no floor to speak of: the former
    /// are never penalised, the latter always runs at `IDLE_PRIORITY`.
    fn penalty_floor(base_priority: u32) -> u32 {
        (base_priority / PENALTY_DIVISOR).clamp(LOWEST_ACTIVE_PRIORITY, MAXIMAL_PENALTY_FLOOR)
    }

    /// Recompute and return the effective priority used for run-queue
    /// placement and CPU-heap ordering. §4.9: `priority_penalty` is
    /// subtracted first; only once that alone would breach the floor does
    /// `additional_penalty` (taken modulo the floor) apply on top.
    pub fn effective_priority(&self) -> u32 {
        if self.is_idle {
            return IDLE_PRIORITY;
        }
        if self.is_real_time() {
            return self.base_priority;
        }

        let floor = Self::penalty_floor(self.base_priority);
        let after_priority_penalty = self.base_priority.saturating_sub(self.priority_penalty);

        if after_priority_penalty > floor {
            after_priority_penalty
        } else {
            let additional = if floor > 0 { self.additional_penalty % floor } else { 0 };
            floor.saturating_sub(additional).max(LOWEST_ACTIVE_PRIORITY)
        }
    }

    /// Record that a full quantum was used without the thread blocking.
    /// Increments `priority_penalty` until it would breach this thread's
    /// floor, then rolls further increments into `additional_penalty`
    /// modulo the floor instead.
    pub fn increase_penalty(&mut self) {
        if self.is_real_time() || self.is_idle {
            return;
        }
        let floor = Self::penalty_floor(self.base_priority);
        let max_priority_penalty = self.base_priority.saturating_sub(floor);

        if self.priority_penalty < max_priority_penalty {
            self.priority_penalty += 1;
        } else {
            self.priority_penalty = max_priority_penalty;
            self.additional_penalty =
                if floor > 0 { (self.additional_penalty + 1) % floor } else { 0 };
        }
    }

    pub fn cancel_penalty(&mut self) {
        self.priority_penalty = 0;
        self.additional_penalty = 0;
    }

    /// §4.9: a thread that slept longer than one base quantum, with no
    /// starvation observed on its core in the meantime, gets a clean
    /// slate rather than carrying a stale penalty into its next run.
    pub fn should_cancel_penalty(&self, now: u64, current_starvation_count: u64) -> bool {
        let slept = now.saturating_sub(self.went_sleep);
        slept > self.base_quantum && current_starvation_count == self.went_sleep_count
    }

    pub fn go_to_sleep(&mut self, now: u64, core_active_time: u64, starvation_count: u64) {
        self.went_sleep = now;
        self.went_sleep_active = core_active_time;
        self.went_sleep_count = starvation_count;
        self.enqueued = false;
    }

    /// Begin a fresh quantum of `length` microseconds at `now`, folding in
    /// any time this thread was owed back from a preemption.
    pub fn start_quantum(&mut self, now: u64, length: u64) {
        self.base_quantum = length;
        self.time_left = (length + self.stolen_time) as i64;
        self.stolen_time = 0;
        self.quantum_start = now;
    }

    /// Consume `elapsed` microseconds of run time. Returns `true` once the
    /// quantum has been used up.
    pub fn tick(&mut self, elapsed: u64) -> bool {
        self.time_left -= elapsed as i64;
        self.time_left <= 0
    }

    pub fn has_quantum_ended(&self) -> bool {
        self.time_left <= 0
    }

    /// Preempted before the quantum ran out; bank the remainder to be
    /// returned on the next `start_quantum`.
    pub fn preempt(&mut self) {
        if self.time_left > 0 {
            self.stolen_time += self.time_left as u64;
        }
        self.time_left = 0;
    }
}

impl ThreadSchedulingState {
    pub(crate) fn raw_link(&self) -> Link<ThreadId> {
        self.link
    }

    pub(crate) fn set_raw_link(&mut self, link: Link<ThreadId>) {
        self.link = link;
    }
}

/// The arena `RunQueue`s and `IndexedHeap`s index into: every thread this
/// scheduler currently knows about, keyed by id.
#[derive(Default)]
pub struct ThreadTable {
    threads: HashMap<ThreadId, ThreadSchedulingState>,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self { threads: HashMap::new() }
    }

    pub fn insert(&mut self, state: ThreadSchedulingState) {
        self.threads.insert(state.id, state);
    }

    pub fn remove(&mut self, id: ThreadId) -> Option<ThreadSchedulingState> {
        self.threads.remove(&id)
    }

    pub fn get(&self, id: ThreadId) -> Option<&ThreadSchedulingState> {
        self.threads.get(&id)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut ThreadSchedulingState> {
        self.threads.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

impl LinkStore<ThreadId> for ThreadTable {
    fn link(&self, key: ThreadId) -> Link<ThreadId> {
        self.threads.get(&key).map(|t| t.raw_link()).unwrap_or_default()
    }

    fn set_link(&mut self, key: ThreadId, link: Link<ThreadId>) {
        if let Some(t) = self.threads.get_mut(&key) {
            t.set_raw_link(link);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_thread(id: u32, base_priority: u32) -> ThreadSchedulingState {
        ThreadSchedulingState::new(ThreadId::new(id), base_priority)
    }

    // ===========================================================
    // Effective priority
    // ===========================================================

    #[test]
    fn fresh_thread_effective_priority_equals_base() {
        let t = create_test_thread(1, 50);
        assert_eq!(t.effective_priority(), 50);
    }

    #[test]
    fn idle_thread_is_always_idle_priority() {
        let t = ThreadSchedulingState::new_idle(ThreadId::new(1));
        assert_eq!(t.effective_priority(), IDLE_PRIORITY);
    }

    #[test]
    fn real_time_thread_ignores_penalty() {
        let mut t = create_test_thread(1, FIRST_REAL_TIME_PRIORITY + 5);
        for _ in 0..50 {
            t.increase_penalty();
        }
        assert_eq!(t.effective_priority(), FIRST_REAL_TIME_PRIORITY + 5);
    }

    // ===========================================================
    // Penalty accumulation and flooring
    // ===========================================================

    #[test]
    fn increase_penalty_lowers_effective_priority() {
        let mut t = create_test_thread(1, 50);
        t.increase_penalty();
        assert_eq!(t.effective_priority(), 49);
    }

    #[test]
    fn penalty_never_drives_priority_below_floor() {
        let mut t = create_test_thread(1, 50);
        for _ in 0..1000 {
            t.increase_penalty();
        }
        assert!(t.effective_priority() >= LOWEST_ACTIVE_PRIORITY);
    }

    #[test]
    fn additional_penalty_only_applies_once_priority_penalty_saturates() {
        let mut t = create_test_thread(1, 50);
        let floor = ThreadSchedulingState::penalty_floor(50);
        let steps_to_floor = 50 - floor;
        for _ in 0..steps_to_floor {
            t.increase_penalty();
        }
        assert_eq!(t.priority_penalty, steps_to_floor);
        assert_eq!(t.additional_penalty, 0);

        t.increase_penalty();
        assert_eq!(t.priority_penalty, steps_to_floor);
        assert_eq!(t.additional_penalty, 1);
    }

    #[test]
    fn cancel_penalty_clears_both_counters() {
        let mut t = create_test_thread(1, 50);
        for _ in 0..100 {
            t.increase_penalty();
        }
        t.cancel_penalty();
        assert_eq!(t.priority_penalty, 0);
        assert_eq!(t.additional_penalty, 0);
        assert_eq!(t.effective_priority(), 50);
    }

    // ===========================================================
    // Sleep-driven penalty cancellation
    // ===========================================================

    #[test]
    fn should_cancel_penalty_after_long_sleep_without_starvation() {
        let mut t = create_test_thread(1, 50);
        t.base_quantum = 3000;
        t.go_to_sleep(1_000_000, 0, 7);
        assert!(t.should_cancel_penalty(1_000_000 + 4000, 7));
    }

    #[test]
    fn should_not_cancel_penalty_if_starvation_occurred_while_asleep() {
        let mut t = create_test_thread(1, 50);
        t.base_quantum = 3000;
        t.go_to_sleep(1_000_000, 0, 7);
        assert!(!t.should_cancel_penalty(1_000_000 + 4000, 8));
    }

    #[test]
    fn should_not_cancel_penalty_after_short_sleep() {
        let mut t = create_test_thread(1, 50);
        t.base_quantum = 3000;
        t.go_to_sleep(1_000_000, 0, 7);
        assert!(!t.should_cancel_penalty(1_000_000 + 500, 7));
    }

    // ===========================================================
    // Quantum accounting
    // ===========================================================

    #[test]
    fn start_quantum_sets_time_left_to_length() {
        let mut t = create_test_thread(1, 50);
        t.start_quantum(0, 3000);
        assert_eq!(t.time_left, 3000);
        assert!(!t.has_quantum_ended());
    }

    #[test]
    fn tick_past_quantum_length_signals_end() {
        let mut t = create_test_thread(1, 50);
        t.start_quantum(0, 3000);
        assert!(!t.tick(2000));
        assert!(t.tick(1500));
        assert!(t.has_quantum_ended());
    }

    #[test]
    fn preempt_before_quantum_ends_banks_remainder() {
        let mut t = create_test_thread(1, 50);
        t.start_quantum(0, 3000);
        t.tick(1000);
        t.preempt();
        assert_eq!(t.stolen_time, 2000);
        assert_eq!(t.time_left, 0);
    }

    #[test]
    fn next_quantum_refunds_stolen_time() {
        let mut t = create_test_thread(1, 50);
        t.start_quantum(0, 3000);
        t.tick(1000);
        t.preempt();
        t.start_quantum(5000, 3000);
        assert_eq!(t.time_left, 5000);
    }

    // ===========================================================
    // ThreadTable as a LinkStore
    // ===========================================================

    #[test]
    fn fresh_thread_has_empty_link() {
        let t = create_test_thread(1, 50);
        assert_eq!(t.raw_link().prev, None);
        assert_eq!(t.raw_link().next, None);
    }

    #[test]
    fn thread_table_round_trips_links() {
        let mut table = ThreadTable::new();
        table.insert(create_test_thread(1, 50));
        table.insert(create_test_thread(2, 40));

        table.set_link(ThreadId::new(1), Link { prev: None, next: Some(ThreadId::new(2)) });
        assert_eq!(table.link(ThreadId::new(1)).next, Some(ThreadId::new(2)));
        assert_eq!(table.link(ThreadId::new(2)), Link::default());
    }

    #[test]
    fn thread_table_get_mut_and_remove() {
        let mut table = ThreadTable::new();
        table.insert(create_test_thread(1, 50));
        table.get_mut(ThreadId::new(1)).unwrap().increase_penalty();
        assert_eq!(table.get(ThreadId::new(1)).unwrap().priority_penalty, 1);

        let removed = table.remove(ThreadId::new(1));
        assert!(removed.is_some());
        assert!(table.is_empty());
    }
}
