//! Placement, enqueue, and reschedule pipelines (component H), §4.5-§4.8.

use super::cpu::{CoreEntry, CpuEntry};
use super::modes::{CoreLoad, QuantumParams, SchedulingMode};
use super::thread::{ThreadId, ThreadTable};

/// §4.8's quantum-table law: a thread's quantum shrinks as more threads
/// share its core, but never below `minimal_quantum`, never above
/// `base_quantum`, and real-time threads are never scaled at all.
pub fn compute_quantum(params: QuantumParams, thread_count_on_core: u32, is_real_time: bool) -> u64 {
    if is_real_time || thread_count_on_core <= 1 {
        return params.base_quantum_us;
    }
    let scaled = params.maximum_latency_us / thread_count_on_core as u64;
    params.minimal_quantum_us.max(params.base_quantum_us.min(scaled))
}

/// Result of `choose_core_and_cpu`: either a specific CPU was dictated
/// directly (pinned affinity, or the only CPU in a single-core system),
/// or a core was chosen and the caller still has to pick a CPU on it via
/// that core's CPU-priority heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Cpu(u32),
    Core(u32),
}

/// §4.5: pin-to-CPU shortcut, single-core shortcut, cache-affinity check,
/// then the mode's own `choose_core`.
pub fn choose_core_and_cpu(
    mode: &dyn SchedulingMode,
    cpu_mask: Option<u64>,
    previous_core: Option<u32>,
    last_ran_at: u64,
    now: u64,
    cores: &[CoreLoad],
) -> Option<Placement> {
    if let Some(mask) = cpu_mask {
        if mask != 0 && mask.count_ones() == 1 {
            return Some(Placement::Cpu(mask.trailing_zeros()));
        }
    }

    if cores.len() == 1 {
        return Some(Placement::Core(cores[0].core));
    }

    if let Some(core_id) = previous_core {
        if let Some(current) = cores.iter().find(|c| c.core == core_id) {
            if !mode.has_cache_expired(now, last_ran_at) {
                if let Some(candidate) = mode.choose_core(cores) {
                    let candidate_load =
                        cores.iter().find(|c| c.core == candidate).map(|c| c.load).unwrap_or(0);
                    if !mode.should_rebalance(current.load, candidate_load) {
                        return Some(Placement::Core(core_id));
                    }
                }
            }
        }
    }

    mode.choose_core(cores).map(Placement::Core)
}

/// Pick a CPU on an already-chosen core: prefer the thread's previous
/// CPU if it still belongs to this core, otherwise fall back to the
/// least important (lowest running priority) CPU the core's heap knows
/// about.
pub fn choose_cpu_on_core(core: &CoreEntry, preferred_cpu: Option<u32>) -> Option<u32> {
    if let Some(preferred) = preferred_cpu {
        if core.cpu_heap.contains(preferred) {
            return Some(preferred);
        }
    }
    core.least_important_cpu().map(|(cpu, _)| cpu)
}

/// A thread is pinned when its `cpu_mask` names exactly one CPU (§4.1,
/// §4.5 step 1). Pinned threads bypass the core's shared run queue
/// entirely and live on that CPU's own `pinned_queue`.
pub fn is_pinned(cpu_mask: Option<u64>) -> bool {
    matches!(cpu_mask, Some(mask) if mask != 0 && mask.count_ones() == 1)
}

fn mark_ready(table: &mut ThreadTable, thread_id: ThreadId, core_id: u32, now: u64, starvation_counter: u64) -> u32 {
    let thread = table.get_mut(thread_id).expect("enqueue of unknown thread");
    if thread.should_cancel_penalty(now, starvation_counter) {
        thread.cancel_penalty();
    }
    thread.core = Some(core_id);
    thread.enqueued = true;
    thread.effective_priority()
}

fn mark_ready_no_penalty_check(table: &mut ThreadTable, thread_id: ThreadId) -> u32 {
    let thread = table.get_mut(thread_id).expect("put_back of unknown thread");
    thread.enqueued = true;
    thread.effective_priority()
}

/// §4.6: place a freshly runnable thread onto a core's shared run
/// queue. Cancels a stale penalty first if it slept through a full
/// quantum without the core starving anything else in the meantime.
pub fn enqueue_shared(table: &mut ThreadTable, core: &mut CoreEntry, thread_id: ThreadId, now: u64) {
    let priority = mark_ready(table, thread_id, core.id, now, core.starvation_counter);
    core.run_queue.push_back(table, thread_id, priority);
    core.thread_count += 1;
}

/// §4.6/§4.1: place a freshly runnable thread pinned to this CPU onto
/// its own pinned queue, never the shared core queue, so it can't be
/// stolen by a sibling CPU on the same core.
pub fn enqueue_pinned(
    table: &mut ThreadTable,
    core_id: u32,
    core_starvation_counter: u64,
    cpu: &mut CpuEntry,
    thread_id: ThreadId,
    now: u64,
) {
    let priority = mark_ready(table, thread_id, core_id, now, core_starvation_counter);
    cpu.pinned_queue.push_back(table, thread_id, priority);
    cpu.pinned_thread_count += 1;
}

/// §4.6: re-insert a thread preempted mid-quantum ahead of anything at
/// the same priority that arrived after it, preserving its place in
/// line rather than sending it to the back.
pub fn put_back_shared(table: &mut ThreadTable, core: &mut CoreEntry, thread_id: ThreadId) {
    let priority = mark_ready_no_penalty_check(table, thread_id);
    core.run_queue.push_front(table, thread_id, priority);
    core.thread_count += 1;
}

/// Pinned-queue counterpart of `put_back_shared`.
pub fn put_back_pinned(table: &mut ThreadTable, cpu: &mut CpuEntry, thread_id: ThreadId) {
    let priority = mark_ready_no_penalty_check(table, thread_id);
    cpu.pinned_queue.push_front(table, thread_id, priority);
    cpu.pinned_thread_count += 1;
}

/// §4.7: pop the highest-priority runnable thread available to a CPU,
/// checking both its own pinned queue and its core's shared queue and
/// taking whichever head is more important — shared wins ties, since a
/// pinned thread sitting at the same priority already has an exclusive
/// CPU reserved for it and can afford to wait one more slot. Every
/// call — including ones that find both queues empty — advances the
/// core's starvation counter, since it represents one scheduling
/// decision having been made on this core.
pub fn choose_next_thread(table: &mut ThreadTable, core: &mut CoreEntry, cpu: &mut CpuEntry) -> Option<ThreadId> {
    core.record_starvation();

    let pinned = cpu.pinned_queue.peek_maximum();
    let shared = core.run_queue.peek_maximum();

    let take_shared = match (shared, pinned) {
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (Some((_, shared_priority)), Some((_, pinned_priority))) => shared_priority >= pinned_priority,
        (None, None) => return None,
    };

    if take_shared {
        let (thread_id, priority) = shared.unwrap();
        core.run_queue.remove(table, thread_id, priority);
        core.thread_count = core.thread_count.saturating_sub(1);
        if let Some(thread) = table.get_mut(thread_id) {
            thread.enqueued = false;
        }
        Some(thread_id)
    } else {
        let (thread_id, priority) = pinned.unwrap();
        cpu.pinned_queue.remove(table, thread_id, priority);
        cpu.pinned_thread_count = cpu.pinned_thread_count.saturating_sub(1);
        if let Some(thread) = table.get_mut(thread_id) {
            thread.enqueued = false;
        }
        Some(thread_id)
    }
}

pub fn has_quantum_ended(thread_id: ThreadId, table: &ThreadTable) -> bool {
    table.get(thread_id).map(|t| t.has_quantum_ended()).unwrap_or(true)
}

/// §4.8: advance `thread_id`'s quantum by `elapsed` microseconds. Returns
/// `true` once it has run out, in which case the caller should apply the
/// penalty-growth step and reschedule.
pub fn tick_quantum(table: &mut ThreadTable, thread_id: ThreadId, elapsed: u64) -> bool {
    match table.get_mut(thread_id) {
        Some(thread) => thread.tick(elapsed),
        None => true,
    }
}
