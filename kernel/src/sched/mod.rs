//! Topology-aware, multi-mode preemptive thread scheduler.
//!
//! Built from ten cooperating pieces: a priority run-queue (`queue`), an
//! indexed heap with key modification (`heap`), a load tracker and
//! load-average law (`load`), a static topology map (`topology`),
//! per-thread scheduling state (`thread`), per-CPU/core/package entries
//! (`cpu`), the two operation-mode policies (`modes`), the placement and
//! reschedule pipelines (`pipeline`), the down-facing collaborator
//! contract (`collab`), and this module, which wires all of the above
//! into the up-facing interface and syscall surface (§6).

pub mod collab;
pub mod constants;
pub mod cpu;
pub mod error;
pub mod heap;
pub mod load;
pub mod modes;
pub mod pipeline;
pub mod queue;
pub mod thread;
pub mod topology;

pub use collab::SchedulerCollaborators;
pub use error::SchedError;
pub use modes::{mode_by_name, CoreLoad, QuantumParams, SchedulingMode};
pub use pipeline::Placement;
pub use thread::{ThreadId, ThreadSchedulingState, ThreadTable};
pub use topology::{Topology, TopologyNode};

use crate::sync::{CoreLoadHeapsLock, CoreLock, ModeLock, ThreadsLock};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use cpu::{CoreEntry, CoreLoadHeaps, CpuEntry, PackageEntry};
use load::LoadAverage;
use spin::Mutex;

/// Top-level scheduler state (component I). Generic over the
/// down-facing collaborator so production code and tests share one
/// implementation; production wires `collab::RealCollaborators`, tests
/// use `collab::mock::MockCollaborators`.
///
/// Lock ordering follows `crate::sync::LockLevel`: mode (0) -> per-core
/// entries (1) -> thread table (2) -> core-load heaps (3). Acquiring
/// them out of order is a bug.
pub struct Scheduler<C: SchedulerCollaborators> {
    collab: C,
    /// Outermost lock in the ordering: read to pick a mode-dependent
    /// policy, written only by `set_operation_mode`.
    mode: ModeLock<Box<dyn SchedulingMode + Send + Sync>>,
    topology: Topology,
    cores: Vec<CoreLock<CoreEntry>>,
    cpus: Vec<CoreLock<CpuEntry>>,
    packages: Vec<CoreLock<PackageEntry>>,
    threads: ThreadsLock<ThreadTable>,
    /// Innermost, process-wide lock: the global core-load heaps.
    core_load_heaps: CoreLoadHeapsLock<CoreLoadHeaps>,
    load_average: Mutex<LoadAverage>,
    next_thread_id: AtomicU32,
}

impl<C: SchedulerCollaborators> Scheduler<C> {
    /// Build a scheduler over a flattened topology tree, starting in the
    /// named mode. §9 "topology init".
    pub fn new(collab: C, nodes: &[TopologyNode], mode_name: &str) -> Result<Self, SchedError> {
        if nodes.is_empty() {
            return Err(SchedError::BadValue);
        }
        let mode = mode_by_name(mode_name).ok_or(SchedError::BadValue)?;
        let topology = Topology::build(nodes);

        let cores: Vec<CoreLock<CoreEntry>> = (0..topology.core_count())
            .map(|core| CoreLock::new(CoreEntry::new(core, topology.package_of_core(core)), "sched::core"))
            .collect();
        let cpus = (0..topology.cpu_count())
            .map(|cpu| CoreLock::new(CpuEntry::new(cpu, topology.core_of(cpu)), "sched::cpu"))
            .collect();
        let packages = (0..topology.package_count())
            .map(|package| {
                CoreLock::new(PackageEntry::new(package, topology.cores_on_package(package)), "sched::package")
            })
            .collect();

        for cpu in 0..topology.cpu_count() {
            let core = topology.core_of(cpu);
            cores[core as usize].lock().cpu_heap.push(constants::IDLE_PRIORITY, cpu);
        }

        Ok(Self {
            collab,
            mode: ModeLock::new(mode, "sched::mode"),
            topology,
            cores,
            cpus,
            packages,
            threads: ThreadsLock::new(ThreadTable::new(), "sched::threads"),
            core_load_heaps: CoreLoadHeapsLock::new(CoreLoadHeaps::new(), "sched::core_load_heaps"),
            load_average: Mutex::new(LoadAverage::new()),
            next_thread_id: AtomicU32::new(1),
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    // -----------------------------------------------------------
    // Up-facing interface, §6
    // -----------------------------------------------------------

    pub fn on_thread_create(&self, base_priority: u32) -> ThreadId {
        let id = ThreadId::new(self.next_thread_id.fetch_add(1, Ordering::Relaxed));
        self.threads.write().insert(ThreadSchedulingState::new(id, base_priority));
        id
    }

    pub fn on_thread_destroy(&self, id: ThreadId) {
        self.threads.write().remove(id);
    }

    /// Per-core loads for mode `choose_core`, keyed the way §3 and the
    /// original `CoreEntry::GetLoad()` do: load normalised by the
    /// number of CPUs on the core, so cores with different SMT widths
    /// are comparable. Also carries each core's package-idle state for
    /// package-aware placement.
    fn core_loads_for_placement(&self) -> Vec<CoreLoad> {
        self.cores
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let core_id = i as u32;
                let core = c.lock();
                let package = core.package;
                let package_idle = self.packages[package as usize].lock().is_idle();
                CoreLoad { core: core_id, load: self.normalized_load(core_id, &core), package, package_idle }
            })
            .collect()
    }

    /// `core.load / cpus_on_core` — §3's heap/placement key. Caller must
    /// already hold `core`'s lock.
    fn normalized_load(&self, core_id: u32, core: &CoreEntry) -> u32 {
        let cpu_count = self.topology.cpus_on_core(core_id).max(1);
        core.load.load / cpu_count
    }

    /// Reflect a core's shared-run-queue-empty transition onto its
    /// package's idle-core tracking (§4.4's "idle package" preference).
    /// Approximates "core idle" as "nothing on this core's shared queue
    /// and nothing pinned to the CPU that just (de)queued" — a core
    /// with threads pinned to a sibling CPU this call didn't touch is
    /// not accounted for, since `CoreEntry` doesn't enumerate its CPUs.
    /// Must be called with no core/cpu/thread lock held.
    fn update_package_idle_state(&self, package: u32, core_id: u32, was_empty: bool, now_empty: bool) {
        if was_empty == now_empty {
            return;
        }
        let mut pkg = self.packages[package as usize].lock();
        if now_empty {
            pkg.mark_core_idle(core_id);
        } else {
            pkg.mark_core_active(core_id);
        }
    }

    /// §4.5-4.6: place a thread onto some core's run queue — its own
    /// CPU's pinned queue if it is affine to exactly one CPU, else the
    /// core's shared queue — and, if that lands it on a different CPU
    /// than the one currently calling in, wake that CPU with a
    /// reschedule ICI.
    pub fn enqueue_in_run_queue(&self, id: ThreadId) -> Result<(), SchedError> {
        let now = self.collab.system_time_us();
        let (cpu_mask, previous_core, last_ran_at) = {
            let threads = self.threads.read();
            let thread = threads.get(id).ok_or(SchedError::BadValue)?;
            (thread.cpu_mask, thread.core, thread.quantum_start)
        };

        let core_loads = self.core_loads_for_placement();

        let placement = {
            let mode = self.mode.read();
            pipeline::choose_core_and_cpu(mode.as_ref(), cpu_mask, previous_core, last_ran_at, now, &core_loads)
                .ok_or(SchedError::NotInitialised)?
        };

        let (core_id, preferred_cpu) = match placement {
            Placement::Cpu(cpu) => {
                let entry = self.cpus.get(cpu as usize).ok_or(SchedError::BadValue)?;
                (entry.lock().core, Some(cpu))
            }
            Placement::Core(core) => (core, None),
        };

        let pinned = pipeline::is_pinned(cpu_mask);
        let mut wake_cpu = None;

        // Lock order within level 1 (SPEC_FULL.md §5): CPU before core.
        let (package, was_empty, now_empty, normalized) = if pinned {
            let target_cpu = preferred_cpu.ok_or(SchedError::BadValue)?;
            let mut cpu_entry = self.cpus[target_cpu as usize].lock();
            let mut core = self.cores[core_id as usize].lock();
            let was_empty = core.thread_count == 0 && cpu_entry.pinned_thread_count == 0;
            {
                let mut threads = self.threads.write();
                pipeline::enqueue_pinned(&mut threads, core_id, core.starvation_counter, &mut cpu_entry, id, now);
            }
            let normalized = self.normalized_load(core_id, &core);
            if target_cpu != self.collab.current_cpu() {
                wake_cpu = Some(target_cpu);
            }
            (core.package, was_empty, false, normalized)
        } else {
            let mut core = self.cores[core_id as usize].lock();
            let was_empty = core.thread_count == 0;
            {
                let mut threads = self.threads.write();
                pipeline::enqueue_shared(&mut threads, &mut core, id, now);
            }
            let normalized = self.normalized_load(core_id, &core);
            if let Some(cpu) = pipeline::choose_cpu_on_core(&core, preferred_cpu) {
                if cpu != self.collab.current_cpu() {
                    wake_cpu = Some(cpu);
                }
            }
            (core.package, was_empty, false, normalized)
        };

        self.core_load_heaps.lock().update_load(core_id, normalized);
        self.update_package_idle_state(package, core_id, was_empty, now_empty);

        if let Some(cpu) = wake_cpu {
            self.collab.send_reschedule_ici(cpu);
        }

        Ok(())
    }

    /// §4.7-4.8: pick the next thread to run on `cpu`, preferring
    /// whichever of its pinned queue / its core's shared queue holds
    /// the more important thread, start its quantum, and update that
    /// CPU's entry. Returns `None` if nothing is runnable (the caller
    /// should schedule its idle thread).
    pub fn reschedule(&self, cpu: u32) -> Result<Option<ThreadId>, SchedError> {
        let now = self.collab.system_time_us();
        let params = self.mode.read().quantum_params();
        let core_id = self.cpus.get(cpu as usize).ok_or(SchedError::BadValue)?.lock().core;

        // Lock order within level 1: CPU before core; threads (level 2)
        // innermost.
        let (next, quantum, old, was_cpu_idle, now_cpu_idle, package, was_empty, now_empty) = {
            let mut cpu_entry = self.cpus[cpu as usize].lock();
            let mut core = self.cores[core_id as usize].lock();
            let mut threads = self.threads.write();

            let old = cpu_entry.running;
            let was_cpu_idle = cpu_entry.is_idle();
            let was_empty = core.thread_count == 0 && cpu_entry.pinned_thread_count == 0;

            let next = if cpu_entry.enabled {
                pipeline::choose_next_thread(&mut threads, &mut core, &mut cpu_entry)
            } else {
                // §4.8 step 3: a disabled CPU always runs idle; unassign
                // the outgoing thread's core so its next enqueue places
                // it fresh on an enabled one.
                if let Some(running) = old {
                    if let Some(t) = threads.get_mut(running) {
                        t.core = None;
                    }
                }
                None
            };

            let quantum = match next {
                Some(id) => {
                    let is_rt = threads.get(id).map(ThreadSchedulingState::is_real_time).unwrap_or(false);
                    // `thread_count`/`pinned_thread_count` no longer count
                    // the thread `choose_next_thread` just popped, but it
                    // still shares this core for quantum-table purposes.
                    let thread_count_on_core = core.thread_count + cpu_entry.pinned_thread_count + 1;
                    let quantum = pipeline::compute_quantum(params, thread_count_on_core, is_rt);
                    let priority = {
                        let thread = threads.get_mut(id).ok_or(SchedError::BadValue)?;
                        thread.start_quantum(now, quantum);
                        thread.effective_priority()
                    };
                    cpu_entry.set_running(id, priority);
                    core.cpu_heap.modify_key(cpu, priority);
                    Some(quantum)
                }
                None => {
                    cpu_entry.clear_running();
                    core.cpu_heap.modify_key(cpu, constants::IDLE_PRIORITY);
                    None
                }
            };

            let now_cpu_idle = cpu_entry.is_idle();
            let now_empty = core.thread_count == 0 && cpu_entry.pinned_thread_count == 0;
            (next, quantum, old, was_cpu_idle, now_cpu_idle, core.package, was_empty, now_empty)
        };

        self.update_package_idle_state(package, core_id, was_empty, now_empty);

        // §4.8 step 7: (re)arm the quantum timer and adjust DVFS.
        if let Some(handle) = self.cpus[cpu as usize].lock().pending_timer.take() {
            self.collab.cancel_timer(handle);
        }
        if let Some(quantum) = quantum {
            let handle = self.collab.add_timer(quantum);
            self.cpus[cpu as usize].lock().pending_timer = Some(handle);
            self.collab.increase_cpu_performance(cpu);
        } else {
            self.collab.decrease_cpu_performance(cpu);
        }

        // §4.8 step 8: context switch only on an actual thread change.
        if let Some(next_id) = next {
            if old != Some(next_id) {
                let from = old.unwrap_or_else(|| self.collab.current_thread());
                unsafe { self.collab.context_switch(from, next_id) };
            }
        }

        // §4.4: let the active mode repaint IRQ assignments whenever
        // this CPU's idle/busy state flips.
        if was_cpu_idle != now_cpu_idle {
            self.mode.read().rebalance_irqs(now_cpu_idle);
        }

        Ok(next)
    }

    /// Timer-driven per-CPU tick (§4.8): advance the currently running
    /// thread's quantum and this CPU's and core's load windows; apply
    /// the penalty step and reschedule if the quantum has run out.
    pub fn on_timer_tick(&self, cpu: u32, elapsed_us: u64) -> Result<Option<ThreadId>, SchedError> {
        let core_id = self.cpus.get(cpu as usize).ok_or(SchedError::BadValue)?.lock().core;
        let now = self.collab.system_time_us();

        let Some(running_id) = self.cpus[cpu as usize].lock().running else {
            return Ok(None);
        };

        let quantum_ended = {
            let mut threads = self.threads.write();
            pipeline::tick_quantum(&mut threads, running_id, elapsed_us)
        };

        // Per-CPU cached measurement (§3), alongside the core's
        // aggregate. This crate's `CoreEntry` doesn't enumerate its
        // child CPUs, so the core load is tracked as its own parallel
        // accumulation of the same active time rather than a literal
        // bottom-up sum over per-CPU trackers.
        {
            let mut cpu_entry = self.cpus[cpu as usize].lock();
            cpu_entry.load.add_active(elapsed_us);
            cpu_entry.load.update(now);
        }

        let normalized = {
            let mut core = self.cores[core_id as usize].lock();
            core.load.add_active(elapsed_us);
            if core.load.update(now) {
                Some(self.normalized_load(core_id, &core))
            } else {
                None
            }
        };
        if let Some(load) = normalized {
            self.core_load_heaps.lock().update_load(core_id, load);
        }

        if !quantum_ended {
            return Ok(None);
        }

        {
            let mut threads = self.threads.write();
            if let Some(thread) = threads.get_mut(running_id) {
                thread.increase_penalty();
            }
        }

        let pinned = {
            let threads = self.threads.read();
            threads.get(running_id).map(|t| pipeline::is_pinned(t.cpu_mask)).unwrap_or(false)
        };

        if pinned {
            let mut cpu_entry = self.cpus[cpu as usize].lock();
            let mut threads = self.threads.write();
            pipeline::put_back_pinned(&mut threads, &mut cpu_entry, running_id);
        } else {
            let mut core = self.cores[core_id as usize].lock();
            let mut threads = self.threads.write();
            pipeline::put_back_shared(&mut threads, &mut core, running_id);
        }

        self.reschedule(cpu)
    }

    pub fn set_thread_priority(&self, id: ThreadId, new_priority: u32) -> Result<(), SchedError> {
        let mut threads = self.threads.write();
        let thread = threads.get_mut(id).ok_or(SchedError::BadValue)?;
        thread.base_priority = new_priority;
        thread.cancel_penalty();
        Ok(())
    }

    /// §6: online/offline a CPU. Disabling one drains its pinned queue
    /// onto other cores rather than leaving those threads stranded
    /// behind a disabled CPU forever.
    pub fn set_cpu_enabled(&self, cpu: u32, enabled: bool) -> Result<(), SchedError> {
        {
            let entry = self.cpus.get(cpu as usize).ok_or(SchedError::BadValue)?;
            entry.lock().enabled = enabled;
        }
        if !enabled {
            self.drain_cpu_queue(cpu)?;
        }
        Ok(())
    }

    /// Pop every thread off `cpu`'s pinned queue, un-pin it, and run it
    /// back through full placement so it lands on an enabled CPU.
    fn drain_cpu_queue(&self, cpu: u32) -> Result<(), SchedError> {
        let drained: Vec<ThreadId> = {
            let mut cpu_entry = self.cpus.get(cpu as usize).ok_or(SchedError::BadValue)?.lock();
            let mut threads = self.threads.write();
            let mut drained = Vec::new();
            while let Some((thread_id, priority)) = cpu_entry.pinned_queue.peek_maximum() {
                cpu_entry.pinned_queue.remove(&mut threads, thread_id, priority);
                cpu_entry.pinned_thread_count = cpu_entry.pinned_thread_count.saturating_sub(1);
                if let Some(t) = threads.get_mut(thread_id) {
                    t.enqueued = false;
                    t.cpu_mask = None;
                }
                drained.push(thread_id);
            }
            drained
        };
        for id in drained {
            self.enqueue_in_run_queue(id)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------
    // Syscall-compatible surface, §6
    // -----------------------------------------------------------

    pub fn get_scheduler_mode(&self) -> &'static str {
        self.mode.read().name()
    }

    pub fn set_scheduler_mode(&self, name: &str) -> Result<(), SchedError> {
        let new_mode = mode_by_name(name).ok_or(SchedError::BadValue)?;
        new_mode.switch_to_mode();
        *self.mode.write() = new_mode;
        Ok(())
    }

    /// `min(max(thread_count * base_quantum, minimal_quantum), maximum_latency)`
    /// (§6), where `thread_count` is the number of threads currently
    /// sharing `thread_id`'s core.
    pub fn estimate_max_scheduling_latency(&self, thread_id: ThreadId) -> Result<u64, SchedError> {
        let core_id = {
            let threads = self.threads.read();
            let thread = threads.get(thread_id).ok_or(SchedError::BadValue)?;
            thread.core
        };
        let thread_count = match core_id {
            Some(core_id) => {
                let core = self.cores.get(core_id as usize).ok_or(SchedError::BadValue)?;
                core.lock().thread_count.max(1) as u64
            }
            None => 1,
        };
        let params = self.mode.read().quantum_params();
        let latency = (thread_count * params.base_quantum_us)
            .max(params.minimal_quantum_us)
            .min(params.maximum_latency_us);
        Ok(latency)
    }

    pub fn get_loadavg(&self) -> ([i64; 3], i64) {
        self.load_average.lock().snapshot()
    }

    /// Periodic (nominally every `constants::LOADAVG_PERIOD_US`) sample
    /// into the load average, driven by an external timer collaborator.
    pub fn sample_load_average(&self) {
        let runnable: i64 = self.cores.iter().map(|c| c.lock().thread_count as i64).sum();
        self.load_average.lock().sample((runnable - 1).max(0));
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }
}
