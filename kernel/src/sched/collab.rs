//! Down-facing collaborator contract (§6).
//!
//! Everything below this line is someone else's problem: the timer
//! subsystem, the interrupt controller, low-level context switching, CPU
//! frequency scaling. This module only states the shape of what the
//! scheduler core needs from them, mirroring the `ProcessOps`/
//! `SchedulerOps` split in `traits` — a production implementation wired
//! to real hardware, and a mock one that records calls for tests.

use super::thread::ThreadId;

/// Everything the scheduler core consumes from the rest of the kernel.
pub trait SchedulerCollaborators {
    /// Monotonic wall-clock time, in microseconds.
    fn system_time_us(&self) -> u64;
    /// The CPU id the caller is currently executing on.
    fn current_cpu(&self) -> u32;
    /// Send an inter-processor interrupt asking `cpu` to reschedule.
    fn send_reschedule_ici(&self, cpu: u32);
    /// The thread id currently running on the calling CPU.
    fn current_thread(&self) -> ThreadId;
    /// Switch execution from `from` to `to`. Never returns on the
    /// `from` side until it is scheduled again.
    ///
    /// # Safety
    /// Caller must hold whatever lock ordering guarantees no other CPU
    /// observes `from`/`to` mid-switch.
    unsafe fn context_switch(&self, from: ThreadId, to: ThreadId);
    /// Route a device interrupt to a specific CPU (IRQ affinity).
    fn assign_io_interrupt_to_cpu(&self, irq: u32, cpu: u32);
    /// Ask for a higher P-state/frequency on `cpu`.
    fn increase_cpu_performance(&self, cpu: u32);
    /// Ask for a lower P-state/frequency on `cpu`.
    fn decrease_cpu_performance(&self, cpu: u32);
    /// Arm a one-shot timer `delay_us` microseconds from now. Returns an
    /// opaque handle usable with `cancel_timer`.
    fn add_timer(&self, delay_us: u64) -> u64;
    fn cancel_timer(&self, handle: u64);
}

#[cfg(not(test))]
pub use production::RealCollaborators;

#[cfg(not(test))]
mod production {
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};

    /// Thin production wiring. Real IPI delivery, P-state control, and
    /// interrupt routing are supplied by whatever embeds this scheduler;
    /// this struct only has to exist so the core can be linked.
    pub struct RealCollaborators {
        time_us: AtomicU64,
    }

    impl RealCollaborators {
        pub const fn new() -> Self {
            Self { time_us: AtomicU64::new(0) }
        }

        /// Called by the timer interrupt handler to advance the clock
        /// this collaborator reports.
        pub fn advance_time(&self, delta_us: u64) {
            self.time_us.fetch_add(delta_us, Ordering::Relaxed);
        }
    }

    impl Default for RealCollaborators {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SchedulerCollaborators for RealCollaborators {
        fn system_time_us(&self) -> u64 {
            self.time_us.load(Ordering::Relaxed)
        }

        fn current_cpu(&self) -> u32 {
            0
        }

        fn send_reschedule_ici(&self, _cpu: u32) {}

        fn current_thread(&self) -> ThreadId {
            ThreadId::new(0)
        }

        unsafe fn context_switch(&self, _from: ThreadId, _to: ThreadId) {}

        fn assign_io_interrupt_to_cpu(&self, _irq: u32, _cpu: u32) {}

        fn increase_cpu_performance(&self, _cpu: u32) {}

        fn decrease_cpu_performance(&self, _cpu: u32) {}

        fn add_timer(&self, _delay_us: u64) -> u64 {
            0
        }

        fn cancel_timer(&self, _handle: u64) {}
    }
}

#[cfg(test)]
pub use mock::MockCollaborators;


#[cfg(test)]
mod tests {
    use super::mock::{MockCall, MockCollaborators};
    use super::*;

    #[test]
    fn mock_reports_configured_time_and_cpu() {
        let collab = MockCollaborators::new();
        collab.set_time(12345);
        collab.set_current_cpu(3);
        assert_eq!(collab.system_time_us(), 12345);
        assert_eq!(collab.current_cpu(), 3);
    }

    #[test]
    fn mock_records_ici_sends() {
        let collab = MockCollaborators::new();
        collab.send_reschedule_ici(2);
        collab.send_reschedule_ici(5);
        assert_eq!(collab.calls(), vec![MockCall::Ici(2), MockCall::Ici(5)]);
    }

    #[test]
    fn mock_records_context_switches() {
        let collab = MockCollaborators::new();
        unsafe { collab.context_switch(ThreadId::new(1), ThreadId::new(2)) };
        assert_eq!(
            collab.calls(),
            vec![MockCall::ContextSwitch(ThreadId::new(1), ThreadId::new(2))]
        );
    }

    #[test]
    fn mock_timer_handles_are_unique() {
        let collab = MockCollaborators::new();
        let a = collab.add_timer(1000);
        let b = collab.add_timer(2000);
        assert_ne!(a, b);
    }
}
