//! Architecture boot glue.
//!
//! Everything below "discover how many CPUs exist and what their
//! package/core/SMT topology is, then hand that to the scheduler" is a
//! down-facing collaborator's problem per `sched::collab` — low-level
//! context switching, the interrupt controller, and the timer subsystem
//! are out of scope for this crate. This module only carries the boot
//! handoff shape `kernel_main` needs.

/// Boot information passed from the bootloader.
#[derive(Debug)]
pub struct BootInfo {
    /// Kernel command line.
    pub cmdline: &'static str,
    /// Flattened CPU topology, in firmware enumeration order, as handed
    /// to `sched::Scheduler::new`.
    pub topology: &'static [crate::sched::TopologyNode],
}

/// Halt the calling CPU forever. Never returns.
#[cfg(not(test))]
pub fn halt() -> ! {
    loop {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack));
        }
        #[cfg(not(target_arch = "x86_64"))]
        core::hint::spin_loop();
    }
}

#[cfg(test)]
pub fn halt() {}

#[cfg(not(test))]
pub fn disable_interrupts() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }
}

#[cfg(test)]
pub fn disable_interrupts() {}
