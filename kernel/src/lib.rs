//! # Nyx Scheduler Kernel
//!
//! A topology-aware, multi-mode preemptive thread scheduler for a
//! general-purpose kernel, built around an intrusive priority run-queue
//! and a hierarchical load-tracking fabric.
//!
//! ## Design Principles
//!
//! - **Bounded scheduling latency**: the quantum table keeps worst-case
//!   reschedule latency proportional to load, not thread count
//! - **Memory Safety**: Rust everywhere except hardware interfaces
//! - **Topology-aware placement**: package/core/SMT structure informs
//!   every placement and rebalancing decision
//! - **Rigorously Tested**: every pure-logic module carries its own
//!   `#[cfg(test)]` suite
//!
//! ## Lock Ordering
//!
//! To prevent deadlocks, locks must be acquired in the following order.
//! Acquiring locks out of order is a bug and may cause deadlocks. See
//! `sync::LockLevel` for the type-level encoding of this hierarchy.
//!
//! ```text
//! Lock Hierarchy (acquire in this order, never reverse):
//!
//! Level 0 (outermost - acquire first):
//!   - MODE              (the active scheduling mode policy)
//!
//! Level 1:
//!   - CORE / CPU / PACKAGE entries (per-core run queue, CPU heap, load)
//!
//! Level 2:
//!   - THREADS           (thread table)
//!
//! Level 3 (innermost - acquire last):
//!   - CORE_LOAD_HEAPS   (process-wide core-load heaps)
//! ```
//!
//! ### Rules
//!
//! 1. Never hold a lower-level lock while acquiring a higher-level lock
//! 2. Prefer read locks over write locks when possible
//! 3. Hold locks for the minimum duration necessary
//! 4. When acquiring multiple locks at the same level, use a consistent ordering
//!    (e.g., by core id, to avoid ABBA deadlocks)

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(missing_docs)]

#[cfg(not(test))]
extern crate alloc;
#[cfg(test)]
extern crate std as alloc;

pub mod arch;
pub mod sched;
pub mod sync;

#[cfg(not(test))]
mod panic;

use core::sync::atomic::{AtomicU64, Ordering};

/// Kernel version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build timestamp
pub const BUILD_TIME: &str = match option_env!("BUILD_TIMESTAMP") {
    Some(t) => t,
    None => "unknown",
};

/// Global tick counter (nanoseconds since boot)
static TICK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get current timestamp in nanoseconds
#[inline]
pub fn now_ns() -> u64 {
    TICK_COUNTER.load(Ordering::Relaxed)
}

/// Kernel entry point (called from arch-specific boot code).
///
/// Brings up the scheduler over the topology the bootloader discovered
/// and hands control to it. Everything below that line — process
/// loading, IPC, filesystems, drivers — is out of scope for this crate;
/// see the crate-level doc and `sched`'s module doc for the boundary.
///
/// # Safety
///
/// Must only be called once during boot, after arch-specific initialization.
#[cfg(not(test))]
pub unsafe fn kernel_main(boot_info: &arch::BootInfo) -> ! {
    log::info!("Nyx scheduler kernel v{VERSION} starting...");
    log::debug!("cmdline: {}", boot_info.cmdline);

    log::debug!("Initializing scheduler over {} logical CPUs", boot_info.topology.len());
    let scheduler = sched::Scheduler::new(
        sched::collab::RealCollaborators::new(),
        boot_info.topology,
        "low_latency",
    )
    .expect("topology must be non-empty and mode name must be valid");

    log::info!("Scheduler up: {} cores, {} packages", scheduler.topology().core_count(), scheduler.package_count());

    arch::halt()
}
