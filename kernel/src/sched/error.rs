//! Scheduler error type.
//!
//! Follows the plain-enum convention already used by `cap::CapError` and
//! `ipc::IpcError` in this kernel rather than pulling in an error-derive
//! crate: no `thiserror`/`anyhow` below the allocator.

/// Errors surfaced by scheduler entry points.
///
/// Internal invariant violations are never represented here: they are
/// `assert!`/`debug_assert!` failures, since a scheduler bug must never
/// be allowed to silently corrupt state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// A scheduling entry point was called before `init()` completed.
    NotInitialised,
    /// An invalid mode id, CPU id, or thread id was supplied.
    BadValue,
    /// Allocation failed during `init()` or thread creation.
    NoMemory,
    /// A userspace pointer supplied to a syscall was invalid.
    ///
    /// Never constructed inside this crate; carried through from the
    /// syscall-marshalling layer above it.
    BadAddress,
}
