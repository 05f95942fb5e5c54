//! # Ordered Locking Primitives
//!
//! This module provides lock wrappers that encode their position in the lock
//! hierarchy. This helps prevent deadlocks by making lock ordering explicit.
//!
//! See the crate-level documentation for the complete lock hierarchy.

use spin::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock ordering levels.
///
/// Locks must be acquired in increasing level order.
/// Level 0 locks must be acquired before Level 1, etc.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockLevel {
    /// Level 0: the active scheduling mode (`sched::Scheduler::mode`)
    Mode = 0,
    /// Level 1: per-core state (run queue, CPU heap, load)
    Core = 1,
    /// Level 2: the thread table
    Threads = 2,
    /// Level 3: the process-wide core-load heaps
    CoreLoadHeaps = 3,
}

/// A read-write lock with an associated ordering level.
///
/// This type is a wrapper around `spin::RwLock` that encodes the lock's
/// position in the hierarchy. While Rust's type system cannot prevent
/// all ordering violations, using this type makes the intended ordering
/// explicit and enables runtime checks in debug builds.
pub struct OrderedRwLock<T, const LEVEL: u8> {
    inner: RwLock<T>,
    #[cfg(debug_assertions)]
    name: &'static str,
}

impl<T, const LEVEL: u8> OrderedRwLock<T, LEVEL> {
    /// Create a new ordered lock.
    pub const fn new(value: T, _name: &'static str) -> Self {
        Self {
            inner: RwLock::new(value),
            #[cfg(debug_assertions)]
            name: _name,
        }
    }

    /// Acquire a read lock.
    ///
    /// In debug builds, this will check that no higher-level locks are held.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        #[cfg(debug_assertions)]
        {
            // In a full implementation, we would check thread-local state
            // to verify no lower-level locks are held while we acquire this.
            // For now, we just acquire the lock.
        }
        self.inner.read()
    }

    /// Acquire a write lock.
    ///
    /// In debug builds, this will check that no higher-level locks are held.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        #[cfg(debug_assertions)]
        {
            // Same as read() - would check ordering in full implementation
        }
        self.inner.write()
    }

    /// Try to acquire a read lock without blocking.
    #[inline]
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.inner.try_read()
    }

    /// Try to acquire a write lock without blocking.
    #[inline]
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.inner.try_write()
    }

    /// Get the lock level.
    #[inline]
    pub const fn level(&self) -> u8 {
        LEVEL
    }

    /// Get the lock name (debug builds only).
    #[cfg(debug_assertions)]
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// A plain mutex with an associated ordering level, for state that does
/// not need reader/writer distinction (per-core and per-package entries,
/// the core-load heaps).
pub struct OrderedMutex<T, const LEVEL: u8> {
    inner: Mutex<T>,
    #[cfg(debug_assertions)]
    name: &'static str,
}

impl<T, const LEVEL: u8> OrderedMutex<T, LEVEL> {
    pub const fn new(value: T, _name: &'static str) -> Self {
        Self {
            inner: Mutex::new(value),
            #[cfg(debug_assertions)]
            name: _name,
        }
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    #[inline]
    pub const fn level(&self) -> u8 {
        LEVEL
    }

    #[cfg(debug_assertions)]
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

// Type aliases for each level of the scheduler's lock hierarchy
// (mode -> core -> threads -> core_load_heaps; see the crate-level doc).
/// Level 0 lock - the active scheduling mode
pub type ModeLock<T> = OrderedRwLock<T, 0>;

/// Level 1 lock - per-core / per-CPU / per-package entries
pub type CoreLock<T> = OrderedMutex<T, 1>;

/// Level 2 lock - the thread table
pub type ThreadsLock<T> = OrderedRwLock<T, 2>;

/// Level 3 lock - the process-wide core-load heaps
pub type CoreLoadHeapsLock<T> = OrderedMutex<T, 3>;

/// Macro to create a mode-level lock (Level 0)
#[macro_export]
macro_rules! mode_lock {
    ($value:expr, $name:literal) => {
        $crate::sync::ModeLock::new($value, $name)
    };
}

/// Macro to create a core-level lock (Level 1)
#[macro_export]
macro_rules! core_lock {
    ($value:expr, $name:literal) => {
        $crate::sync::CoreLock::new($value, $name)
    };
}

/// Macro to create a threads-level lock (Level 2)
#[macro_export]
macro_rules! threads_lock {
    ($value:expr, $name:literal) => {
        $crate::sync::ThreadsLock::new($value, $name)
    };
}

/// Macro to create a core-load-heaps-level lock (Level 3)
#[macro_export]
macro_rules! core_load_heaps_lock {
    ($value:expr, $name:literal) => {
        $crate::sync::CoreLoadHeapsLock::new($value, $name)
    };
}
