//! Instance guard capability.
//!
//! Acquiring the guard answers a single question: is this process the first
//! running copy of its variant? Implementations must make that decision in
//! one atomic OS operation whose outcome *is* the answer, and must rely on a
//! resource the OS reclaims when the process dies, so a crash never locks out
//! later launches.
//!
//! The platform implementation is chosen once, in
//! [`default_provider`](crate::default_provider). Everything else talks to
//! the [`GuardProvider`] and [`InstanceGuard`] traits.

use std::fmt::Debug;

use crate::api::models::{GuardError, Variant};

/// A resolved guard, held for the life of the process.
pub trait InstanceGuard: Debug + Send {
    /// Whether this process won the guard.
    fn is_first(&self) -> bool;
}

/// Acquires the guard for a variant.
pub trait GuardProvider: Debug + Send + Sync {
    fn acquire(&self, variant: &Variant) -> Result<GuardHandle, GuardError>;
}

/// Owning handle to a resolved guard.
///
/// Dropping the handle releases the underlying resource. The lifecycle hands
/// it back to the host at shutdown so it survives until the process exits.
#[derive(Debug)]
pub struct GuardHandle(Box<dyn InstanceGuard>);

impl GuardHandle {
    pub fn new(guard: impl InstanceGuard + 'static) -> Self {
        Self(Box::new(guard))
    }

    /// A guard that reports first-instance status without holding anything.
    ///
    /// Used on platforms without a lock primitive and when acquisition fails
    /// in a recoverable way.
    pub fn unguarded() -> Self {
        Self::new(Unguarded)
    }

    pub fn is_first(&self) -> bool {
        self.0.is_first()
    }
}

/// First-instance status granted without any OS resource behind it.
#[derive(Debug)]
pub(crate) struct Unguarded;

impl InstanceGuard for Unguarded {
    fn is_first(&self) -> bool {
        true
    }
}
