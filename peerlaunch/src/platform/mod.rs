//! Platform-specific primitives.
//!
//! The guard and transport each have one implementation per platform family.
//! This module is the only place that selects between them; the rest of the
//! crate sees a single `Listener`/`connect` API and the [`GuardProvider`]
//! trait.

#[cfg(any(unix, windows))]
mod lock_file;
mod unguarded;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use std::path::Path;

use crate::core::guard::GuardProvider;

#[cfg(any(unix, windows))]
pub use lock_file::LockFileProvider;
pub use unguarded::UnguardedProvider;

#[cfg(unix)]
pub(crate) use unix::{ClientStream, Listener, ServerStream, bind, connect, endpoint_address};
#[cfg(windows)]
pub(crate) use windows::{ClientStream, Listener, ServerStream, bind, connect, endpoint_address};

/// Returns the guard provider for the build target.
///
/// Desktop targets get an exclusive advisory lock on a per-variant file in
/// `lock_dir`; anything else trivially grants first-instance status.
pub fn default_provider(lock_dir: &Path) -> Box<dyn GuardProvider> {
    #[cfg(any(unix, windows))]
    {
        Box::new(LockFileProvider::new(lock_dir))
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = lock_dir;
        Box::new(UnguardedProvider)
    }
}
