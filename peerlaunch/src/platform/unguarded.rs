use log::debug;

use crate::api::models::{GuardError, Variant};
use crate::core::guard::{GuardHandle, GuardProvider};

/// Provider for targets with no cross-process lock primitive.
///
/// Every launch is first; single-instance enforcement is simply absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnguardedProvider;

impl GuardProvider for UnguardedProvider {
    fn acquire(&self, variant: &Variant) -> Result<GuardHandle, GuardError> {
        debug!("No instance lock on this platform; '{variant}' runs unguarded");
        Ok(GuardHandle::unguarded())
    }
}
