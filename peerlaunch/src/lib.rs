//! Single-instance coordination and local command relay for desktop applications.
//!
//! At startup a process asks whether it is the primary running copy of the
//! application for its product variant. The primary listens on a local IPC
//! channel; every later launch forwards its invocation (a URL-scheme command
//! or a bare activation request) to the primary and exits.
//!
//! - Acquiring a race-free cross-process [`InstanceGuard`]
//! - Relaying one message per connection over a local socket or named pipe
//! - Parsing URL commands into typed [`Command`] values
//! - Driving startup and ordered teardown through [`ApplicationLifecycle`]
//!
//! # Example
//!
//! ```no_run
//! use peerlaunch::{ApplicationLifecycle, CollaboratorSink, LaunchConfig, Role, Variant};
//!
//! # async fn example() -> peerlaunch::Result<()> {
//! let config = LaunchConfig::new(Variant::default());
//! let sink = CollaboratorSink::new();
//! let mut lifecycle = ApplicationLifecycle::new(config, sink.clone());
//!
//! match lifecycle.start(Some("app://open-profile/79991234567")).await? {
//!     Role::Primary { .. } => {
//!         // build the window, then:
//!         // lifecycle.register_window(handle)?;
//!         lifecycle.run_until(std::future::pending::<()>()).await?;
//!     }
//!     Role::Secondary(delivery) => {
//!         println!("forwarded: {delivery:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Almost every failure is absorbed where it happens: an unusable lock
//! degrades to "assume first", an unreachable primary triggers a fallback to
//! primary, malformed commands are dropped. Only a guard that cannot be
//! created at all surfaces as [`LaunchError::Guard`].
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`.

// Internal implementation modules
mod core;
mod platform;
mod types;

// Public API modules
pub mod api;

// Re-exported public API
pub use api::command::{Command, Feature};
pub use api::lifecycle::{ApplicationLifecycle, LifecycleState, Role, Teardown, WindowRegistrar};
pub use api::models::{
    ChannelName, Delivery, GuardError, IpcError, LaunchConfig, LaunchError, Variant, WindowHandle,
};
pub use crate::core::guard::{GuardHandle, GuardProvider, InstanceGuard};
pub use crate::core::peer_client::PeerClient;
pub use crate::core::peer_server::{PeerEvent, PeerServer};
pub use crate::core::router::{CollaboratorSink, CommandRouter};
#[cfg(any(unix, windows))]
pub use platform::LockFileProvider;
pub use platform::{UnguardedProvider, default_provider};

/// A specialized `Result` type for launch operations.
pub type Result<T> = std::result::Result<T, LaunchError>;
