use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::api::lifecycle::LifecycleState;
use crate::platform;
use crate::types::constants::{APP_PREFIX, timeouts, variant};

/// Product variant identity.
///
/// Two variants installed on the same machine (for example the main build and
/// the "agent" build) must never share an instance guard or a channel, while
/// two launches of the same variant must always meet on the same ones. Every
/// per-variant resource name is derived from this value and nothing else.
///
/// Ids are restricted to ASCII alphanumerics, `-` and `_` so they can be
/// embedded in file names and pipe names verbatim.
///
/// # Example
///
/// ```
/// use peerlaunch::Variant;
///
/// let v = Variant::new("agent").unwrap();
/// assert_eq!(v.as_str(), "agent");
/// assert!(Variant::new("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variant(String);

impl Variant {
    /// Validates and wraps a variant id.
    pub fn new(id: impl Into<String>) -> Result<Self, LaunchError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= variant::MAX_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(Self(id))
        } else {
            Err(LaunchError::InvalidVariant(id))
        }
    }

    /// The default product build.
    pub fn main() -> Self {
        Self(variant::MAIN.to_string())
    }

    /// The alternate "agent" build.
    pub fn agent() -> Self {
        Self(variant::AGENT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base name shared by this variant's lock file and channel.
    pub fn resource_name(&self) -> String {
        format!("{APP_PREFIX}-{}", self.0)
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::main()
    }
}

impl Display for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Variant {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Opaque token naming the primary instance's top-level window.
///
/// The primary hands this to secondaries in reply to an activation request so
/// they can ask the OS to move that window to the foreground. The null handle
/// (`0`) means the primary has no window yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(u64);

impl WindowHandle {
    /// The "no window" token.
    pub const NULL: Self = Self(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl Display for WindowHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Local IPC channel identity for one variant.
///
/// `name` is the platform-neutral identifier (`peerlaunch-<variant>`);
/// `address` is where the transport binds: a socket file inside the runtime
/// directory on Unix, a `\\.\pipe\` path on Windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName {
    pub name: String,
    pub address: PathBuf,
}

impl ChannelName {
    /// Derives the channel for `variant` under `runtime_dir`.
    pub fn for_variant(variant: &Variant, runtime_dir: &Path) -> Self {
        let name = variant.resource_name();
        let address = platform::endpoint_address(&name, runtime_dir);
        Self { name, address }
    }
}

impl Display for ChannelName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address.display())
    }
}

/// Explicit launch context handed to the lifecycle.
///
/// Holds everything the guard and peer need to agree on across processes,
/// plus the relay's timeouts.
///
/// # Example
///
/// ```
/// use peerlaunch::{LaunchConfig, Variant};
/// use std::time::Duration;
///
/// let config = LaunchConfig::new(Variant::agent())
///     .with_runtime_dir("/tmp/peerlaunch-test")
///     .with_connect_timeout(Duration::from_millis(500));
///
/// assert_eq!(config.connect_timeout, Duration::from_millis(500));
/// assert_eq!(config.channel().name, "peerlaunch-agent");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Product variant; partitions every named resource.
    pub variant: Variant,
    /// Directory holding the lock file (and the socket on Unix).
    pub runtime_dir: PathBuf,
    /// Bound on a secondary's connect + send attempt.
    pub connect_timeout: Duration,
    /// Bound on waiting for the window token after `ACTIVATE`.
    pub response_timeout: Duration,
    /// Bound on how long the primary waits for a connected client's frame.
    pub server_read_timeout: Duration,
}

impl LaunchConfig {
    /// Creates a configuration with default directory and timeouts.
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            runtime_dir: default_runtime_dir(),
            connect_timeout: timeouts::connect_timeout(),
            response_timeout: timeouts::response_timeout(),
            server_read_timeout: timeouts::server_read_timeout(),
        }
    }

    #[must_use]
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_server_read_timeout(mut self, timeout: Duration) -> Self {
        self.server_read_timeout = timeout;
        self
    }

    /// The channel both roles of this variant meet on.
    pub fn channel(&self) -> ChannelName {
        ChannelName::for_variant(&self.variant, &self.runtime_dir)
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::new(Variant::default())
    }
}

/// Per-user directory for locks and sockets.
///
/// Prefers `$XDG_RUNTIME_DIR`-style locations, then the local data directory,
/// then the system temp directory.
pub fn default_runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
}

/// Outcome of a secondary instance's delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// No primary answered within the connect timeout.
    Unreachable,
    /// A command was written to the primary; no reply is expected.
    Forwarded,
    /// `ACTIVATE` was answered with the primary's window token.
    Activated(WindowHandle),
}

impl Delivery {
    /// Whether a primary was reached at all.
    pub fn reached(&self) -> bool {
        !matches!(self, Self::Unreachable)
    }
}

/// Errors from acquiring the instance guard.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The lock object could not be created at all. Fatal.
    #[error("failed to create lock file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The lock call failed for a reason other than contention.
    #[error("lock primitive unavailable: {0}")]
    Unavailable(#[source] io::Error),
}

impl GuardError {
    /// Whether startup must abort instead of assuming first-instance status.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Create { .. })
    }
}

/// Errors from the local IPC channel.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The server endpoint could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another process is already accepting on the endpoint.
    #[error("another instance is already listening on {}", .0.display())]
    InUse(PathBuf),

    /// The endpoint address exceeds the platform limit.
    #[error("channel address too long ({len} bytes, max {max}): {address}")]
    AddressTooLong {
        address: PathBuf,
        len: usize,
        max: usize,
    },

    /// The primary did not accept a connection in time.
    #[error("timed out after {0:?} reaching the primary instance")]
    ConnectTimeout(Duration),

    /// The peer did not answer in time.
    #[error("timed out after {0:?} waiting for the peer")]
    ResponseTimeout(Duration),

    /// The connection failed mid-message.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The bytes on the wire were not a valid frame.
    #[error("malformed frame: {0}")]
    Frame(String),
}

/// Top-level error for launch operations.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("instance guard: {0}")]
    Guard(#[from] GuardError),

    #[error("local peer: {0}")]
    Ipc(#[from] IpcError),

    #[error("invalid variant id: {0:?}")]
    InvalidVariant(String),

    /// A lifecycle operation was called out of order.
    #[error("`{operation}` is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_accepts_simple_ids() {
        assert!(Variant::new("main").is_ok());
        assert!(Variant::new("agent").is_ok());
        assert!(Variant::new("beta_2-x").is_ok());
    }

    #[test]
    fn variant_rejects_path_like_ids() {
        for bad in ["", "a/b", "..", "with space", "tab\t", "ünï"] {
            assert!(
                matches!(Variant::new(bad), Err(LaunchError::InvalidVariant(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(Variant::new("x".repeat(variant::MAX_LEN + 1)).is_err());
    }

    #[test]
    fn variant_default_is_main() {
        assert_eq!(Variant::default(), Variant::main());
        assert_eq!("agent".parse::<Variant>().unwrap(), Variant::agent());
    }

    #[test]
    fn channel_names_are_deterministic_per_variant() {
        let dir = Path::new("/run/user/1000");
        let a1 = ChannelName::for_variant(&Variant::main(), dir);
        let a2 = ChannelName::for_variant(&Variant::main(), dir);
        let b = ChannelName::for_variant(&Variant::agent(), dir);

        assert_eq!(a1, a2);
        assert_ne!(a1.name, b.name);
        assert_ne!(a1.address, b.address);
    }

    #[test]
    fn window_handle_null() {
        assert!(WindowHandle::NULL.is_null());
        assert!(WindowHandle::default().is_null());
        assert!(!WindowHandle::new(42).is_null());
        assert_eq!(format!("{}", WindowHandle::new(255)), "0xff");
    }

    #[test]
    fn delivery_reached() {
        assert!(!Delivery::Unreachable.reached());
        assert!(Delivery::Forwarded.reached());
        assert!(Delivery::Activated(WindowHandle::NULL).reached());
    }

    #[test]
    fn guard_error_fatality() {
        let create = GuardError::Create {
            path: PathBuf::from("/nope/x.lock"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let unavailable = GuardError::Unavailable(io::Error::from(io::ErrorKind::Other));
        assert!(create.is_fatal());
        assert!(!unavailable.is_fatal());
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = LaunchConfig::new(Variant::main())
            .with_runtime_dir("/tmp/x")
            .with_response_timeout(Duration::from_millis(10))
            .with_server_read_timeout(Duration::from_millis(20));

        assert_eq!(config.runtime_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.response_timeout, Duration::from_millis(10));
        assert_eq!(config.server_read_timeout, Duration::from_millis(20));
        assert_eq!(config.connect_timeout, timeouts::connect_timeout());
    }
}
