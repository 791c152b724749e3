//! Constants for naming, wire framing, URL commands and timeouts.
//!
//! Everything that two cooperating processes must agree on lives here, so a
//! primary and a secondary built from the same source always derive the same
//! lock path, channel name and frame layout.

/// Prefix shared by every lock file and channel name.
pub const APP_PREFIX: &str = "peerlaunch";

/// Product variant identifiers.
pub mod variant {
    /// The default product build.
    pub const MAIN: &str = "main";
    /// The alternate "agent" build that may share a machine with `MAIN`.
    pub const AGENT: &str = "agent";
    /// Upper bound on variant id length, keeps socket paths well under `sun_path`.
    pub const MAX_LEN: usize = 64;
}

/// File name suffixes for per-variant resources.
pub mod suffix {
    pub const LOCK: &str = "lock";
    #[cfg(unix)]
    pub const SOCKET: &str = "sock";
}

/// Wire framing constants.
///
/// A frame is `[u32 big-endian length][u8 tag][payload]`, where `length`
/// counts the tag byte plus the payload.
pub mod frame {
    /// Maximum frame length (tag + payload).
    pub const MAX_LEN: u32 = 64 * 1024;

    /// UTF-8 command string (client -> server).
    pub const TAG_COMMAND: u8 = 0x01;
    /// Activation request, empty payload (client -> server).
    pub const TAG_ACTIVATE: u8 = 0x02;
    /// Window handle token, u64 big-endian (server -> client).
    pub const TAG_WINDOW_TOKEN: u8 = 0x03;
}

/// URL command vocabulary.
pub mod url_command {
    /// Scheme used when serializing commands back to URLs.
    pub const SCHEME: &str = "app";

    pub const HOST_JOIN_LIVECHAT: &str = "join-livechat";
    pub const HOST_JOIN_LIVECHAT_ALIAS: &str = "joinlivechat";
    pub const HOST_OPEN_PROFILE: &str = "open-profile";
    pub const HOST_OPEN_PROFILE_ALIAS: &str = "profile";
    pub const HOST_APP: &str = "app";
    pub const HOST_STICKERPACK_INFO: &str = "stickerpack-info";
    pub const HOST_STICKERPACK_INFO_ALIAS: &str = "stickerpack";

    /// Query flag that makes a chat join silent (`join=1`).
    pub const QUERY_JOIN: &str = "join";
    pub const QUERY_JOIN_SILENT: &str = "1";
}

/// Timeout constants for the local relay.
pub mod timeouts {
    use std::time::Duration;

    /// How long a secondary tries to reach the primary (2 seconds).
    const CONNECT_TIMEOUT_MS: u64 = 2_000;

    /// How long a secondary waits for the window token after `ACTIVATE` (2 seconds).
    const RESPONSE_TIMEOUT_MS: u64 = 2_000;

    /// How long the server waits for a connected client to deliver its frame (5 seconds).
    const SERVER_READ_TIMEOUT_MS: u64 = 5_000;

    /// Back-off between retries when a named pipe is busy or an accept fails.
    const RETRY_DELAY_MS: u64 = 50;

    /// Returns the default client connect/send timeout.
    pub fn connect_timeout() -> Duration {
        Duration::from_millis(CONNECT_TIMEOUT_MS)
    }

    /// Returns the default activation response timeout.
    pub fn response_timeout() -> Duration {
        Duration::from_millis(RESPONSE_TIMEOUT_MS)
    }

    /// Returns the default per-connection server read timeout.
    pub fn server_read_timeout() -> Duration {
        Duration::from_millis(SERVER_READ_TIMEOUT_MS)
    }

    /// Returns the retry back-off.
    pub fn retry_delay() -> Duration {
        Duration::from_millis(RETRY_DELAY_MS)
    }
}
