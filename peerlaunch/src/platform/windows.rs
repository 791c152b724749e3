//! Named pipe transport.

use futures_timer::Delay;
use std::io;
use std::path::{Path, PathBuf};
use tokio::net::windows::named_pipe::{
    ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
};

use crate::api::models::IpcError;
use crate::types::constants::timeouts;

pub(crate) type ServerStream = NamedPipeServer;
pub(crate) type ClientStream = NamedPipeClient;

/// All pipe instances are busy; retry shortly.
const ERROR_PIPE_BUSY: i32 = 231;

/// Pipe names are global, so the runtime directory is folded into the name
/// to keep separately configured installs apart.
pub(crate) fn endpoint_address(name: &str, runtime_dir: &Path) -> PathBuf {
    let digest = fnv1a(runtime_dir.to_string_lossy().as_bytes());
    PathBuf::from(format!(r"\\.\pipe\{name}-{digest:016x}"))
}

/// Every build and every process must derive the same pipe name, and std's
/// hashers make no such promise across releases. FNV-1a is fixed.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Server side of the pipe. Always keeps one idle instance waiting so no
/// client ever sees "pipe not found" while the primary is alive.
#[derive(Debug)]
pub(crate) struct Listener {
    address: PathBuf,
    next: NamedPipeServer,
}

pub(crate) fn bind(address: &Path) -> Result<Listener, IpcError> {
    let next = ServerOptions::new()
        .first_pipe_instance(true)
        .reject_remote_clients(true)
        .create(address)
        .map_err(|source| IpcError::Bind {
            address: address.to_path_buf(),
            source,
        })?;

    Ok(Listener {
        address: address.to_path_buf(),
        next,
    })
}

impl Listener {
    /// Waits for a client on the idle instance and arms a new one.
    ///
    /// The idle instance is replaced even when the connect fails. A client
    /// that opened, wrote and closed before the instance was armed leaves it
    /// dead (`ERROR_NO_DATA`), and reusing it would fail forever.
    pub(crate) async fn accept(&mut self) -> io::Result<ServerStream> {
        let connected = self.next.connect().await;
        let fresh = ServerOptions::new()
            .reject_remote_clients(true)
            .create(&self.address)?;
        let pipe = std::mem::replace(&mut self.next, fresh);
        connected.map(|()| pipe)
    }
}

pub(crate) async fn connect(address: &Path) -> io::Result<ClientStream> {
    loop {
        match ClientOptions::new().open(address) {
            Ok(client) => return Ok(client),
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {}
            Err(e) => return Err(e),
        }
        Delay::new(timeouts::retry_delay()).await;
    }
}
