//! Unix domain socket transport.

use log::{debug, warn};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};

use crate::api::models::IpcError;
use crate::types::constants::suffix;

pub(crate) type ServerStream = UnixStream;
pub(crate) type ClientStream = UnixStream;

/// `sun_path` is 104 bytes on macOS and 108 on Linux; use the smaller one.
const MAX_SOCKET_PATH: usize = 104;

pub(crate) fn endpoint_address(name: &str, runtime_dir: &Path) -> PathBuf {
    runtime_dir.join(format!("{name}.{}", suffix::SOCKET))
}

/// Bound server socket. Removes its socket file when dropped.
#[derive(Debug)]
pub(crate) struct Listener {
    inner: UnixListener,
    address: PathBuf,
}

/// Binds the server socket.
///
/// An existing socket file is removed only when nothing answers on it. A
/// live one belongs to a running primary and yields [`IpcError::InUse`].
pub(crate) fn bind(address: &Path) -> Result<Listener, IpcError> {
    let len = address.as_os_str().len();
    if len >= MAX_SOCKET_PATH {
        return Err(IpcError::AddressTooLong {
            address: address.to_path_buf(),
            len,
            max: MAX_SOCKET_PATH - 1,
        });
    }

    let bind_err = |source: io::Error| IpcError::Bind {
        address: address.to_path_buf(),
        source,
    };

    if address.exists() {
        if std::os::unix::net::UnixStream::connect(address).is_ok() {
            return Err(IpcError::InUse(address.to_path_buf()));
        }
        debug!("Removing stale socket {}", address.display());
        std::fs::remove_file(address).map_err(bind_err)?;
    }
    if let Some(parent) = address.parent() {
        std::fs::create_dir_all(parent).map_err(bind_err)?;
    }

    let listener = std::os::unix::net::UnixListener::bind(address).map_err(bind_err)?;

    // Owner-only access.
    std::fs::set_permissions(address, std::fs::Permissions::from_mode(0o600))
        .map_err(bind_err)?;

    listener.set_nonblocking(true).map_err(bind_err)?;
    let inner = UnixListener::from_std(listener).map_err(bind_err)?;

    Ok(Listener {
        inner,
        address: address.to_path_buf(),
    })
}

impl Listener {
    pub(crate) async fn accept(&mut self) -> io::Result<ServerStream> {
        let (stream, _addr) = self.inner.accept().await?;
        Ok(stream)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.address) {
            Ok(()) => debug!("Removed socket {}", self.address.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove socket {}: {e}", self.address.display()),
        }
    }
}

pub(crate) async fn connect(address: &Path) -> io::Result<ClientStream> {
    UnixStream::connect(address).await
}
