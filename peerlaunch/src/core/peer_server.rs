//! Primary-side listener for the local relay.
//!
//! An accept loop runs as a background task and hands each connection to its
//! own task, which reads exactly one frame under a deadline. Complete frames
//! are forwarded to the owner over a channel; partial, oversized or late
//! frames are logged and dropped without ever reaching the owner.
//!
//! Activation replies are answered from the connection task using the last
//! window handle the owner published, so a secondary never waits on the
//! owner's event loop. When no window exists yet the reply carries
//! [`WindowHandle::NULL`] and the raise is queued until
//! [`PeerServer::set_main_window`] is called.

use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use futures_timer::Delay;

use crate::api::models::{ChannelName, IpcError, WindowHandle};
use crate::core::framing::{Frame, read_frame, with_timeout, write_frame};
use crate::platform::{self, Listener, ServerStream};
use crate::types::constants::timeouts;

/// Something a secondary asked the primary to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A raw command string, not yet parsed.
    Command(String),
    /// Bring the given window to the foreground.
    Raise(WindowHandle),
}

/// Message from a connection task to the owner.
#[derive(Debug)]
enum Inbound {
    Command(String),
    Activate,
}

/// Listening side of the relay, owned by the primary.
#[derive(Debug)]
pub struct PeerServer {
    channel: ChannelName,
    accept_task: JoinHandle<()>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    window: watch::Sender<Option<WindowHandle>>,
    pending_raise: bool,
    ready: VecDeque<PeerEvent>,
}

impl PeerServer {
    /// Binds the channel and starts accepting.
    ///
    /// Must be called from within a Tokio runtime. Binding removes a stale
    /// endpoint left behind but fails with [`IpcError::InUse`] when another
    /// primary is still accepting on it.
    pub fn listen(channel: ChannelName, read_timeout: Duration) -> Result<Self, IpcError> {
        let listener = platform::bind(&channel.address)?;
        let (tx, inbound) = mpsc::unbounded_channel();
        let (window, window_rx) = watch::channel(None);

        let accept_task = tokio::spawn(accept_loop(listener, tx, window_rx, read_timeout));
        info!("Listening on {channel}");

        Ok(Self {
            channel,
            accept_task,
            inbound,
            window,
            pending_raise: false,
            ready: VecDeque::new(),
        })
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// The registered main window, if any.
    pub fn main_window(&self) -> Option<WindowHandle> {
        *self.window.borrow()
    }

    /// Whether an activation arrived before any window was registered.
    pub fn has_pending_raise(&self) -> bool {
        self.pending_raise
    }

    /// Publishes the main window handle.
    ///
    /// Later activation replies carry this handle. A raise queued while no
    /// window existed is released as the next event.
    pub fn set_main_window(&mut self, handle: WindowHandle) {
        self.window.send_replace(Some(handle));

        if std::mem::take(&mut self.pending_raise) {
            info!("Main window {handle} registered, performing queued raise");
            self.ready.push_back(PeerEvent::Raise(handle));
        }
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the accept loop has stopped. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<PeerEvent> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(event);
            }

            match self.inbound.recv().await? {
                Inbound::Command(cmd) => return Some(PeerEvent::Command(cmd)),
                Inbound::Activate => match self.main_window() {
                    Some(handle) => return Some(PeerEvent::Raise(handle)),
                    None => {
                        debug!("Activation before main window exists; queueing raise");
                        self.pending_raise = true;
                    }
                },
            }
        }
    }

    /// Stops accepting and removes the endpoint.
    ///
    /// Connections already being read are abandoned; nothing they carry is
    /// delivered after this returns.
    pub async fn shutdown(mut self) {
        self.accept_task.abort();
        if let Err(e) = (&mut self.accept_task).await
            && !e.is_cancelled()
        {
            warn!("Accept loop ended abnormally: {e}");
        }
        self.inbound.close();
        info!("Stopped listening on {}", self.channel);
    }
}

impl Drop for PeerServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    mut listener: Listener,
    tx: mpsc::UnboundedSender<Inbound>,
    window: watch::Receiver<Option<WindowHandle>>,
    read_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok(stream) => {
                let tx = tx.clone();
                let window = window.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, &tx, &window, read_timeout).await {
                        warn!("Dropped inbound message: {e}");
                    }
                });
            }
            Err(e) => {
                error!("Accept failed: {e}");
                Delay::new(timeouts::retry_delay()).await;
            }
        }
    }
}

/// Reads one frame from `stream` and acts on it.
async fn serve_connection(
    mut stream: ServerStream,
    tx: &mpsc::UnboundedSender<Inbound>,
    window: &watch::Receiver<Option<WindowHandle>>,
    read_timeout: Duration,
) -> Result<(), IpcError> {
    let frame = with_timeout(read_frame(&mut stream), read_timeout, IpcError::ResponseTimeout).await?;

    match frame {
        Frame::Command(cmd) => {
            debug!("Received command ({} bytes)", cmd.len());
            if tx.send(Inbound::Command(cmd)).is_err() {
                debug!("Owner gone, discarding command");
            }
        }
        Frame::Activate => {
            let token = window.borrow().unwrap_or(WindowHandle::NULL);
            debug!("Received activation request, replying with {token}");

            if tx.send(Inbound::Activate).is_err() {
                debug!("Owner gone, discarding activation");
            }
            write_frame(&mut stream, &Frame::WindowToken(token)).await?;
        }
        Frame::WindowToken(_) => {
            return Err(IpcError::Frame("unexpected window token from client".into()));
        }
    }

    Ok(())
}
