//! Secondary-side delivery to the primary.

use futures_timer::Delay;
use log::{debug, info};
use std::io::ErrorKind;
use std::time::Duration;

use crate::api::models::{ChannelName, Delivery, IpcError, LaunchConfig};
use crate::core::framing::{Frame, read_frame, with_timeout, write_frame};
use crate::platform;
use crate::types::constants::timeouts;

/// One-shot sender used by a secondary instance.
///
/// Each call opens a fresh connection, writes exactly one frame and (for
/// activation) reads exactly one reply.
#[derive(Debug, Clone)]
pub struct PeerClient {
    channel: ChannelName,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl PeerClient {
    pub fn new(channel: ChannelName, connect_timeout: Duration, response_timeout: Duration) -> Self {
        Self {
            channel,
            connect_timeout,
            response_timeout,
        }
    }

    /// Builds a client for the channel and timeouts in `config`.
    pub fn from_config(config: &LaunchConfig) -> Self {
        Self::new(
            config.channel(),
            config.connect_timeout,
            config.response_timeout,
        )
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Delivers `command` to the primary, or an activation request when
    /// `command` is `None`.
    ///
    /// A primary that cannot be reached within the connect timeout yields
    /// `Ok(Delivery::Unreachable)` so the caller can fall back to becoming
    /// the primary itself. Failures after a connection was made are errors.
    pub async fn connect_and_send(&self, command: Option<&str>) -> Result<Delivery, IpcError> {
        let frame = match command {
            Some(cmd) => Frame::Command(cmd.to_string()),
            None => Frame::Activate,
        };

        // One deadline covers both reaching the primary and writing the frame.
        let mut connected = false;
        let sent = with_timeout(
            async {
                let mut stream = connect_with_retry(&self.channel).await?;
                connected = true;
                write_frame(&mut stream, &frame).await?;
                Ok(stream)
            },
            self.connect_timeout,
            IpcError::ConnectTimeout,
        )
        .await;

        let mut stream = match sent {
            Ok(stream) => stream,
            Err(e) if !connected => {
                info!("Primary instance unreachable on {}: {e}", self.channel);
                return Ok(Delivery::Unreachable);
            }
            Err(e) => return Err(e),
        };

        if command.is_some() {
            debug!("Forwarded command to {}", self.channel.name);
            return Ok(Delivery::Forwarded);
        }

        match with_timeout(
            read_frame(&mut stream),
            self.response_timeout,
            IpcError::ResponseTimeout,
        )
        .await?
        {
            Frame::WindowToken(handle) => {
                debug!("Primary answered activation with window {handle}");
                Ok(Delivery::Activated(handle))
            }
            other => Err(IpcError::Frame(format!(
                "expected window token, got {other:?}"
            ))),
        }
    }
}

/// Connects to the primary, retrying while its endpoint is missing or not
/// yet accepting. A primary that holds the guard but has not bound yet shows
/// up exactly like that.
async fn connect_with_retry(channel: &ChannelName) -> Result<platform::ClientStream, IpcError> {
    loop {
        match platform::connect(&channel.address).await {
            Ok(stream) => return Ok(stream),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
                debug!("{channel} not accepting yet ({e}); retrying");
                Delay::new(timeouts::retry_delay()).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
