//! Command dispatch to collaborators.
//!
//! The router never acts on a command itself. It publishes each parsed
//! [`Command`] on a broadcast channel, and every collaborator (window,
//! contact list, profile panel, ...) subscribes independently and filters by
//! [`Command::feature`].

use log::{debug, warn};
use tokio::sync::broadcast;

use crate::api::command::Command;

/// Buffered commands per subscriber before the slowest one starts lagging.
const SINK_CAPACITY: usize = 64;

/// Publish side of the command channel.
///
/// Cloning shares the same channel; pass a clone to the lifecycle and
/// subscribe collaborators from another.
#[derive(Debug, Clone)]
pub struct CollaboratorSink {
    tx: broadcast::Sender<Command>,
}

impl CollaboratorSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SINK_CAPACITY);
        Self { tx }
    }

    /// Registers a new collaborator. It sees only commands sent afterwards.
    pub fn subscribe(&self) -> broadcast::Receiver<Command> {
        self.tx.subscribe()
    }

    /// Number of live collaborators.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, command: Command) -> usize {
        self.tx.send(command).unwrap_or(0)
    }
}

impl Default for CollaboratorSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless parse-and-dispatch front end.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRouter;

impl CommandRouter {
    /// Parses a raw URL command. See [`Command::parse`].
    pub fn parse(raw: &str) -> Option<Command> {
        Command::parse(raw)
    }

    /// Publishes `command` to every subscribed collaborator.
    ///
    /// Returns how many collaborators received it.
    pub fn dispatch(command: Command, sink: &CollaboratorSink) -> usize {
        debug!("Dispatching {command}");
        let delivered = sink.publish(command);
        if delivered == 0 {
            warn!("No collaborator subscribed; command dropped");
        }
        delivered
    }

    /// Parses and dispatches in one step. Malformed input is ignored.
    ///
    /// Returns whether a command was dispatched.
    pub fn route(raw: &str, sink: &CollaboratorSink) -> bool {
        match Self::parse(raw) {
            Some(command) => {
                Self::dispatch(command, sink);
                true
            }
            None => {
                debug!("Ignoring unrecognized command string");
                false
            }
        }
    }
}
