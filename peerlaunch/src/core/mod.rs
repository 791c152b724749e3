//! Core internal logic for instance coordination.
//!
//! This module contains the guard capability, the wire framing, both roles of
//! the local peer, and the command router.

pub(crate) mod framing;
pub(crate) mod guard;
pub(crate) mod peer_client;
pub(crate) mod peer_server;
pub(crate) mod router;
