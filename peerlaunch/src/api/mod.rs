//! Public API module.
//!
//! This module contains the high-level user-facing API for the `peerlaunch` crate.

pub mod command;
pub mod lifecycle;
pub mod models;
