//! Shared constants.

pub(crate) mod constants;
