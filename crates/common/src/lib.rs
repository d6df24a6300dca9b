//! Shared types for the tutor session workspace
//!
//! `Secret` keeps passwords out of logs and zeroes them on drop; `Error` is the
//! configuration error type every binary validates into.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
