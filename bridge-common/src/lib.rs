//! Shared types for the DJ console to video wall coordination server.
//!
//! Holds the wire/event types, the data model, and the error type used by
//! the `bridge-server` binary. No I/O driver lives here.

pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
