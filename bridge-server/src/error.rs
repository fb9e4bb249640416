//! Error type for the bridge server binary.
//!
//! Re-exports `bridge_common::Error`, which already carries the
//! `IntoResponse` mapping the HTTP handlers need. Kept as its own module
//! (rather than importing `bridge_common::Error` directly everywhere) so
//! call sites read `crate::error::Result` the way the rest of this
//! codebase's modules expect.

pub use bridge_common::{Error, Result};
