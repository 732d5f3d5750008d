//! Realtime stream modules.
//!
//! - `client`: websocket channel, handle, and lifecycle state.

/// Websocket channel and handle.
pub mod client;
