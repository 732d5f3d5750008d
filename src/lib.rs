//! User-facing Rust SDK for the Airlift file-deployment service.
//!
//! The crate is organized by transport surface:
//! - `client`: top-level connector facade.
//! - `config`: candidate endpoints, credentials, and connector defaults.
//! - `negotiate`: endpoint probing and session negotiation.
//! - `gateway`: authenticated request, upload, and download operations.
//! - `stream`: realtime websocket channel.

/// Top-level connector facade.
pub mod client;
/// Candidate endpoints, credentials, and connector defaults.
pub mod config;
/// Authenticated request, upload, and download operations.
pub mod gateway;
/// Endpoint probing, session negotiation, and session state.
pub mod negotiate;
/// Realtime websocket channel.
pub mod stream;
