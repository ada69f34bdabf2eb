//! Connection-and-authentication bridge for Google Play Music Desktop
//! Player's WebSocket playback API.
//!
//! The bridge owns a single socket session to the player and turns its
//! asynchronous protocol into fire-and-forget operations plus two host
//! channels: inbound player events forwarded verbatim, and structured
//! error reports. Playback commands issued before the session has
//! authenticated are queued behind a readiness gate and delivered in issue
//! order once it fulfills.
//!
//! Architecture:
//! - `config.rs` - bridge configuration
//! - `error.rs` - host-facing error taxonomy
//! - `protocol.rs` - outgoing wire messages and the request counter
//! - `gate.rs` - the session readiness gate
//! - `transport.rs` - the WebSocket connection and event forwarding
//! - `auth.rs` - the auth handshake and code submission
//! - `dispatch.rs` - immediate and gated send paths
//! - `client.rs` - the session controller and public operations

mod auth;
mod client;
mod config;
mod dispatch;
mod error;
mod gate;
mod protocol;
mod transport;

pub use client::{ConnectionState, GpmdpClient};
pub use config::BridgeConfig;
pub use error::BridgeError;
