//! Bridge error types.

use thiserror::Error;

/// Errors reported to the host's error channel.
///
/// None of these terminate the session on their own. A rejected readiness
/// gate fails every send queued behind it individually; the host recovers by
/// calling `connect` again.
#[derive(Debug, Error)]
pub enum BridgeError {
  #[error("Invalid configuration: {0}")]
  Config(String),

  #[error("WebSocket error: {0}")]
  Transport(#[from] tokio_tungstenite::tungstenite::Error),

  /// An inbound frame that failed to parse. Fatal to that frame only.
  #[error("Malformed inbound frame: {source}")]
  Protocol {
    text: String,
    #[source]
    source: serde_json::Error,
  },

  /// A send that was dropped: no live transport, or the gate it was queued
  /// behind settled without fulfilling. `payload` is the serialized message
  /// with any credential redacted.
  #[error("Discarded message ({reason}): {payload}")]
  Dispatch { payload: String, reason: String },

  #[error("Authentication failed: {0}")]
  Auth(String),
}
