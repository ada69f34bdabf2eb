//! GPMDP playback API wire types.
//!
//! Reference: https://github.com/MarshallOfSound/Google-Play-Music-Desktop-Player-UNOFFICIAL-/blob/master/docs/PlaybackAPI_WebSocket.md

use serde::Serialize;

/// Marker substituted for credential values in diagnostic output.
pub const REDACTED: &str = "<private>";

/// Message sent to the player over the WebSocket.
///
/// `arguments` is omitted from the wire when empty, and `requestID` is only
/// carried by playback-state queries.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
  pub namespace: String,
  pub method: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub arguments: Vec<serde_json::Value>,
  #[serde(rename = "requestID", skip_serializing_if = "Option::is_none")]
  pub request_id: Option<u64>,
}

impl OutgoingMessage {
  fn new(namespace: &str, method: &str, arguments: Vec<serde_json::Value>) -> Self {
    Self {
      namespace: namespace.to_string(),
      method: method.to_string(),
      arguments,
      request_id: None,
    }
  }

  /// Bare connect announcement, sent when no credential is available yet.
  pub fn announce(app_name: &str) -> Self {
    Self::new("connect", "connect", vec![app_name.into()])
  }

  /// Connect request carrying an auth code (short-lived or permanent).
  pub fn connect_with_code(app_name: &str, code: &str) -> Self {
    Self::new("connect", "connect", vec![app_name.into(), code.into()])
  }

  /// Ask the player for its current playback state.
  pub fn playback_state_query(request_id: u64) -> Self {
    let mut message = Self::new("playback", "getPlaybackState", Vec::new());
    message.request_id = Some(request_id);
    message
  }

  /// Toggle between playing and paused.
  pub fn play_pause() -> Self {
    Self::new("playback", "playPause", Vec::new())
  }
}

/// Identifier counter for outgoing query messages.
///
/// Scoped to one connection; reset to 1 on every new connect. The identifiers
/// only need to be locally unique, they are never matched against anything
/// the player assigns.
#[derive(Debug)]
pub struct RequestCounter(u64);

impl RequestCounter {
  pub fn new() -> Self {
    Self(1)
  }

  /// Return the current identifier and advance.
  pub fn next_id(&mut self) -> u64 {
    let id = self.0;
    self.0 += 1;
    id
  }

  pub fn reset(&mut self) {
    self.0 = 1;
  }
}

impl Default for RequestCounter {
  fn default() -> Self {
    Self::new()
  }
}

/// Replace every occurrence of a credential in diagnostic text.
pub fn redact(text: &str, secret: &str) -> String {
  if secret.is_empty() {
    return text.to_string();
  }
  text.replace(secret, REDACTED)
}
