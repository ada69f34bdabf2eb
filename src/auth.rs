//! Authentication flow for a player session.
//!
//! The player authorizes a controller either through a permanent auth code
//! saved from an earlier session, or through a short-lived code it displays
//! for the user to type in. Codes reach this module percent-encoded and are
//! decoded before they go on the wire.

use tokio::sync::mpsc;

use crate::client::ConnectionState;
use crate::dispatch;
use crate::error::BridgeError;
use crate::gate::ReadinessGate;
use crate::protocol::OutgoingMessage;
use crate::transport::Transport;

/// Run the handshake for a freshly opened socket.
///
/// With a permanent code the session is treated as ready immediately. With
/// none, a bare connect announcement is sent so the player displays a
/// short-lived code, and the gate stays pending until `submit_code`.
pub fn open_handshake(
  transport: &Transport,
  gate: &ReadinessGate,
  app_name: &str,
  permanent_code: Option<&str>,
  errors: &mpsc::UnboundedSender<BridgeError>,
) -> ConnectionState {
  match permanent_code {
    Some(code) => {
      log::info!("Connecting with auth code");
      if submit_code(Some(transport), Some(gate), app_name, code, errors) {
        ConnectionState::Ready
      } else {
        // Nothing usable went out; the gate is still pending and the host
        // can recover by submitting a fresh code.
        ConnectionState::Authenticating
      }
    }
    None => {
      log::info!("Connecting without auth code");
      dispatch::send_immediate(Some(transport), &OutgoingMessage::announce(app_name), None, errors);
      ConnectionState::Authenticating
    }
  }
}

/// Percent-decode an auth code and send it as a connect request, fulfilling
/// the gate when the frame reaches the writer. Returns whether the gate was
/// fulfilled.
///
/// Fulfillment is eager: the session counts as ready without waiting for
/// the player to acknowledge the code. If the player turns it down,
/// commands sent in the meantime are ignored on its side and it prompts for
/// a fresh code via an inbound connect event.
pub fn submit_code(
  transport: Option<&Transport>,
  gate: Option<&ReadinessGate>,
  app_name: &str,
  code: &str,
  errors: &mpsc::UnboundedSender<BridgeError>,
) -> bool {
  let decoded = match urlencoding::decode(code) {
    Ok(decoded) => decoded.into_owned(),
    Err(e) => {
      log::error!("Auth code is not valid percent-encoded UTF-8: {}", e);
      let _ = errors.send(BridgeError::Auth(format!(
        "auth code is not valid percent-encoded UTF-8: {}",
        e
      )));
      return false;
    }
  };

  let message = OutgoingMessage::connect_with_code(app_name, &decoded);
  if !dispatch::send_immediate(transport, &message, Some(&decoded), errors) {
    return false;
  }
  match gate {
    Some(gate) => {
      gate.fulfill();
      true
    }
    None => false,
  }
}
