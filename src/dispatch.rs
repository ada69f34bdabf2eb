//! Message dispatch: the immediate send path and the gated pump.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::client::Shared;
use crate::error::BridgeError;
use crate::gate::{GateOutcome, GateWaiter};
use crate::protocol::{redact, OutgoingMessage};
use crate::transport::Transport;

/// Serialize a message and push it straight onto the transport, bypassing
/// the gate. Used by the auth flow and by the pump once the gate fulfills.
///
/// `secret` is a credential carried by the message; it is substituted out
/// of every diagnostic string while the true value goes on the wire. A
/// missing or closed transport is reported to the error channel and the
/// message dropped; there is no retry. Returns whether the frame reached
/// the writer.
pub fn send_immediate(
  transport: Option<&Transport>,
  message: &OutgoingMessage,
  secret: Option<&str>,
  errors: &mpsc::UnboundedSender<BridgeError>,
) -> bool {
  let payload = match serde_json::to_string(message) {
    Ok(payload) => payload,
    Err(e) => {
      let text = sanitize(&format!("{:?}", message), secret);
      log::error!("Failed to serialize outgoing message: {}", e);
      let _ = errors.send(BridgeError::Dispatch {
        payload: text,
        reason: format!("serialization failed: {}", e),
      });
      return false;
    }
  };
  let sanitized = sanitize(&payload, secret);

  match transport {
    Some(transport) => {
      log::info!("Sending JSON: {}", sanitized);
      match transport.send(payload) {
        Ok(()) => true,
        Err(e) => {
          log::error!("Transport closed. Discarding JSON message: {}", sanitized);
          let _ = errors.send(BridgeError::Dispatch {
            payload: sanitized,
            reason: format!("transport closed: {}", e),
          });
          false
        }
      }
    }
    None => {
      log::error!("No WebSocket. Discarding JSON message: {}", sanitized);
      let _ = errors.send(BridgeError::Dispatch {
        payload: sanitized,
        reason: "no live transport".to_string(),
      });
      false
    }
  }
}

fn sanitize(text: &str, secret: Option<&str>) -> String {
  match secret {
    Some(secret) => redact(text, secret),
    None => text.to_string(),
  }
}

/// Per-connection pump that delivers gated sends.
///
/// All gated messages for one connection flow through a single queue with
/// this task as the only consumer, so delivery order always matches issue
/// order. Once the gate fulfills, every queued and future message is
/// forwarded through the immediate path; if the gate settles any other way,
/// every queued and future message is reported to the error channel
/// instead. Transport lookups are bound to the connection's epoch so a
/// draining pump can never write onto a newer session's socket.
pub async fn run_gated_pump(
  waiter: GateWaiter,
  mut queue: mpsc::UnboundedReceiver<OutgoingMessage>,
  shared: Arc<Mutex<Shared>>,
  epoch: u64,
  errors: mpsc::UnboundedSender<BridgeError>,
) {
  match waiter.wait().await {
    GateOutcome::Fulfilled => {
      while let Some(message) = queue.recv().await {
        let transport = shared.lock().transport_for_epoch(epoch);
        send_immediate(transport.as_deref(), &message, None, &errors);
      }
    }
    GateOutcome::Rejected(reason) => {
      let reason = format!("readiness gate rejected: {}", reason);
      report_undeliverable(&mut queue, &errors, &reason).await;
    }
    GateOutcome::Superseded => {
      report_undeliverable(&mut queue, &errors, "connection superseded").await;
    }
  }
}

/// Drain a dead connection's queue, reporting every message.
async fn report_undeliverable(
  queue: &mut mpsc::UnboundedReceiver<OutgoingMessage>,
  errors: &mpsc::UnboundedSender<BridgeError>,
  reason: &str,
) {
  while let Some(message) = queue.recv().await {
    let payload = serde_json::to_string(&message).unwrap_or_else(|_| format!("{:?}", message));
    log::error!("Error sending JSON ({}): {}", reason, payload);
    let _ = errors.send(BridgeError::Dispatch {
      payload,
      reason: reason.to_string(),
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gate::ReadinessGate;

  #[test]
  fn test_send_without_transport_reports_and_drops() {
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    let message = OutgoingMessage::play_pause();
    assert!(!send_immediate(None, &message, None, &errors_tx));
    match errors_rx.try_recv() {
      Ok(BridgeError::Dispatch { payload, reason }) => {
        assert!(payload.contains("playPause"));
        assert_eq!(reason, "no live transport");
      }
      other => panic!("expected dispatch error, got {:?}", other),
    }
  }

  #[test]
  fn test_reported_payload_is_redacted() {
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    let message = OutgoingMessage::connect_with_code("Background Music", "12-34");
    send_immediate(None, &message, Some("12-34"), &errors_tx);
    match errors_rx.try_recv() {
      Ok(BridgeError::Dispatch { payload, .. }) => {
        assert!(payload.contains("<private>"));
        assert!(!payload.contains("12-34"));
      }
      other => panic!("expected dispatch error, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_rejected_gate_reports_queued_sends_in_order() {
    let gate = ReadinessGate::new();
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Mutex::new(Shared::new()));

    queue_tx.send(OutgoingMessage::playback_state_query(1)).unwrap();
    queue_tx.send(OutgoingMessage::play_pause()).unwrap();
    gate.reject("socket error");

    let pump = tokio::spawn(run_gated_pump(
      gate.waiter(),
      queue_rx,
      shared,
      1,
      errors_tx,
    ));
    drop(queue_tx);
    pump.await.unwrap();

    let first = errors_rx.recv().await.unwrap();
    let second = errors_rx.recv().await.unwrap();
    match (first, second) {
      (
        BridgeError::Dispatch { payload: p1, reason: r1 },
        BridgeError::Dispatch { payload: p2, .. },
      ) => {
        assert!(p1.contains("getPlaybackState"));
        assert!(p2.contains("playPause"));
        assert!(r1.contains("socket error"));
      }
      other => panic!("expected two dispatch errors, got {:?}", other),
    }
    assert!(errors_rx.recv().await.is_none());
  }
}
