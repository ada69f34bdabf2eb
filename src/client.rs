//! Session controller: owns the connection lifecycle and exposes the
//! public operations of the bridge.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::auth;
use crate::config::BridgeConfig;
use crate::dispatch;
use crate::error::BridgeError;
use crate::gate::ReadinessGate;
use crate::protocol::{OutgoingMessage, RequestCounter};
use crate::transport::{self, Transport, TransportEvent};

/// Connection lifecycle state.
///
/// Driven only by the session controller and the auth flow. Socket failures
/// are reported on the error channel but do not transition the state; the
/// host recovers by calling [`GpmdpClient::connect`] again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  Authenticating,
  Ready,
}

/// Mutable session state behind the client's lock.
///
/// At most one transport, gate and gated queue exist at a time; `connect`
/// is the only place they are replaced, and each replacement bumps the
/// epoch so tasks belonging to an older connection can tell they are stale.
pub(crate) struct Shared {
  state: ConnectionState,
  epoch: u64,
  counter: RequestCounter,
  transport: Option<Arc<Transport>>,
  gate: Option<ReadinessGate>,
  gated_tx: Option<mpsc::UnboundedSender<OutgoingMessage>>,
}

impl Shared {
  pub(crate) fn new() -> Self {
    Self {
      state: ConnectionState::Disconnected,
      epoch: 0,
      counter: RequestCounter::new(),
      transport: None,
      gate: None,
      gated_tx: None,
    }
  }

  /// The transport belonging to `epoch`, if it is still the live one.
  pub(crate) fn transport_for_epoch(&self, epoch: u64) -> Option<Arc<Transport>> {
    if self.epoch == epoch {
      self.transport.clone()
    } else {
      None
    }
  }
}

/// Bridge client for Google Play Music Desktop Player.
///
/// All operations are synchronous and fire-and-forget: outcomes surface on
/// the event and error channels rather than as return values, mirroring the
/// player's own asynchronous protocol. `connect` and the playback
/// operations spawn background work and must be called from within a Tokio
/// runtime.
pub struct GpmdpClient {
  config: BridgeConfig,
  shared: Arc<Mutex<Shared>>,
  events_tx: mpsc::UnboundedSender<serde_json::Value>,
  events_rx: Mutex<Option<mpsc::UnboundedReceiver<serde_json::Value>>>,
  errors_tx: mpsc::UnboundedSender<BridgeError>,
  errors_rx: Mutex<Option<mpsc::UnboundedReceiver<BridgeError>>>,
}

impl GpmdpClient {
  /// Create a client with the given configuration.
  pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
    config.validate().map_err(BridgeError::Config)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (errors_tx, errors_rx) = mpsc::unbounded_channel();
    Ok(Self {
      config,
      shared: Arc::new(Mutex::new(Shared::new())),
      events_tx,
      events_rx: Mutex::new(Some(events_rx)),
      errors_tx,
      errors_rx: Mutex::new(Some(errors_rx)),
    })
  }

  /// Connect to the player, optionally presenting a saved permanent auth
  /// code.
  ///
  /// Any prior session is torn down first: its socket is closed, its gate
  /// superseded (sends still queued behind it are reported as errors, not
  /// silently dropped) and the request counter reset. The socket handshake
  /// and auth flow then run in the background. Without a permanent code the
  /// player displays a short-lived code for the user; pass it to
  /// [`submit_auth_code`](Self::submit_auth_code) to finish authenticating.
  pub fn connect(&self, permanent_code: Option<&str>) {
    let (gate, epoch, gated_rx) = {
      let mut shared = self.shared.lock();
      if let Some(old) = shared.transport.take() {
        log::info!("Closing WebSocket");
        old.close();
      }
      if let Some(old) = shared.gate.take() {
        old.supersede();
      }
      shared.gated_tx = None;

      shared.epoch += 1;
      shared.counter.reset();
      shared.state = ConnectionState::Connecting;

      let gate = ReadinessGate::new();
      shared.gate = Some(gate.clone());
      let (gated_tx, gated_rx) = mpsc::unbounded_channel();
      shared.gated_tx = Some(gated_tx);
      (gate, shared.epoch, gated_rx)
    };

    tokio::spawn(dispatch::run_gated_pump(
      gate.waiter(),
      gated_rx,
      self.shared.clone(),
      epoch,
      self.errors_tx.clone(),
    ));

    let shared = self.shared.clone();
    let events_tx = self.events_tx.clone();
    let errors_tx = self.errors_tx.clone();
    let url = self.config.player_url.clone();
    let app_name = self.config.app_name.clone();
    let permanent_code = permanent_code.map(str::to_string);
    tokio::spawn(async move {
      let (transport_events_tx, transport_events_rx) =
        mpsc::unbounded_channel::<TransportEvent>();
      tokio::spawn(transport::run_forwarder(
        transport_events_rx,
        events_tx,
        errors_tx.clone(),
        gate.clone(),
      ));

      match Transport::open(&url, transport_events_tx).await {
        Ok(new_transport) => {
          let new_transport = Arc::new(new_transport);
          let mut shared = shared.lock();
          if shared.epoch != epoch {
            // A newer connect won the race; close our socket and bow out
            // without touching the live session.
            drop(shared);
            new_transport.close();
            return;
          }
          shared.transport = Some(new_transport.clone());
          shared.state = auth::open_handshake(
            &new_transport,
            &gate,
            &app_name,
            permanent_code.as_deref(),
            &errors_tx,
          );
        }
        Err(e) => {
          if shared.lock().epoch != epoch {
            log::debug!("Ignoring connect failure for a replaced session: {}", e);
            return;
          }
          log::error!("WebSocket connection to {} failed: {}", url, e);
          gate.reject(e.to_string());
          let _ = errors_tx.send(BridgeError::Transport(e));
        }
      }
    });
  }

  /// Close the current session. A no-op when nothing is connected.
  ///
  /// Sends still queued behind the session's gate fail promptly with a
  /// reported error. An in-flight socket handshake is invalidated and
  /// closes its own socket when it completes.
  pub fn disconnect(&self) {
    let mut shared = self.shared.lock();
    let transport = shared.transport.take();
    let gate = shared.gate.take();
    if transport.is_none() && gate.is_none() {
      return;
    }
    if let Some(transport) = transport {
      log::info!("Closing WebSocket");
      transport.close();
    }
    if let Some(gate) = gate {
      gate.reject("disconnected");
    }
    shared.gated_tx = None;
    shared.epoch += 1;
    shared.state = ConnectionState::Disconnected;
  }

  /// Submit a short-lived auth code from the player's pairing prompt.
  ///
  /// The code arrives percent-encoded; the decoded value goes on the wire
  /// and is redacted from every diagnostic.
  pub fn submit_auth_code(&self, code: &str) {
    let mut shared = self.shared.lock();
    let gate = shared.gate.clone();
    let fulfilled = auth::submit_code(
      shared.transport.as_deref(),
      gate.as_ref(),
      &self.config.app_name,
      code,
      &self.errors_tx,
    );
    if fulfilled {
      shared.state = ConnectionState::Ready;
    }
  }

  /// Ask the player for its current playback state.
  ///
  /// The reply arrives on the event channel, tagged with this request's ID.
  /// An ID is consumed even when the message cannot be delivered, so IDs
  /// observed on the wire may have gaps.
  pub fn request_playback_state(&self) {
    let mut shared = self.shared.lock();
    let request_id = shared.counter.next_id();
    Self::send_gated(
      &mut shared,
      OutgoingMessage::playback_state_query(request_id),
      &self.errors_tx,
    );
  }

  /// Toggle the player between playing and paused.
  pub fn play_pause(&self) {
    let mut shared = self.shared.lock();
    Self::send_gated(&mut shared, OutgoingMessage::play_pause(), &self.errors_tx);
  }

  /// Current lifecycle state.
  pub fn state(&self) -> ConnectionState {
    self.shared.lock().state
  }

  /// Whether the session has authenticated.
  pub fn is_connected(&self) -> bool {
    self.state() == ConnectionState::Ready
  }

  /// Take the inbound event receiver.
  ///
  /// Player messages arrive here as parsed JSON, verbatim and in receive
  /// order, across reconnects. Can be taken once.
  pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<serde_json::Value>> {
    self.events_rx.lock().take()
  }

  /// Take the error receiver.
  ///
  /// Every discarded message and socket failure is reported here, across
  /// reconnects. Can be taken once.
  pub fn take_error_receiver(&self) -> Option<mpsc::UnboundedReceiver<BridgeError>> {
    self.errors_rx.lock().take()
  }

  /// Queue a message behind the current session's readiness gate.
  fn send_gated(
    shared: &mut Shared,
    message: OutgoingMessage,
    errors: &mpsc::UnboundedSender<BridgeError>,
  ) {
    match &shared.gated_tx {
      Some(gated_tx) => {
        if let Err(mpsc::error::SendError(message)) = gated_tx.send(message) {
          let payload =
            serde_json::to_string(&message).unwrap_or_else(|_| format!("{:?}", message));
          log::error!("Gated queue is gone. Discarding JSON message: {}", payload);
          let _ = errors.send(BridgeError::Dispatch {
            payload,
            reason: "gated queue closed".to_string(),
          });
        }
      }
      None => {
        let payload =
          serde_json::to_string(&message).unwrap_or_else(|_| format!("{:?}", message));
        log::error!("No WebSocket. Discarding JSON message: {}", payload);
        let _ = errors.send(BridgeError::Dispatch {
          payload,
          reason: "no session; connect first".to_string(),
        });
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_rejects_invalid_config() {
    let config = BridgeConfig {
      player_url: "http://localhost:5672".to_string(),
      ..Default::default()
    };
    assert!(matches!(GpmdpClient::new(config), Err(BridgeError::Config(_))));
  }

  #[test]
  fn test_gated_send_without_session_reports_error() {
    let client = GpmdpClient::new(BridgeConfig::default()).unwrap();
    let mut errors = client.take_error_receiver().unwrap();

    client.request_playback_state();
    match errors.try_recv() {
      Ok(BridgeError::Dispatch { payload, reason }) => {
        assert!(payload.contains(r#""requestID":1"#));
        assert!(reason.contains("no session"));
      }
      other => panic!("expected dispatch error, got {:?}", other),
    }

    // IDs keep advancing even though nothing was delivered.
    client.request_playback_state();
    match errors.try_recv() {
      Ok(BridgeError::Dispatch { payload, .. }) => {
        assert!(payload.contains(r#""requestID":2"#));
      }
      other => panic!("expected dispatch error, got {:?}", other),
    }
  }

  #[test]
  fn test_disconnect_without_session_is_a_noop() {
    let client = GpmdpClient::new(BridgeConfig::default()).unwrap();
    let mut errors = client.take_error_receiver().unwrap();
    client.disconnect();
    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(errors.try_recv().is_err());
  }

  #[test]
  fn test_receivers_can_be_taken_once() {
    let client = GpmdpClient::new(BridgeConfig::default()).unwrap();
    assert!(client.take_event_receiver().is_some());
    assert!(client.take_event_receiver().is_none());
    assert!(client.take_error_receiver().is_some());
    assert!(client.take_error_receiver().is_none());
  }
}
