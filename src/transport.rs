//! WebSocket transport to the player.
//!
//! One open transport owns exactly one socket connection, serviced by a
//! reader task and a writer task. Sends are queued to the writer through a
//! channel; everything the socket produces is routed out as a
//! [`TransportEvent`] for the forwarder to fan out to the host.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, tungstenite};
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;
use crate::gate::ReadinessGate;

/// Socket-level events produced by the reader and writer tasks.
#[derive(Debug)]
pub enum TransportEvent {
  /// A parsed inbound frame.
  Frame(serde_json::Value),
  /// A text frame that failed to parse. Fatal to that frame only.
  Malformed {
    text: String,
    source: serde_json::Error,
  },
  /// A socket-level failure, from either task.
  Failed(tungstenite::Error),
  /// The peer closed the connection.
  Closed,
}

/// Writer channel message.
enum WriteMessage {
  Frame(String),
  Close,
}

/// A live WebSocket connection to the player.
pub struct Transport {
  write_tx: async_channel::Sender<WriteMessage>,
  cancel: CancellationToken,
  _reader_handle: JoinHandle<()>,
  _writer_handle: JoinHandle<()>,
}

impl Transport {
  /// Open a socket connection and spawn its reader and writer tasks.
  ///
  /// Reader events arrive on `events_tx` until the connection ends.
  pub async fn open(
    url: &str,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
  ) -> Result<Self, tungstenite::Error> {
    let (ws_stream, _) = connect_async(url).await?;
    let (write, read) = ws_stream.split();
    log::info!("WebSocket connected to {}", url);

    let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();
    let cancel = CancellationToken::new();

    let reader_events = events_tx.clone();
    let reader_cancel = cancel.clone();
    let reader_handle = tokio::spawn(async move {
      Self::reader_loop(read, reader_events, reader_cancel).await;
    });

    let writer_handle = tokio::spawn(async move {
      Self::writer_loop(write, write_rx, events_tx).await;
    });

    Ok(Self {
      write_tx,
      cancel,
      _reader_handle: reader_handle,
      _writer_handle: writer_handle,
    })
  }

  /// Queue a text frame on the writer task.
  ///
  /// Fails if the writer has already exited; sending on a closed transport
  /// is reported by the caller, never a crash.
  pub fn send(&self, frame: String) -> Result<(), tungstenite::Error> {
    self
      .write_tx
      .try_send(WriteMessage::Frame(frame))
      .map_err(|_| tungstenite::Error::AlreadyClosed)
  }

  /// Close the connection: cancel the reader and tell the writer to send a
  /// close frame and exit.
  pub fn close(&self) {
    self.cancel.cancel();
    let _ = self.write_tx.try_send(WriteMessage::Close);
  }

  async fn reader_loop<S>(
    mut read: S,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
  ) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
  {
    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          // Deliberate close; not reported as a transport event.
          break;
        }
        frame = read.next() => {
          match frame {
            Some(Ok(Message::Text(text))) => {
              match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => {
                  let _ = events.send(TransportEvent::Frame(value));
                }
                Err(source) => {
                  let _ = events.send(TransportEvent::Malformed {
                    text: text.to_string(),
                    source,
                  });
                }
              }
            }
            Some(Ok(Message::Close(_))) => {
              let _ = events.send(TransportEvent::Closed);
              break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
              let _ = events.send(TransportEvent::Failed(e));
              break;
            }
            None => {
              let _ = events.send(TransportEvent::Closed);
              break;
            }
          }
        }
      }
    }
  }

  async fn writer_loop<S>(
    mut write: S,
    write_rx: async_channel::Receiver<WriteMessage>,
    events: mpsc::UnboundedSender<TransportEvent>,
  ) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
  {
    while let Ok(message) = write_rx.recv().await {
      match message {
        WriteMessage::Frame(text) => {
          if let Err(e) = write.send(Message::Text(text.into())).await {
            log::error!("WebSocket write error: {}", e);
            let _ = events.send(TransportEvent::Failed(e));
            break;
          }
        }
        WriteMessage::Close => {
          let _ = write.close().await;
          break;
        }
      }
    }
  }
}

/// Fan transport events out to the host.
///
/// Frames go to the host event channel verbatim. Socket-level failures and
/// closes reject the connection's gate (a no-op once it has settled) and are
/// reported as transport errors. Runs until the connection's tasks drop
/// their event senders.
pub async fn run_forwarder(
  mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
  events: mpsc::UnboundedSender<serde_json::Value>,
  errors: mpsc::UnboundedSender<BridgeError>,
  gate: ReadinessGate,
) {
  while let Some(event) = transport_events.recv().await {
    match event {
      TransportEvent::Frame(value) => {
        let _ = events.send(value);
      }
      TransportEvent::Malformed { text, source } => {
        log::warn!("Failed to parse inbound frame: {} - {}", source, text);
        let _ = errors.send(BridgeError::Protocol { text, source });
      }
      TransportEvent::Failed(e) => {
        log::error!("WebSocket error: {}", e);
        gate.reject(e.to_string());
        let _ = errors.send(BridgeError::Transport(e));
      }
      TransportEvent::Closed => {
        log::info!("WebSocket closed by server");
        gate.reject("connection closed");
        let _ = errors.send(BridgeError::Transport(
          tungstenite::Error::ConnectionClosed,
        ));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_reader_routes_frames_and_skips_malformed() {
    let frames = vec![
      Ok(Message::Text(r#"{"channel":"playState"}"#.into())),
      Ok(Message::Text("not json".into())),
      Ok(Message::Text(r#"{"channel":"track"}"#.into())),
      Ok(Message::Close(None)),
    ];
    let (tx, mut rx) = mpsc::unbounded_channel();
    Transport::reader_loop(futures_util::stream::iter(frames), tx, CancellationToken::new())
      .await;

    assert!(matches!(rx.recv().await, Some(TransportEvent::Frame(_))));
    match rx.recv().await {
      Some(TransportEvent::Malformed { text, .. }) => assert_eq!(text, "not json"),
      other => panic!("expected malformed event, got {:?}", other),
    }
    assert!(matches!(rx.recv().await, Some(TransportEvent::Frame(_))));
    assert!(matches!(rx.recv().await, Some(TransportEvent::Closed)));
    assert!(rx.recv().await.is_none());
  }

  #[tokio::test]
  async fn test_reader_reports_socket_error_and_stops() {
    let frames = vec![
      Ok(Message::Text(r#"{"ok":true}"#.into())),
      Err(tungstenite::Error::ConnectionClosed),
    ];
    let (tx, mut rx) = mpsc::unbounded_channel();
    Transport::reader_loop(futures_util::stream::iter(frames), tx, CancellationToken::new())
      .await;

    assert!(matches!(rx.recv().await, Some(TransportEvent::Frame(_))));
    assert!(matches!(rx.recv().await, Some(TransportEvent::Failed(_))));
    assert!(rx.recv().await.is_none());
  }

  #[tokio::test]
  async fn test_forwarder_rejects_gate_on_failure() {
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let (event_tx, _event_rx) = mpsc::unbounded_channel();
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let gate = ReadinessGate::new();

    transport_tx
      .send(TransportEvent::Failed(tungstenite::Error::ConnectionClosed))
      .unwrap();
    drop(transport_tx);
    run_forwarder(transport_rx, event_tx, error_tx, gate.clone()).await;

    assert!(!gate.is_pending());
    assert!(matches!(error_rx.recv().await, Some(BridgeError::Transport(_))));
  }
}
