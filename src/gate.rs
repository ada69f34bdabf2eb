//! Session readiness gate.

use std::sync::Arc;
use tokio::sync::watch;

/// Terminal state of a readiness gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
  /// The session authenticated; gated sends may flow.
  Fulfilled,
  /// Authentication failed or the connection died before it completed.
  Rejected(String),
  /// A newer connection attempt replaced this gate.
  Superseded,
}

/// Single-use completion signal separating "socket open" from "session
/// authenticated and safe to send ordinary commands on".
///
/// A gate settles exactly once; later settle calls are no-ops. Waiters that
/// subscribe before or after settling all observe the same outcome. If every
/// handle to a still-pending gate is dropped, outstanding waiters resolve to
/// `Superseded`.
#[derive(Clone)]
pub struct ReadinessGate {
  tx: Arc<watch::Sender<Option<GateOutcome>>>,
}

impl ReadinessGate {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(None);
    Self { tx: Arc::new(tx) }
  }

  /// Pending → fulfilled.
  pub fn fulfill(&self) {
    self.settle(GateOutcome::Fulfilled);
  }

  /// Pending → rejected, observed by all current and future waiters.
  pub fn reject(&self, reason: impl Into<String>) {
    self.settle(GateOutcome::Rejected(reason.into()));
  }

  /// Pending → superseded, used only when the gate is replaced.
  pub fn supersede(&self) {
    self.settle(GateOutcome::Superseded);
  }

  #[allow(dead_code)]
  pub fn is_pending(&self) -> bool {
    self.tx.borrow().is_none()
  }

  pub fn waiter(&self) -> GateWaiter {
    GateWaiter {
      rx: self.tx.subscribe(),
    }
  }

  fn settle(&self, outcome: GateOutcome) {
    self.tx.send_if_modified(|slot| {
      if slot.is_none() {
        *slot = Some(outcome);
        true
      } else {
        false
      }
    });
  }
}

impl Default for ReadinessGate {
  fn default() -> Self {
    Self::new()
  }
}

/// Handle for awaiting a gate's outcome.
pub struct GateWaiter {
  rx: watch::Receiver<Option<GateOutcome>>,
}

impl GateWaiter {
  /// Suspend until the gate settles.
  pub async fn wait(mut self) -> GateOutcome {
    match self.rx.wait_for(|slot| slot.is_some()).await {
      Ok(outcome) => outcome.as_ref().cloned().unwrap_or(GateOutcome::Superseded),
      Err(_) => GateOutcome::Superseded,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_fulfill_resolves_current_and_future_waiters() {
    let gate = ReadinessGate::new();
    let early = tokio::spawn(gate.waiter().wait());
    gate.fulfill();
    assert_eq!(early.await.unwrap(), GateOutcome::Fulfilled);
    assert_eq!(gate.waiter().wait().await, GateOutcome::Fulfilled);
    assert!(!gate.is_pending());
  }

  #[tokio::test]
  async fn test_first_settle_wins() {
    let gate = ReadinessGate::new();
    gate.fulfill();
    gate.reject("too late");
    gate.supersede();
    assert_eq!(gate.waiter().wait().await, GateOutcome::Fulfilled);
  }

  #[tokio::test]
  async fn test_reject_carries_reason() {
    let gate = ReadinessGate::new();
    gate.reject("socket error");
    assert_eq!(
      gate.waiter().wait().await,
      GateOutcome::Rejected("socket error".to_string())
    );
  }

  #[tokio::test]
  async fn test_supersede_is_a_distinct_outcome() {
    let gate = ReadinessGate::new();
    let waiter = gate.waiter();
    gate.supersede();
    assert_eq!(waiter.wait().await, GateOutcome::Superseded);
  }

  #[tokio::test]
  async fn test_dropping_pending_gate_supersedes_waiters() {
    let gate = ReadinessGate::new();
    let waiter = gate.waiter();
    drop(gate);
    assert_eq!(waiter.wait().await, GateOutcome::Superseded);
  }
}
