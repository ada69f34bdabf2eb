//! Bridge configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the player bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
  /// WebSocket URL of the player's API endpoint.
  #[serde(default = "default_player_url")]
  pub player_url: String,

  /// Application name announced to the player during the handshake.
  #[serde(default = "default_app_name")]
  pub app_name: String,
}

fn default_player_url() -> String {
  "ws://localhost:5672".to_string()
}

fn default_app_name() -> String {
  "Background Music".to_string()
}

impl Default for BridgeConfig {
  fn default() -> Self {
    Self {
      player_url: default_player_url(),
      app_name: default_app_name(),
    }
  }
}

impl BridgeConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if !self.player_url.starts_with("ws://") && !self.player_url.starts_with("wss://") {
      return Err("Player URL must start with ws:// or wss://".to_string());
    }
    if self.app_name.trim().is_empty() {
      return Err("App name cannot be empty".to_string());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let config = BridgeConfig::default();
    assert_eq!(config.player_url, "ws://localhost:5672");
    assert_eq!(config.app_name, "Background Music");
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_rejects_non_websocket_url() {
    let config = BridgeConfig {
      player_url: "http://localhost:5672".to_string(),
      ..BridgeConfig::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_rejects_blank_app_name() {
    let config = BridgeConfig {
      app_name: "  ".to_string(),
      ..BridgeConfig::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_missing_fields_fall_back_to_defaults() {
    let config: BridgeConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.player_url, "ws://localhost:5672");
    assert_eq!(config.app_name, "Background Music");
  }
}
