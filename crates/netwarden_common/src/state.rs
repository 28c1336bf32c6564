//! Connectivity state model.
//!
//! The state machine in the daemon owns exactly one current
//! `ConnectivityState` at a time plus the `StateContext` that accompanied the
//! transition into it. Consumers (observer callback, presentation layer)
//! only ever see read-only snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of network the device is attached to, or transitioning toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    WaitingForNetwork,
    Disconnected,
    Reconnecting,
    Connecting,
    ConnectedKnown,
    ConnectedHome,
    ConnectedNew,
    ConnectedBlacklisted,
    ScanningInProgress,
    ScanCompleted,
    PerformAction,
}

impl ConnectivityState {
    /// Wire name, as pushed to live listeners.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingForNetwork => "WAITING_FOR_NETWORK",
            Self::Disconnected => "DISCONNECTED",
            Self::Reconnecting => "RECONNECTING",
            Self::Connecting => "CONNECTING",
            Self::ConnectedKnown => "CONNECTED_KNOWN",
            Self::ConnectedHome => "CONNECTED_HOME",
            Self::ConnectedNew => "CONNECTED_NEW",
            Self::ConnectedBlacklisted => "CONNECTED_BLACKLISTED",
            Self::ScanningInProgress => "SCANNING_IN_PROGRESS",
            Self::ScanCompleted => "SCAN_COMPLETED",
            Self::PerformAction => "PERFORM_ACTION",
        }
    }

    /// Every state, in declaration order.
    pub fn all() -> &'static [ConnectivityState] {
        &[
            Self::WaitingForNetwork,
            Self::Disconnected,
            Self::Reconnecting,
            Self::Connecting,
            Self::ConnectedKnown,
            Self::ConnectedHome,
            Self::ConnectedNew,
            Self::ConnectedBlacklisted,
            Self::ScanningInProgress,
            Self::ScanCompleted,
            Self::PerformAction,
        ]
    }

    /// True for the connected family of states, which require a MAC address
    /// in the transition context.
    pub fn requires_mac(&self) -> bool {
        matches!(
            self,
            Self::ConnectedKnown | Self::ConnectedHome | Self::ConnectedNew | Self::ConnectedBlacklisted
        )
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata accompanying a state transition. Replaced wholesale on every
/// transition; read-only to consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateContext {
    /// Gateway MAC for the connected family of states.
    #[serde(default)]
    pub mac: String,
    /// Free-text message for the presentation layer.
    #[serde(default)]
    pub message: String,
    /// Structured alert payload, if the transition carries one.
    #[serde(default)]
    pub alert_data: serde_json::Value,
    /// Arguments for PERFORM_ACTION: [plugin_name, network_id, ...].
    #[serde(default)]
    pub perform_action_data: Vec<serde_json::Value>,
}

impl StateContext {
    pub fn with_mac(mac: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            ..Self::default()
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn for_action(args: Vec<serde_json::Value>) -> Self {
        Self {
            perform_action_data: args,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_serde() {
        for state in ConnectivityState::all() {
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, serde_json::Value::String(state.as_str().to_string()));
            let back: ConnectivityState = serde_json::from_value(json).unwrap();
            assert_eq!(back, *state);
        }
    }

    #[test]
    fn connected_family_requires_mac() {
        assert!(ConnectivityState::ConnectedBlacklisted.requires_mac());
        assert!(ConnectivityState::ConnectedHome.requires_mac());
        assert!(ConnectivityState::ConnectedNew.requires_mac());
        assert!(ConnectivityState::ConnectedKnown.requires_mac());
        assert!(!ConnectivityState::Disconnected.requires_mac());
        assert!(!ConnectivityState::PerformAction.requires_mac());
    }

    #[test]
    fn all_lists_every_state() {
        assert_eq!(ConnectivityState::all().len(), 11);
    }
}
