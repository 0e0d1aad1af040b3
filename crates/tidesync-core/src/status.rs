//! Remote connectivity status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed connectivity of one sync root.
///
/// Timestamps only move on actual transitions, so repeated reports of the
/// same state keep the time the state was entered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Whether the remote is currently reachable and authorized.
    pub connected: bool,
    /// When the last transition into the connected state happened.
    pub connected_since: Option<DateTime<Utc>>,
    /// When the last transition out of the connected state happened.
    pub disconnected_since: Option<DateTime<Utc>>,
    /// Reason reported with the last disconnect.
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    /// Create a status that has never connected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful contact with the remote.
    pub fn mark_connected(&mut self, at: DateTime<Utc>) {
        if !self.connected {
            self.connected = true;
            self.connected_since = Some(at);
            self.last_error = None;
        }
    }

    /// Record loss of connectivity or authorization.
    pub fn mark_disconnected(&mut self, at: DateTime<Utc>, reason: impl Into<String>) {
        if self.connected || self.disconnected_since.is_none() {
            self.disconnected_since = Some(at);
        }
        self.connected = false;
        self.last_error = Some(reason.into());
    }
}
