use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{PanelError, Result};
use crate::protocol::{ClientMessage, SUB_PROTOCOL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        }
    }

    /// Whether the host should offer a reconnect action.
    #[must_use]
    pub fn can_reconnect(self) -> bool {
        self == Self::Disconnected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Instruction for the driver to open a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub generation: u64,
    pub url: String,
    pub protocol: String,
}

/// Connection state machine.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`, with
/// `Connecting -> Disconnected` on a failed handshake. Every `connect()`
/// starts a new generation; transport events tagged with an older generation
/// are stale and ignored. Reconnecting is always caller driven.
#[derive(Debug)]
pub struct ConnectionManager {
    url: String,
    status: ConnectionStatus,
    generation: u64,
    last_error: Option<String>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ConnectionStatus::Disconnected,
            generation: 0,
            last_error: None,
        }
    }

    /// Starts connecting unless already connecting or connected.
    pub fn connect(&mut self) -> Option<OpenRequest> {
        if self.status != ConnectionStatus::Disconnected {
            debug!(status = %self.status, "connect ignored");
            return None;
        }

        self.generation += 1;
        self.status = ConnectionStatus::Connecting;
        info!(url = %self.url, generation = self.generation, "connecting");

        Some(OpenRequest {
            generation: self.generation,
            url: self.url.clone(),
            protocol: SUB_PROTOCOL.to_string(),
        })
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Returns the new status when the transition changed anything.
    pub fn on_open(&mut self, generation: u64) -> Option<ConnectionStatus> {
        if !self.is_current(generation) || self.status != ConnectionStatus::Connecting {
            return None;
        }

        self.status = ConnectionStatus::Connected;
        self.last_error = None;
        info!(generation, "connected");
        Some(self.status)
    }

    pub fn on_error(&mut self, generation: u64, reason: &str) -> Option<ConnectionStatus> {
        if !self.is_current(generation) {
            return None;
        }

        warn!(generation, %reason, "transport error");
        self.last_error = Some(reason.to_string());
        self.disconnect()
    }

    pub fn on_close(&mut self, generation: u64) -> Option<ConnectionStatus> {
        if !self.is_current(generation) {
            return None;
        }

        info!(generation, "connection closed");
        self.disconnect()
    }

    fn disconnect(&mut self) -> Option<ConnectionStatus> {
        if self.status == ConnectionStatus::Disconnected {
            return None;
        }
        self.status = ConnectionStatus::Disconnected;
        Some(self.status)
    }

    /// Guards outbound traffic; nothing is queued across a disconnect.
    pub fn send(&self, message: ClientMessage) -> Result<ClientMessage> {
        match self.status {
            ConnectionStatus::Connected => Ok(message),
            status => Err(PanelError::NotConnected { status }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Handle, update_message};
    use serde_json::json;

    fn manager() -> ConnectionManager {
        ConnectionManager::new("ws://localhost:8080/socket")
    }

    #[test]
    fn connect_is_idempotent_until_disconnected() {
        let mut conn = manager();
        let open = conn.connect().expect("first connect opens");
        assert_eq!(open.generation, 1);
        assert_eq!(open.protocol, SUB_PROTOCOL);
        assert_eq!(conn.status(), ConnectionStatus::Connecting);

        assert!(conn.connect().is_none());
        conn.on_open(1);
        assert!(conn.connect().is_none());
    }

    #[test]
    fn full_lifecycle_with_manual_reconnect() {
        let mut conn = manager();
        conn.connect();
        assert_eq!(conn.on_open(1), Some(ConnectionStatus::Connected));
        assert_eq!(conn.on_close(1), Some(ConnectionStatus::Disconnected));
        assert!(conn.status().can_reconnect());

        let open = conn.connect().expect("reconnect");
        assert_eq!(open.generation, 2);
        assert_eq!(conn.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn handshake_failure_goes_straight_to_disconnected() {
        let mut conn = manager();
        conn.connect();
        assert_eq!(
            conn.on_error(1, "connection refused"),
            Some(ConnectionStatus::Disconnected)
        );
        assert_eq!(conn.last_error(), Some("connection refused"));
        assert_eq!(conn.on_close(1), None, "close after error changes nothing");
    }

    #[test]
    fn stale_generation_events_are_ignored() {
        let mut conn = manager();
        conn.connect();
        conn.on_error(1, "refused");
        conn.connect();

        assert_eq!(conn.on_close(1), None);
        assert_eq!(conn.on_open(1), None);
        assert_eq!(conn.status(), ConnectionStatus::Connecting);
        assert_eq!(conn.on_open(2), Some(ConnectionStatus::Connected));
    }

    #[test]
    fn send_requires_connected() {
        let mut conn = manager();
        let message = update_message(Handle::from("h1"), json!(1));
        assert!(matches!(
            conn.send(message.clone()),
            Err(PanelError::NotConnected {
                status: ConnectionStatus::Disconnected
            })
        ));

        conn.connect();
        assert!(conn.send(message.clone()).is_err());
        conn.on_open(1);
        assert!(conn.send(message).is_ok());
    }
}
