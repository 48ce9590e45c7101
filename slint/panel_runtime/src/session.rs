//! Single-threaded dispatch of transport and UI events.
//!
//! [`Session::dispatch`] consumes one [`SessionEvent`] to completion and
//! returns the [`Command`]s the driver must execute. No I/O happens here.

use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, ConnectionStatus, OpenRequest};
use crate::error::PanelError;
use crate::field::FieldRegistry;
use crate::protocol::{ClientMessage, Handle, Inbound, ServerMessage, decode_server_message};
use crate::store::{BatchOutcome, VariableStore};
use crate::variable::FieldView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Closed,
    Errored(String),
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Transport { generation: u64, event: TransportEvent },
    FieldCommitted { key: String, text: String },
    ReconnectRequested,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open(OpenRequest),
    Send(ClientMessage),
    Render(FieldView),
    ShowValue { handle: Handle, text: String },
    Status(ConnectionStatus),
}

/// Counters for everything the session contained instead of failing on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub hello_count: u64,
    pub refresh_count: u64,
    pub malformed_messages: u64,
    pub unrecognized_messages: u64,
    pub entry_issues: u64,
    pub updates_sent: u64,
    pub updates_rejected: u64,
}

/// Explicitly owned state of one client session.
#[derive(Debug)]
pub struct Session {
    registry: FieldRegistry,
    store: VariableStore,
    connection: ConnectionManager,
    stats: SessionStats,
}

impl Session {
    #[must_use]
    pub fn new(registry: FieldRegistry, url: impl Into<String>) -> Self {
        Self {
            registry,
            store: VariableStore::new(),
            connection: ConnectionManager::new(url),
            stats: SessionStats::default(),
        }
    }

    /// Starts a connection attempt; a no-op unless disconnected.
    pub fn connect(&mut self) -> Vec<Command> {
        match self.connection.connect() {
            Some(open) => vec![
                Command::Status(ConnectionStatus::Connecting),
                Command::Open(open),
            ],
            None => Vec::new(),
        }
    }

    pub fn dispatch(&mut self, event: SessionEvent) -> Vec<Command> {
        match event {
            SessionEvent::Transport { generation, event } => {
                self.on_transport(generation, event)
            }
            SessionEvent::FieldCommitted { key, text } => self.on_field_committed(&key, text),
            SessionEvent::ReconnectRequested => self.connect(),
            SessionEvent::Shutdown => Vec::new(),
        }
    }

    fn on_transport(&mut self, generation: u64, event: TransportEvent) -> Vec<Command> {
        match event {
            TransportEvent::Opened => status_command(self.connection.on_open(generation)),
            TransportEvent::Errored(reason) => {
                status_command(self.connection.on_error(generation, &reason))
            }
            TransportEvent::Closed => status_command(self.connection.on_close(generation)),
            TransportEvent::Message(payload) => {
                if !self.connection.is_current(generation) {
                    debug!(generation, "message from stale connection dropped");
                    return Vec::new();
                }
                self.on_message(&payload)
            }
        }
    }

    fn on_message(&mut self, payload: &str) -> Vec<Command> {
        let inbound = match decode_server_message(payload) {
            Ok(inbound) => inbound,
            Err(err) => {
                self.stats.malformed_messages += 1;
                warn!(%err, "dropping malformed message");
                return Vec::new();
            }
        };

        let outcome = match inbound {
            Inbound::Server(ServerMessage::Hello { vars }) => {
                self.stats.hello_count += 1;
                debug!(entries = vars.len(), "hello");
                let outcome = self.store.apply_hello(vars, &self.registry);
                if self.stats.hello_count == 1 {
                    info!(variables = self.store.len(), "initial hello applied");
                }
                outcome
            }
            Inbound::Server(ServerMessage::Refresh { vars }) => {
                self.stats.refresh_count += 1;
                debug!(entries = vars.len(), "refresh");
                self.store.apply_refresh(vars)
            }
            Inbound::Unrecognized(kind) => {
                self.stats.unrecognized_messages += 1;
                warn!("{}, ignored", PanelError::UnknownMessageType(kind));
                return Vec::new();
            }
        };

        self.finish_batch(outcome)
    }

    fn finish_batch(&mut self, outcome: BatchOutcome) -> Vec<Command> {
        for issue in &outcome.issues {
            self.stats.entry_issues += 1;
            warn!(%issue, "entry dropped");
        }
        outcome.commands
    }

    fn on_field_committed(&mut self, key: &str, text: String) -> Vec<Command> {
        let message = match self.store.commit_edit(key, text) {
            Ok(message) => message,
            Err((issue, restore)) => {
                self.stats.updates_rejected += 1;
                warn!(%issue, "edit rejected");
                return restore.into_iter().collect();
            }
        };

        match self.connection.send(message) {
            Ok(message) => {
                self.stats.updates_sent += 1;
                vec![Command::Send(message)]
            }
            Err(issue) => {
                self.stats.updates_rejected += 1;
                warn!(%issue, key, "update dropped");
                Vec::new()
            }
        }
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn registry_mut(&mut self) -> &mut FieldRegistry {
        &mut self.registry
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Whether a `hello` has been applied since the session started.
    pub fn has_hello(&self) -> bool {
        self.stats.hello_count > 0
    }
}

fn status_command(status: Option<ConnectionStatus>) -> Vec<Command> {
    status.map(Command::Status).into_iter().collect()
}
