use thiserror::Error;

use crate::datatype::Datatype;
use crate::protocol::Handle;

pub type Result<T> = std::result::Result<T, PanelError>;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("no field registered for datatype {0}")]
    UnknownDatatype(Datatype),

    #[error("refresh for unknown handle {0}")]
    UnknownHandle(Handle),

    #[error("no handler for message type '{0}'")]
    UnknownMessageType(String),

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid entry: {message}")]
    InvalidEntry { message: String },

    #[error("cannot send while {status}")]
    NotConnected { status: crate::connection::ConnectionStatus },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("task failed: {step}: {reason}")]
    Bootstrap { step: String, reason: String },

    #[error("datatype of {handle} changed from {from} to {to}")]
    DatatypeChanged {
        handle: Handle,
        from: Datatype,
        to: Datatype,
    },

    #[error("field {handle}: {source}")]
    Field {
        handle: Handle,
        #[source]
        source: FieldError,
    },
}

impl PanelError {
    #[must_use]
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bootstrap(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Bootstrap {
            step: step.into(),
            reason: reason.into(),
        }
    }
}

/// Conversion failures between presentation text and wire values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("'{text}' is not a valid {datatype} value")]
    InvalidInput { datatype: Datatype, text: String },

    #[error("expected {datatype} value but got {found}")]
    TypeMismatch { datatype: Datatype, found: String },
}
