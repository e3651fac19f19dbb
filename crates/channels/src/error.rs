use std::error::Error as StdError;

/// Crate-wide result type for connector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed connector errors shared by every channel implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connector settings are missing a field or have the wrong type.
    #[error("invalid connector config: {message}")]
    InvalidConfig { message: String },

    /// No factory is registered for a configured connector type.
    #[error("unknown connector type: {kind}")]
    UnknownConnector { kind: String },

    /// Operation is currently unavailable (not connected, already listening).
    #[error("connector operation unavailable: {message}")]
    Unavailable { message: String },

    /// The connector has no way to deliver this kind of event.
    #[error("connector '{connector}' cannot send {kind} events")]
    UnsupportedEvent { connector: String, kind: String },

    /// Wrapped source error from the underlying transport.
    #[error("connector operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_config(message: impl std::fmt::Display) -> Self {
        Self::InvalidConfig {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_connector(kind: impl std::fmt::Display) -> Self {
        Self::UnknownConnector {
            kind: kind.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unsupported_event(connector: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::UnsupportedEvent {
            connector: connector.into(),
            kind: kind.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
