use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("storage backend '{backend}' is not connected")]
    NotConnected { backend: String },

    #[error("unknown storage backend type: {kind}")]
    UnknownBackend { kind: String },

    #[error("invalid storage config: {message}")]
    InvalidConfig { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn not_connected(backend: impl Into<String>) -> Self {
        Self::NotConnected {
            backend: backend.into(),
        }
    }

    #[must_use]
    pub fn unknown_backend(kind: impl Into<String>) -> Self {
        Self::UnknownBackend { kind: kind.into() }
    }

    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
