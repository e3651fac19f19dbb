use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("runtime is already running")]
    AlreadyRunning,

    #[error("no configuration to reload: the runtime was never started")]
    NoConfig,

    #[error(transparent)]
    Config(#[from] skiff_config::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to bind web API on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    #[must_use]
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
