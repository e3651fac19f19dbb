/// Failures while installing the metrics recorder.
///
/// Without the `prometheus` feature nothing can fail and the enum is empty.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[cfg(feature = "prometheus")]
    #[error(transparent)]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
