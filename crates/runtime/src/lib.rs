//! The skiff runtime: lifecycle, dispatch and the HTTP API.
//!
//! ```rust,ignore
//! let runtime = Runtime::new(RuntimeOptions::default().with_config_path(&path));
//! runtime.run(config).await?;
//! ```

pub mod dispatch;
pub mod error;
pub mod instance;
pub mod runtime;
pub mod schedule;
pub mod signals;
pub mod stats;
pub mod web;

pub use {
    dispatch::{Candidate, FAILURE_NOTICE, rank, select},
    error::{Error, Result},
    runtime::{Runtime, RuntimeOptions},
    signals::Request,
    stats::{Stats, StatsSnapshot},
    web::router,
};
