//! Metrics collection and export for skiff.
//!
//! Crates record through the `metrics` facade re-exported here. Without a
//! recorder installed every macro is a no-op. With the `prometheus` feature,
//! [`init_metrics`] installs an exporter whose output is served on `/metrics`.
//!
//! ```rust,ignore
//! use skiff_metrics::{counter, dispatch};
//!
//! counter!(dispatch::EVENTS_PARSED_TOTAL, "connector" => "shell").increment(1);
//! ```

mod definitions;
mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
