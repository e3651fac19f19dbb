//! Channel connectors and the event model they exchange with the runtime.
//!
//! Each channel (shell, chat platforms, SMS gateways, ...) implements
//! [`Connector`]: connect, a lazy stream of inbound [`Event`]s, send, and
//! disconnect. The runtime owns connectors; events only hold a weak
//! back-reference to the connector that produced them.

pub mod connector;
pub mod error;
pub mod event;
pub mod loopback;
pub mod registry;
pub mod shell;

pub use {
    connector::{Connector, EventStream},
    error::{Error, Result},
    event::{Event, EventBuilder, EventKind, MatchData, MediaKind},
    loopback::{LoopbackConnector, LoopbackHandle},
    registry::{ConnectorFactory, ConnectorRegistry},
    shell::ShellConnector,
};
