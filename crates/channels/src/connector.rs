use {async_trait::async_trait, futures::stream::BoxStream};

use crate::{Result, event::Event};

/// Inbound events produced by a connector, in channel order.
pub type EventStream = BoxStream<'static, Event>;

/// A bridge between one external platform and the runtime.
///
/// Connectors are shared (`Arc<dyn Connector>`) between the listen task, the
/// dispatch path and outbound sends, so every method takes `&self` and
/// implementations use interior mutability for connection state.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Configured instance name (e.g. "shell", "team-slack").
    fn name(&self) -> &str;

    /// Where outbound events without an explicit target are delivered.
    fn default_target(&self) -> Option<&str> {
        None
    }

    /// Establish the connection. Failures are reported to the runtime, which
    /// skips this connector.
    async fn connect(&self) -> Result<()>;

    /// Start receiving events.
    ///
    /// The stream is lazy and only ends on protocol termination; the runtime
    /// stops consuming it on shutdown. It cannot be restarted: calling
    /// `listen` a second time fails with [`crate::Error::Unavailable`].
    async fn listen(&self) -> Result<EventStream>;

    /// Deliver one outbound event.
    async fn send(&self, event: &Event) -> Result<()>;

    /// Release the connection. Must be safe to call when never connected.
    async fn disconnect(&self) -> Result<()>;
}
