//! In-process connector: events are injected through a [`LoopbackHandle`]
//! and outbound events are recorded instead of delivered.
//!
//! Used by integration tests and by embedders that feed events from code.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::StreamExt,
    tokio::sync::{Notify, mpsc},
    tokio_stream::wrappers::UnboundedReceiverStream,
    tracing::debug,
};

use crate::{
    Error, Result,
    connector::{Connector, EventStream},
    event::Event,
};

pub struct LoopbackConnector {
    name: String,
    inbound_tx: mpsc::UnboundedSender<Event>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    sent: Mutex<Vec<Event>>,
    sent_notify: Notify,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Cloneable sender side of a [`LoopbackConnector`].
#[derive(Clone)]
pub struct LoopbackHandle {
    name: String,
    tx: mpsc::UnboundedSender<Event>,
}

impl LoopbackHandle {
    /// Queue an event as if it arrived from the channel.
    pub fn inject(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| Error::unavailable(format!("loopback '{}' was dropped", self.name)))
    }

    /// Queue a text message from `user`.
    pub fn say(&self, user: &str, text: &str) -> Result<()> {
        self.inject(
            Event::message(text)
                .user(user)
                .user_id(user)
                .target(user)
                .connector_name(&self.name)
                .build(),
        )
    }
}

impl LoopbackConnector {
    pub fn new(name: impl Into<String>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            sent: Mutex::new(Vec::new()),
            sent_notify: Notify::new(),
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Make the next `connect` calls fail, for exercising partial startup.
    pub fn failing_connect(self) -> Self {
        self.fail_connect.store(true, Ordering::SeqCst);
        self
    }

    pub fn handle(&self) -> LoopbackHandle {
        LoopbackHandle {
            name: self.name.clone(),
            tx: self.inbound_tx.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Everything sent through this connector so far.
    pub fn sent(&self) -> Vec<Event> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Texts of every sent message event.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|e| e.text().map(str::to_string))
            .collect()
    }

    /// Wait until at least `count` events were sent, or `timeout` passes.
    /// Returns what was sent either way.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<Event> {
        let wait = async {
            loop {
                let notified = self.sent_notify.notified();
                if self.sent.lock().unwrap_or_else(|e| e.into_inner()).len() >= count {
                    return;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout(timeout, wait).await;
        self.sent()
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::unavailable(format!(
                "loopback '{}' refused to connect",
                self.name
            )));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn listen(&self) -> Result<EventStream> {
        let rx = self
            .inbound_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| Error::unavailable(format!("loopback '{}' already listening", self.name)))?;
        debug!(connector = %self.name, "loopback listening");
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn send(&self, event: &Event) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        self.sent_notify.notify_waiters();
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_events_come_out_in_order() {
        let connector = LoopbackConnector::new("loop");
        let handle = connector.handle();
        let mut stream = connector.listen().await.unwrap();

        handle.say("alice", "one").unwrap();
        handle.say("alice", "two").unwrap();

        assert_eq!(stream.next().await.unwrap().text(), Some("one"));
        assert_eq!(stream.next().await.unwrap().text(), Some("two"));
    }

    #[tokio::test]
    async fn listen_is_not_restartable() {
        let connector = LoopbackConnector::new("loop");
        let _stream = connector.listen().await.unwrap();
        assert!(matches!(
            connector.listen().await,
            Err(Error::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn records_sent_events() {
        let connector = LoopbackConnector::new("loop");
        connector
            .send(&Event::message("pong").build())
            .await
            .unwrap();
        let sent = connector.wait_for_sent(1, Duration::from_millis(50)).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(connector.sent_texts(), ["pong"]);
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_fine() {
        let connector = LoopbackConnector::new("loop");
        connector.disconnect().await.unwrap();
        assert!(!connector.is_connected());
        assert_eq!(connector.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn failing_connect() {
        let connector = LoopbackConnector::new("loop").failing_connect();
        assert!(connector.connect().await.is_err());
        assert!(!connector.is_connected());
        assert_eq!(connector.connect_count(), 1);
    }
}
