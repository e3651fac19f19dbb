//! The event model shared by connectors, the dispatch pipeline and skills.
//!
//! An [`Event`] never changes after it is built. Anything that needs to add
//! information (the runtime binding the producing connector, the dispatcher
//! attaching regex captures) gets a modified copy.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Weak},
};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::connector::Connector;

/// Kind-specific payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Message {
        text: String,
    },
    Reaction {
        emoji: String,
    },
    Media {
        media: MediaKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    RoomName {
        name: String,
    },
    RoomDescription {
        description: String,
    },
    JoinRoom,
    LeaveRoom,
    UserInvite {
        user_id: String,
    },
    /// Synthesised when a crontab matcher fires.
    Scheduled {
        expression: String,
    },
    /// Synthesised when a webhook matcher is called over HTTP.
    Webhook {
        name: String,
        payload: Value,
    },
}

impl EventKind {
    /// Short name used in logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Reaction { .. } => "reaction",
            Self::Media {
                media: MediaKind::File,
                ..
            } => "file",
            Self::Media {
                media: MediaKind::Image,
                ..
            } => "image",
            Self::Media {
                media: MediaKind::Video,
                ..
            } => "video",
            Self::RoomName { .. } => "room_name",
            Self::RoomDescription { .. } => "room_description",
            Self::JoinRoom => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::UserInvite { .. } => "user_invite",
            Self::Scheduled { .. } => "scheduled",
            Self::Webhook { .. } => "webhook",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    File,
    Image,
    Video,
}

/// Per-match annotations attached by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchData {
    /// Positional capture groups; index 0 is the whole match.
    pub groups: Vec<Option<String>>,
    /// Named capture groups that participated in the match.
    pub named: BTreeMap<String, String>,
    /// Extra data from non-regex matchers (webhook body, classifier output).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl MatchData {
    /// Capture group `idx`, if it participated.
    pub fn group(&self, idx: usize) -> Option<&str> {
        self.groups.get(idx).and_then(|g| g.as_deref())
    }

    /// Named capture group.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }
}

/// One unit of inbound or outbound communication.
#[derive(Clone)]
pub struct Event {
    id: String,
    kind: EventKind,
    user_id: Option<String>,
    user: Option<String>,
    target: Option<String>,
    linked_event: Option<Arc<Event>>,
    raw_event: Option<Value>,
    connector: Option<Weak<dyn Connector>>,
    connector_name: Option<String>,
    matched: Option<MatchData>,
    created_at: DateTime<Utc>,
}

impl Event {
    pub fn builder(kind: EventKind) -> EventBuilder {
        EventBuilder::new(kind)
    }

    pub fn message(text: impl Into<String>) -> EventBuilder {
        EventBuilder::new(EventKind::Message { text: text.into() })
    }

    pub fn reaction(emoji: impl Into<String>) -> EventBuilder {
        EventBuilder::new(EventKind::Reaction {
            emoji: emoji.into(),
        })
    }

    pub fn media(media: MediaKind, url: impl Into<String>) -> EventBuilder {
        EventBuilder::new(EventKind::Media {
            media,
            url: Some(url.into()),
            name: None,
            mime_type: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Message text, `None` for non-message events.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Message { text } => Some(text),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Display name of the originating user.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn linked_event(&self) -> Option<&Event> {
        self.linked_event.as_deref()
    }

    /// Platform record as received, kept for connectors that need it on
    /// the way back out.
    pub fn raw_event(&self) -> Option<&Value> {
        self.raw_event.as_ref()
    }

    pub fn connector_name(&self) -> Option<&str> {
        self.connector_name.as_deref()
    }

    /// The connector that produced this event, if it is still alive.
    pub fn connector(&self) -> Option<Arc<dyn Connector>> {
        self.connector.as_ref().and_then(Weak::upgrade)
    }

    pub fn matched(&self) -> Option<&MatchData> {
        self.matched.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Copy bound to `connector`, keeping every other field.
    pub fn with_connector(&self, connector: &Arc<dyn Connector>) -> Self {
        let mut copy = self.clone();
        copy.connector_name = Some(connector.name().to_string());
        copy.connector = Some(Arc::downgrade(connector));
        copy
    }

    /// Copy annotated with one matcher's result.
    pub fn with_match(&self, data: MatchData) -> Self {
        let mut copy = self.clone();
        copy.matched = Some(data);
        copy
    }

    /// Build a reply addressed to where this event came from.
    ///
    /// The reply goes to the same connector and target and links back to
    /// this event.
    pub fn respond(&self, kind: EventKind) -> Self {
        let mut reply = EventBuilder::new(kind);
        reply.user_id = self.user_id.clone();
        reply.user = self.user.clone();
        reply.target = self.target.clone();
        reply.connector = self.connector.clone();
        reply.connector_name = self.connector_name.clone();
        reply.linked_event = Some(Arc::new(self.clone()));
        reply.build()
    }

    /// Text reply, see [`Event::respond`].
    pub fn reply(&self, text: impl Into<String>) -> Self {
        self.respond(EventKind::Message { text: text.into() })
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("user_id", &self.user_id)
            .field("user", &self.user)
            .field("target", &self.target)
            .field("connector", &self.connector_name)
            .field("linked_event", &self.linked_event.as_ref().map(|e| e.id()))
            .field("matched", &self.matched)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Event`]. Connectors use it on ingress, skills on egress.
#[derive(Clone)]
pub struct EventBuilder {
    kind: EventKind,
    user_id: Option<String>,
    user: Option<String>,
    target: Option<String>,
    linked_event: Option<Arc<Event>>,
    raw_event: Option<Value>,
    connector: Option<Weak<dyn Connector>>,
    connector_name: Option<String>,
}

impl EventBuilder {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            user_id: None,
            user: None,
            target: None,
            linked_event: None,
            raw_event: None,
            connector: None,
            connector_name: None,
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn linked_event(mut self, event: Event) -> Self {
        self.linked_event = Some(Arc::new(event));
        self
    }

    pub fn raw_event(mut self, raw: Value) -> Self {
        self.raw_event = Some(raw);
        self
    }

    /// Name of the connector that should deliver or did produce the event.
    pub fn connector_name(mut self, name: impl Into<String>) -> Self {
        self.connector_name = Some(name.into());
        self
    }

    pub fn connector(mut self, connector: &Arc<dyn Connector>) -> Self {
        self.connector_name = Some(connector.name().to_string());
        self.connector = Some(Arc::downgrade(connector));
        self
    }

    pub fn build(self) -> Event {
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            kind: self.kind,
            user_id: self.user_id,
            user: self.user,
            target: self.target,
            linked_event: self.linked_event,
            raw_event: self.raw_event,
            connector: self.connector,
            connector_name: self.connector_name,
            matched: None,
            created_at: Utc::now(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::loopback::LoopbackConnector};

    #[test]
    fn message_accessors() {
        let event = Event::message("hello world")
            .user("Alice")
            .user_id("u-1")
            .target("#general")
            .raw_event(serde_json::json!({"ts": "1"}))
            .build();
        assert_eq!(event.text(), Some("hello world"));
        assert_eq!(event.user(), Some("Alice"));
        assert_eq!(event.user_id(), Some("u-1"));
        assert_eq!(event.target(), Some("#general"));
        assert_eq!(event.raw_event().unwrap()["ts"], "1");
        assert!(event.connector().is_none());
        assert_eq!(event.kind().label(), "message");
    }

    #[test]
    fn non_message_has_no_text() {
        let event = Event::reaction("👍").build();
        assert_eq!(event.text(), None);
        assert_eq!(event.kind().label(), "reaction");
    }

    #[test]
    fn with_match_leaves_original_untouched() {
        let original = Event::message("ping").build();
        let data = MatchData {
            groups: vec![Some("ping".into())],
            ..Default::default()
        };
        let annotated = original.with_match(data);
        assert!(original.matched().is_none());
        assert_eq!(annotated.matched().unwrap().group(0), Some("ping"));
        assert_eq!(annotated.id(), original.id());
    }

    #[test]
    fn respond_links_back_and_keeps_route() {
        let connector: Arc<dyn Connector> = Arc::new(LoopbackConnector::new("loop"));
        let inbound = Event::message("hi")
            .user("bob")
            .target("room-1")
            .build()
            .with_connector(&connector);

        let reply = inbound.reply("hello bob");
        assert_eq!(reply.text(), Some("hello bob"));
        assert_eq!(reply.target(), Some("room-1"));
        assert_eq!(reply.connector_name(), Some("loop"));
        assert_eq!(reply.linked_event().unwrap().id(), inbound.id());
        assert!(reply.connector().is_some());
        assert_ne!(reply.id(), inbound.id());
    }

    #[test]
    fn connector_reference_is_weak() {
        let connector: Arc<dyn Connector> = Arc::new(LoopbackConnector::new("loop"));
        let event = Event::message("hi").connector(&connector).build();
        assert!(event.connector().is_some());
        drop(connector);
        assert!(event.connector().is_none());
        assert_eq!(event.connector_name(), Some("loop"));
    }

    #[test]
    fn kind_serializes_tagged() {
        let kind = EventKind::Media {
            media: MediaKind::Image,
            url: Some("https://example.com/a.png".into()),
            name: None,
            mime_type: None,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "media");
        assert_eq!(json["media"], "image");
        assert!(json.get("name").is_none());
    }
}
