//! Skill records and the registration builder.

use std::{fmt, future::Future, sync::Arc};

use {
    async_trait::async_trait,
    futures::future::BoxFuture,
    serde_json::Value,
    skiff_channels::Event,
    skiff_memory::Memory,
};

use crate::matcher::{Matcher, RegexMatcher};

/// What a running skill can reach: shared memory and outbound delivery.
///
/// Implemented by the runtime and handed to every invocation.
#[async_trait]
pub trait SkillHost: Send + Sync {
    fn memory(&self) -> &Memory;

    /// Deliver `event` through its connector. Events without a live
    /// connector go to the connector named on the event, or the default one.
    async fn send(&self, event: Event) -> skiff_channels::Result<()>;
}

pub type SkillFuture = BoxFuture<'static, anyhow::Result<()>>;

pub type SkillFn = Arc<dyn Fn(Arc<dyn SkillHost>, Arc<Value>, Event) -> SkillFuture + Send + Sync>;

/// A handler plus the matchers that select it.
#[derive(Clone)]
pub struct Skill {
    name: String,
    config: Arc<Value>,
    matchers: Vec<Matcher>,
    handler: SkillFn,
}

impl Skill {
    pub fn builder(name: impl Into<String>) -> SkillBuilder {
        SkillBuilder {
            name: name.into(),
            config: Value::Null,
            matchers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Arc<Value> {
        &self.config
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Start the handler. The returned future does not borrow the skill.
    pub fn invoke(&self, host: Arc<dyn SkillHost>, event: Event) -> SkillFuture {
        (self.handler)(host, Arc::clone(&self.config), event)
    }

    /// Copy of this skill carrying `config`.
    pub fn with_config(&self, config: Value) -> Self {
        let mut copy = self.clone();
        copy.config = Arc::new(config);
        copy
    }
}

impl fmt::Debug for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Skill")
            .field("name", &self.name)
            .field("matchers", &self.matchers)
            .finish_non_exhaustive()
    }
}

pub struct SkillBuilder {
    name: String,
    config: Value,
    matchers: Vec<Matcher>,
}

impl SkillBuilder {
    pub fn matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Finish the record with its handler.
    pub fn handler<F, Fut>(self, handler: F) -> Skill
    where
        F: Fn(Arc<dyn SkillHost>, Arc<Value>, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Skill {
            name: self.name,
            config: Arc::new(self.config),
            matchers: self.matchers,
            handler: Arc::new(move |host, config, event| Box::pin(handler(host, config, event))),
        }
    }
}

/// Shortcut for a skill with a single regex matcher.
pub fn match_regex<F, Fut>(name: impl Into<String>, matcher: RegexMatcher, handler: F) -> Skill
where
    F: Fn(Arc<dyn SkillHost>, Arc<Value>, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Skill::builder(name)
        .matcher(Matcher::Regex(matcher))
        .handler(handler)
}
