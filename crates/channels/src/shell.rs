//! Terminal connector: each stdin line is a message, replies go to stdout.

use std::sync::atomic::{AtomicBool, Ordering};

use {
    async_trait::async_trait,
    futures::{StreamExt, stream},
    serde::Deserialize,
    serde_json::Value,
    tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    connector::{Connector, EventStream},
    event::Event,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub name: String,
    /// Prefix printed in front of replies.
    pub bot_name: String,
    /// Display name attached to every inbound line.
    pub user: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            name: "shell".into(),
            bot_name: "skiff".into(),
            user: std::env::var("USER").unwrap_or_else(|_| "user".into()),
        }
    }
}

pub struct ShellConnector {
    config: ShellConfig,
    listening: AtomicBool,
}

impl ShellConnector {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config,
            listening: AtomicBool::new(false),
        }
    }

    /// Build from module settings.
    pub fn from_settings(settings: &Value) -> Result<Self> {
        let config: ShellConfig = serde_json::from_value(settings.clone())
            .map_err(|e| Error::invalid_config(format!("shell: {e}")))?;
        Ok(Self::new(config))
    }
}

#[async_trait]
impl Connector for ShellConnector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn default_target(&self) -> Option<&str> {
        Some("stdout")
    }

    async fn connect(&self) -> Result<()> {
        debug!(connector = %self.config.name, "shell connector ready");
        Ok(())
    }

    async fn listen(&self) -> Result<EventStream> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(Error::unavailable("shell connector already listening"));
        }
        let lines = BufReader::new(tokio::io::stdin()).lines();
        let name = self.config.name.clone();
        let user = self.config.user.clone();

        let events = stream::unfold(lines, move |mut lines| {
            let name = name.clone();
            let user = user.clone();
            async move {
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) if line.trim().is_empty() => continue,
                        Ok(Some(line)) => {
                            let event = Event::message(line)
                                .user(&user)
                                .user_id(&user)
                                .target("stdout")
                                .connector_name(&name)
                                .build();
                            return Some((event, lines));
                        },
                        Ok(None) => {
                            debug!(connector = %name, "stdin closed");
                            return None;
                        },
                        Err(e) => {
                            warn!(connector = %name, error = %e, "failed to read stdin");
                            return None;
                        },
                    }
                }
            }
        });
        Ok(events.boxed())
    }

    async fn send(&self, event: &Event) -> Result<()> {
        let Some(text) = event.text() else {
            return Err(Error::unsupported_event(
                &self.config.name,
                event.kind().label(),
            ));
        };
        let line = format!("{}: {text}\n", self.config.bot_name);
        let mut stdout = tokio::io::stdout();
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_fill_defaults() {
        let shell =
            ShellConnector::from_settings(&serde_json::json!({"name": "term", "bot_name": "bot"}))
                .unwrap();
        assert_eq!(shell.name(), "term");
        assert_eq!(shell.config.bot_name, "bot");
        assert!(!shell.config.user.is_empty());
    }

    #[test]
    fn bad_settings_are_config_errors() {
        let err = ShellConnector::from_settings(&serde_json::json!({"bot_name": 3})).err();
        assert!(matches!(err, Some(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn refuses_non_text_events() {
        let shell = ShellConnector::new(ShellConfig::default());
        let err = shell
            .send(&Event::reaction("+1").build())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedEvent { .. }));
    }
}
