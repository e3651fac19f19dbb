//! The runtime orchestrator.
//!
//! A [`Runtime`] owns the connectors, the storage backends behind its
//! [`Memory`] and the registered skills. [`Runtime::start`] builds them from
//! a [`SkiffConfig`]; a component that fails to build or connect is logged
//! and skipped while the rest keep going. [`Runtime::stop`] tears everything
//! down in a fixed order:
//!
//! 1. listen loops, crontabs and the web API are cancelled and awaited
//! 2. in-flight skills get the grace period, then are abandoned
//! 3. connectors disconnect
//! 4. storage backends disconnect
//! 5. the skill registry is cleared
//!
//! Backends go last so skills finishing during the grace period can still
//! persist.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{StreamExt, future::join_all},
    skiff_channels::{Connector, ConnectorRegistry, Event, EventKind},
    skiff_config::{SkiffConfig, load_config},
    skiff_memory::{BackendRegistry, Memory},
    skiff_metrics::MetricsHandle,
    skiff_skills::{CrontabMatcher, Skill, SkillCatalog, SkillHost, SkillRegistry},
    tokio::sync::Notify,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use skiff_metrics::{connectors as conn_metrics, counter, gauge, labels, runtime as rt_metrics};

use crate::{
    Error, Result,
    dispatch::{self, DispatchContext},
    instance, schedule,
    stats::Stats,
    web,
};

/// Registries and wiring a runtime builds its components from.
pub struct RuntimeOptions {
    pub connectors: ConnectorRegistry,
    pub backends: BackendRegistry,
    pub skills: SkillCatalog,
    /// File re-read on reload.
    pub config_path: Option<PathBuf>,
    /// Rendered on `GET /metrics`.
    pub metrics: MetricsHandle,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            connectors: ConnectorRegistry::with_builtins(),
            backends: BackendRegistry::with_builtins(),
            skills: SkillCatalog::with_builtins(),
            config_path: None,
            metrics: MetricsHandle::disabled(),
        }
    }
}

impl RuntimeOptions {
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_connectors(mut self, connectors: ConnectorRegistry) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_skills(mut self, skills: SkillCatalog) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Everything that only exists between `start` and `stop`.
struct Running {
    shutdown: CancellationToken,
    background: TaskTracker,
    dispatch: DispatchContext,
    grace: Duration,
}

pub struct Runtime {
    id: u64,
    options: RuntimeOptions,
    config_path: Mutex<Option<PathBuf>>,
    last_config: Mutex<Option<SkiffConfig>>,
    memory: Memory,
    skills: RwLock<SkillRegistry>,
    connectors: RwLock<Vec<Arc<dyn Connector>>>,
    stats: Stats,
    /// Serializes start, stop and reload.
    lifecycle: tokio::sync::Mutex<Option<Running>>,
    /// Readable without the lifecycle lock, for the web API.
    dispatch: Mutex<Option<DispatchContext>>,
    web_addr: Mutex<Option<SocketAddr>>,
    reload_requested: Notify,
    stop_requested: Notify,
}

impl Runtime {
    /// Create a runtime and register it as a live instance.
    pub fn new(options: RuntimeOptions) -> Arc<Self> {
        let id = instance::next_id();
        let config_path = options.config_path.clone();
        let runtime = Arc::new(Self {
            id,
            options,
            config_path: Mutex::new(config_path),
            last_config: Mutex::new(None),
            memory: Memory::new(),
            skills: RwLock::new(SkillRegistry::new()),
            connectors: RwLock::new(Vec::new()),
            stats: Stats::default(),
            lifecycle: tokio::sync::Mutex::new(None),
            dispatch: Mutex::new(None),
            web_addr: Mutex::new(None),
            reload_requested: Notify::new(),
            stop_requested: Notify::new(),
        });
        instance::register(id, Arc::downgrade(&runtime));
        runtime
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub(crate) fn metrics(&self) -> &MetricsHandle {
        &self.options.metrics
    }

    pub fn is_running(&self) -> bool {
        self.dispatch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Address the web API is bound to, when it is running.
    pub fn web_addr(&self) -> Option<SocketAddr> {
        *self.web_addr.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_path
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_config_path(&self, path: impl AsRef<Path>) {
        *self.config_path.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(path.as_ref().to_path_buf());
    }

    pub fn connectors(&self) -> Vec<Arc<dyn Connector>> {
        self.connectors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn connector(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// The first connector that started.
    pub fn default_connector(&self) -> Option<Arc<dyn Connector>> {
        self.connectors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .first()
            .cloned()
    }

    pub fn skill_count(&self) -> usize {
        self.skills.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub(crate) fn skills_snapshot(&self) -> Vec<Arc<Skill>> {
        self.skills
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    pub(crate) fn find_webhook(&self, skill: &str, webhook: &str) -> Option<Arc<Skill>> {
        self.skills
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .find_webhook(skill, webhook)
            .cloned()
    }

    pub(crate) fn crontabs(&self) -> Vec<(Arc<Skill>, CrontabMatcher)> {
        self.skills
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .crontabs()
    }

    pub(crate) fn dispatch_context(&self) -> Option<DispatchContext> {
        self.dispatch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Event for a trigger with no inbound message (crontab, webhook),
    /// addressed to the default connector and its default target.
    pub fn trigger_event(&self, kind: EventKind) -> Event {
        let mut builder = Event::builder(kind);
        if let Some(connector) = self.default_connector() {
            if let Some(target) = connector.default_target() {
                builder = builder.target(target);
            }
            builder = builder.connector(&connector);
        }
        builder.build()
    }

    /// Ask a running [`run`](Self::run) loop to reload.
    pub fn request_reload(&self) {
        self.reload_requested.notify_one();
    }

    /// Ask a running [`run`](Self::run) loop to stop and return.
    pub fn request_stop(&self) {
        self.stop_requested.notify_one();
    }

    pub(crate) fn reload_notify(&self) -> &Notify {
        &self.reload_requested
    }

    pub(crate) fn stop_notify(&self) -> &Notify {
        &self.stop_requested
    }

    /// Build and connect everything `config` names, then start listening.
    pub async fn start(self: &Arc<Self>, config: SkiffConfig) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(Error::AlreadyRunning);
        }
        info!(
            connectors = config.connectors.len(),
            databases = config.databases.len(),
            skills = config.skills.len(),
            "starting runtime"
        );

        self.start_backends(&config).await;
        self.load_skills(&config);
        let connectors = self.start_connectors(&config).await;

        let shutdown = CancellationToken::new();
        let background = TaskTracker::new();
        let dispatch = DispatchContext::new(config.dispatch.clone());
        *self.dispatch.lock().unwrap_or_else(|e| e.into_inner()) = Some(dispatch.clone());

        for connector in connectors {
            background.spawn(listen(
                Arc::clone(self),
                connector,
                shutdown.clone(),
                dispatch.clone(),
            ));
        }
        schedule::spawn_crontabs(self, &background, &shutdown, &dispatch);

        if config.web.enabled {
            match web::serve(Arc::clone(self), &config.web, &background, shutdown.clone()).await {
                Ok(addr) => {
                    *self.web_addr.lock().unwrap_or_else(|e| e.into_inner()) = Some(addr);
                },
                Err(e) => error!(error = %e, "web API not started"),
            }
        }

        *lifecycle = Some(Running {
            shutdown,
            background,
            dispatch,
            grace: Duration::from_secs(config.runtime.grace_period_secs),
        });
        *self.last_config.lock().unwrap_or_else(|e| e.into_inner()) = Some(config);
        info!(
            connectors = self.connectors.read().unwrap_or_else(|e| e.into_inner()).len(),
            databases = self.memory.backend_count(),
            skills = self.skill_count(),
            "runtime started"
        );
        Ok(())
    }

    /// Stop everything `start` started. Stopping a stopped runtime does
    /// nothing.
    ///
    /// Skills must not await this themselves; they call
    /// [`request_stop`](Self::request_stop) instead.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            debug!("runtime already stopped");
            return;
        };
        info!("stopping runtime");
        *self.dispatch.lock().unwrap_or_else(|e| e.into_inner()) = None;

        running.shutdown.cancel();
        running.background.close();
        running.background.wait().await;
        *self.web_addr.lock().unwrap_or_else(|e| e.into_inner()) = None;

        let handlers = &running.dispatch.handlers;
        handlers.close();
        if tokio::time::timeout(running.grace, handlers.wait())
            .await
            .is_err()
        {
            warn!(
                pending = handlers.len(),
                grace_secs = running.grace.as_secs(),
                "abandoning skills still running after the grace period"
            );
            #[cfg(feature = "metrics")]
            counter!(rt_metrics::ABANDONED_TASKS_TOTAL).increment(handlers.len() as u64);
            running.dispatch.abandon.cancel();
            handlers.wait().await;
        }

        let connectors =
            std::mem::take(&mut *self.connectors.write().unwrap_or_else(|e| e.into_inner()));
        for connector in connectors {
            match connector.disconnect().await {
                Ok(()) => debug!(connector = %connector.name(), "connector disconnected"),
                Err(e) => {
                    warn!(connector = %connector.name(), error = %e, "connector failed to disconnect")
                },
            }
        }
        #[cfg(feature = "metrics")]
        gauge!(conn_metrics::ACTIVE).set(0.0);

        for backend in self.memory.take_backends() {
            match backend.disconnect().await {
                Ok(()) => debug!(database = %backend.name(), "storage backend disconnected"),
                Err(e) => {
                    warn!(database = %backend.name(), error = %e, "storage backend failed to disconnect")
                },
            }
        }

        self.skills
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        info!("runtime stopped");
    }

    /// Stop, then start again from the config file, or from the last
    /// configuration when there is no file or it no longer loads.
    pub async fn reload(self: &Arc<Self>) -> Result<()> {
        let config = self.reload_config()?;
        info!("reloading runtime");
        #[cfg(feature = "metrics")]
        counter!(rt_metrics::RELOADS_TOTAL).increment(1);
        self.stop().await;
        self.start(config).await
    }

    fn reload_config(&self) -> Result<SkiffConfig> {
        let last = self
            .last_config
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(path) = self.config_path() {
            match load_config(&path) {
                Ok(config) => return Ok(config),
                Err(e) if last.is_some() => warn!(
                    path = %path.display(),
                    error = %e,
                    "config reload failed, keeping the previous configuration"
                ),
                Err(e) => return Err(e.into()),
            }
        }
        last.ok_or(Error::NoConfig)
    }

    /// Start, then serve until a stop signal or [`request_stop`]. Whatever
    /// happens, the runtime is stopped before this returns.
    ///
    /// [`request_stop`]: Self::request_stop
    pub async fn run(self: &Arc<Self>, config: SkiffConfig) -> Result<()> {
        let result = self.serve(config).await;
        if let Err(e) = &result {
            error!(error = %e, "runtime loop failed");
        }
        self.stop().await;
        result
    }

    async fn serve(self: &Arc<Self>, config: SkiffConfig) -> Result<()> {
        self.start(config).await?;
        loop {
            match crate::signals::next_request(self).await {
                crate::signals::Request::Reload => self.reload().await?,
                crate::signals::Request::Stop => return Ok(()),
            }
        }
    }

    async fn start_backends(&self, config: &SkiffConfig) {
        let mut built = Vec::new();
        for module in config.databases.iter().filter(|m| m.enabled) {
            match self
                .options
                .backends
                .build(module.kind(), &module.settings_value())
            {
                Ok(backend) => built.push((module.name.as_str(), backend)),
                Err(e) => error!(database = %module.name, error = %e, "skipping storage backend"),
            }
        }

        let results = join_all(built.iter().map(|(_, backend)| backend.connect())).await;
        for ((name, backend), result) in built.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    info!(database = name, "storage backend connected");
                    self.memory.add_backend(backend);
                },
                Err(e) => error!(database = name, error = %e, "storage backend failed to connect, skipping"),
            }
        }
    }

    fn load_skills(&self, config: &SkiffConfig) {
        let mut registry = SkillRegistry::new();
        for module in config.skills.iter().filter(|m| m.enabled) {
            match self
                .options
                .skills
                .build(module.kind(), &module.settings_value())
            {
                Ok(skills) => {
                    for skill in skills {
                        debug!(module = %module.name, skill = %skill.name(), "skill registered");
                        registry.register(skill);
                    }
                },
                Err(e) => error!(skill = %module.name, error = %e, "skipping skill module"),
            }
        }
        *self.skills.write().unwrap_or_else(|e| e.into_inner()) = registry;
    }

    async fn start_connectors(&self, config: &SkiffConfig) -> Vec<Arc<dyn Connector>> {
        let mut built = Vec::new();
        for module in config.connectors.iter().filter(|m| m.enabled) {
            match self
                .options
                .connectors
                .build(module.kind(), &module.settings_value())
            {
                Ok(connector) => built.push(connector),
                Err(e) => {
                    error!(connector = %module.name, error = %e, "skipping connector");
                    #[cfg(feature = "metrics")]
                    counter!(conn_metrics::FAILED_TOTAL, labels::CONNECTOR => module.name.clone())
                        .increment(1);
                },
            }
        }

        let results = join_all(built.iter().map(|connector| connector.connect())).await;
        let mut started = Vec::new();
        for (connector, result) in built.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    info!(connector = %connector.name(), "connector connected");
                    started.push(connector);
                },
                Err(e) => {
                    error!(connector = %connector.name(), error = %e, "connector failed to connect, skipping");
                    #[cfg(feature = "metrics")]
                    counter!(conn_metrics::FAILED_TOTAL, labels::CONNECTOR => connector.name().to_string())
                        .increment(1);
                },
            }
        }
        #[cfg(feature = "metrics")]
        gauge!(conn_metrics::ACTIVE).set(started.len() as f64);
        *self.connectors.write().unwrap_or_else(|e| e.into_inner()) = started.clone();
        started
    }

    fn route(&self, event: &Event) -> Option<Arc<dyn Connector>> {
        event
            .connector()
            .or_else(|| event.connector_name().and_then(|name| self.connector(name)))
            .or_else(|| self.default_connector())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        instance::deregister(self.id);
    }
}

#[async_trait]
impl SkillHost for Runtime {
    fn memory(&self) -> &Memory {
        &self.memory
    }

    async fn send(&self, event: Event) -> skiff_channels::Result<()> {
        let connector = self.route(&event).ok_or_else(|| {
            skiff_channels::Error::unavailable("no connector available to send through")
        })?;
        connector.send(&event).await?;
        #[cfg(feature = "metrics")]
        counter!(conn_metrics::EVENTS_SENT_TOTAL, labels::CONNECTOR => connector.name().to_string())
            .increment(1);
        Ok(())
    }
}

/// One connector's listen loop: events are ranked and dispatched in the
/// order the connector produced them.
async fn listen(
    runtime: Arc<Runtime>,
    connector: Arc<dyn Connector>,
    shutdown: CancellationToken,
    ctx: DispatchContext,
) {
    let name = connector.name().to_string();
    let mut events = match connector.listen().await {
        Ok(events) => events,
        Err(e) => {
            error!(connector = %name, error = %e, "connector failed to listen");
            return;
        },
    };
    debug!(connector = %name, "listening");

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = events.next() => next,
        };
        let Some(event) = next else {
            info!(connector = %name, "connector stream ended");
            break;
        };
        dispatch::dispatch(&runtime, event.with_connector(&connector), &ctx).await;
    }
    debug!(connector = %name, "listen loop stopped");
}
