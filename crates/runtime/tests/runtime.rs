#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end runtime behaviour, driven through loopback connectors.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    axum::{
        body::Body,
        http::{Request, StatusCode},
    },
    serde_json::json,
    skiff_channels::{Connector, ConnectorRegistry, Event, EventStream, LoopbackConnector},
    skiff_config::{DispatchPolicy, ModuleConfig, SkiffConfig, load_config},
    skiff_runtime::{Error, FAILURE_NOTICE, Runtime, RuntimeOptions, router},
    skiff_skills::{Matcher, RegexSpec, Skill, SkillCatalog},
    tower::ServiceExt,
};

const WAIT: Duration = Duration::from_secs(3);

type Created = Arc<Mutex<Vec<Arc<LoopbackConnector>>>>;

/// Receives like a loopback connector but never finishes a send.
struct StalledSend(Arc<LoopbackConnector>);

#[async_trait]
impl Connector for StalledSend {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn connect(&self) -> skiff_channels::Result<()> {
        self.0.connect().await
    }

    async fn listen(&self) -> skiff_channels::Result<EventStream> {
        self.0.listen().await
    }

    async fn send(&self, _event: &Event) -> skiff_channels::Result<()> {
        futures::future::pending().await
    }

    async fn disconnect(&self) -> skiff_channels::Result<()> {
        self.0.disconnect().await
    }
}

/// `loopback` builds a fresh connector per start and records it;
/// `stalled` records its inner loopback; `broken` always fails to connect.
fn connectors(created: &Created) -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    let created = Arc::clone(created);
    let stalled = Arc::clone(&created);
    registry.register("loopback", move |settings| {
        let name = settings["name"].as_str().unwrap_or("loopback");
        let connector = Arc::new(LoopbackConnector::new(name));
        created.lock().unwrap().push(Arc::clone(&connector));
        Ok(connector as Arc<dyn Connector>)
    });
    registry.register("stalled", move |settings| {
        let name = settings["name"].as_str().unwrap_or("stalled");
        let inner = Arc::new(LoopbackConnector::new(name));
        stalled.lock().unwrap().push(Arc::clone(&inner));
        Ok(Arc::new(StalledSend(inner)) as Arc<dyn Connector>)
    });
    registry.register("broken", |settings| {
        let name = settings["name"].as_str().unwrap_or("broken");
        Ok(Arc::new(LoopbackConnector::new(name).failing_connect()) as Arc<dyn Connector>)
    });
    registry
}

fn fails_on(name: &str, spec: RegexSpec) -> Skill {
    Skill::builder(name)
        .matcher(Matcher::regex(spec).unwrap())
        .handler(|_, _, _| async { Err::<(), _>(anyhow::anyhow!("database on fire")) })
}

fn replies_with_name(name: &str, spec: RegexSpec) -> Skill {
    let reply = name.to_string();
    Skill::builder(name)
        .matcher(Matcher::regex(spec).unwrap())
        .handler(move |host, _, event| {
            let reply = reply.clone();
            async move {
                host.send(event.reply(reply)).await?;
                Ok(())
            }
        })
}

fn loopback_config(skills: &[&str]) -> SkiffConfig {
    SkiffConfig {
        connectors: vec![ModuleConfig::new("chat").with_kind("loopback")],
        skills: skills.iter().map(|s| ModuleConfig::new(*s)).collect(),
        ..Default::default()
    }
}

fn loopback(created: &Created, idx: usize) -> Arc<LoopbackConnector> {
    Arc::clone(&created.lock().unwrap()[idx])
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn only_the_best_skill_answers() {
    let created = Created::default();
    let mut catalog = SkillCatalog::new();
    catalog.register_skills(
        "low",
        vec![replies_with_name("low", RegexSpec::new(".*").score_factor(0.6))],
    );
    catalog.register_skills(
        "high",
        vec![replies_with_name("high", RegexSpec::new(".*").score_factor(1.0))],
    );
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_skills(catalog),
    );
    runtime.start(loopback_config(&["low", "high"])).await.unwrap();

    let chat = loopback(&created, 0);
    chat.handle().say("ada", "ping").unwrap();
    chat.wait_for_sent(1, WAIT).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(chat.sent_texts(), ["high"]);

    let reply = &chat.sent()[0];
    assert_eq!(reply.target(), Some("ada"));
    assert_eq!(reply.linked_event().and_then(|e| e.text()), Some("ping"));
    assert_eq!(runtime.stats().snapshot().messages_parsed, 1);

    runtime.stop().await;
}

#[tokio::test]
async fn all_policy_runs_every_candidate() {
    let created = Created::default();
    let mut catalog = SkillCatalog::new();
    catalog.register_skills(
        "low",
        vec![replies_with_name("low", RegexSpec::new(".*").score_factor(0.6))],
    );
    catalog.register_skills(
        "high",
        vec![replies_with_name("high", RegexSpec::new(".*").score_factor(1.0))],
    );
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_skills(catalog),
    );
    let mut config = loopback_config(&["low", "high"]);
    config.dispatch.policy = DispatchPolicy::All;
    runtime.start(config).await.unwrap();

    let chat = loopback(&created, 0);
    chat.handle().say("ada", "ping").unwrap();
    chat.wait_for_sent(2, WAIT).await;
    let mut texts = chat.sent_texts();
    texts.sort();
    assert_eq!(texts, ["high", "low"]);

    runtime.stop().await;
}

#[tokio::test]
async fn failing_skills_are_contained() {
    let created = Created::default();
    let mut catalog = SkillCatalog::new();
    catalog.register_skills(
        "failing",
        vec![
            fails_on("error", RegexSpec::new("^boom$")),
            Skill::builder("panic")
                .matcher(Matcher::regex(RegexSpec::new("^panic$")).unwrap())
                .handler(|_, _, event| async move {
                    if event.text() == Some("panic") {
                        panic!("unexpected state");
                    }
                    Ok(())
                }),
            replies_with_name("fine", RegexSpec::new("^ok$")),
        ],
    );
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_skills(catalog),
    );
    runtime.start(loopback_config(&["failing"])).await.unwrap();

    let chat = loopback(&created, 0);
    let handle = chat.handle();
    handle.say("ada", "boom").unwrap();
    handle.say("ada", "panic").unwrap();
    handle.say("ada", "ok").unwrap();
    chat.wait_for_sent(3, WAIT).await;

    let mut texts = chat.sent_texts();
    texts.sort();
    assert_eq!(texts, [FAILURE_NOTICE, FAILURE_NOTICE, "fine"]);
    for notice in chat.sent().iter().filter(|e| e.text() == Some(FAILURE_NOTICE)) {
        assert_eq!(notice.target(), Some("ada"));
    }
    assert_eq!(runtime.stats().snapshot().messages_parsed, 3);

    runtime.stop().await;
}

#[tokio::test]
async fn failing_top_candidate_does_not_stop_the_next() {
    let mut catalog = SkillCatalog::new();
    catalog.register_skills(
        "pair",
        vec![
            fails_on("first", RegexSpec::new(".*").score_factor(1.0)),
            replies_with_name("second", RegexSpec::new(".*").score_factor(0.5)),
        ],
    );
    let created = Created::default();
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_skills(catalog),
    );
    let mut config = loopback_config(&["pair"]);
    config.dispatch.policy = DispatchPolicy::All;
    runtime.start(config).await.unwrap();

    let chat = loopback(&created, 0);
    chat.handle().say("ada", "ping").unwrap();
    chat.wait_for_sent(2, WAIT).await;
    let mut texts = chat.sent_texts();
    texts.sort();
    assert_eq!(texts, [FAILURE_NOTICE, "second"]);

    chat.handle().say("ada", "ping again").unwrap();
    chat.wait_for_sent(4, WAIT).await;
    assert_eq!(chat.sent().len(), 4);
    assert_eq!(runtime.stats().snapshot().messages_parsed, 2);

    runtime.stop().await;
}

#[tokio::test]
async fn hung_failure_notice_does_not_block_stop() {
    let mut catalog = SkillCatalog::new();
    catalog.register_skills("boom", vec![fails_on("boom", RegexSpec::new("boom"))]);
    let created = Created::default();
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_skills(catalog),
    );
    let mut config = SkiffConfig {
        connectors: vec![ModuleConfig::new("chat").with_kind("stalled")],
        skills: vec![ModuleConfig::new("boom")],
        ..Default::default()
    };
    config.runtime.grace_period_secs = 0;
    runtime.start(config).await.unwrap();

    loopback(&created, 0).handle().say("ada", "boom").unwrap();
    eventually(|| runtime.stats().snapshot().messages_parsed == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(WAIT, runtime.stop()).await.unwrap();
    assert!(!runtime.is_running());
}

#[tokio::test]
async fn stop_twice_is_a_no_op() {
    let created = Created::default();
    let runtime = Runtime::new(RuntimeOptions::default().with_connectors(connectors(&created)));
    let mut config = loopback_config(&["ping"]);
    config.databases = vec![ModuleConfig::new("scratch").with_kind("memory")];
    runtime.start(config).await.unwrap();
    assert!(runtime.is_running());

    runtime.stop().await;
    runtime.stop().await;

    let chat = loopback(&created, 0);
    assert_eq!(chat.disconnect_count(), 1);
    assert!(!runtime.is_running());
    assert_eq!(runtime.memory().backend_count(), 0);
    assert_eq!(runtime.skill_count(), 0);
    assert!(runtime.connectors().is_empty());
}

#[tokio::test]
async fn start_while_running_is_an_error() {
    let created = Created::default();
    let runtime = Runtime::new(RuntimeOptions::default().with_connectors(connectors(&created)));
    runtime.start(loopback_config(&[])).await.unwrap();
    assert!(matches!(
        runtime.start(loopback_config(&[])).await,
        Err(Error::AlreadyRunning)
    ));
    runtime.stop().await;
}

#[tokio::test]
async fn broken_components_are_skipped() {
    let created = Created::default();
    let runtime = Runtime::new(RuntimeOptions::default().with_connectors(connectors(&created)));
    let config = SkiffConfig {
        connectors: vec![
            ModuleConfig::new("down").with_kind("broken"),
            ModuleConfig::new("chat").with_kind("loopback"),
            ModuleConfig::new("irc"),
            ModuleConfig {
                enabled: false,
                ..ModuleConfig::new("off").with_kind("loopback")
            },
        ],
        databases: vec![
            ModuleConfig::new("scratch").with_kind("memory"),
            ModuleConfig::new("disk").with_kind("file"),
            ModuleConfig::new("redis"),
        ],
        skills: vec![
            ModuleConfig::new("ping"),
            ModuleConfig::new("weather"),
            ModuleConfig::new("hello").with_setting("score_factor", json!(7)),
        ],
        ..Default::default()
    };
    runtime.start(config).await.unwrap();

    let names: Vec<_> = runtime
        .connectors()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(names, ["chat"]);
    assert_eq!(runtime.memory().backend_count(), 1);
    assert_eq!(runtime.skill_count(), 1);

    let chat = loopback(&created, 0);
    chat.handle().say("ada", "ping").unwrap();
    chat.wait_for_sent(1, WAIT).await;
    assert_eq!(chat.sent_texts(), ["pong"]);

    runtime.stop().await;
}

#[tokio::test]
async fn reload_rereads_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skiff.toml");
    std::fs::write(
        &path,
        r#"
[[connectors]]
name = "chat"
type = "loopback"

[skills.ping]
"#,
    )
    .unwrap();

    let created = Created::default();
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_config_path(&path),
    );
    runtime.start(load_config(&path).unwrap()).await.unwrap();
    assert_eq!(runtime.skill_count(), 1);

    std::fs::write(
        &path,
        r#"
[[connectors]]
name = "chat"
type = "loopback"

[skills.ping]
[skills.hello]
greeting = "Welcome back"
"#,
    )
    .unwrap();
    runtime.reload().await.unwrap();

    assert_eq!(runtime.skill_count(), 2);
    assert_eq!(created.lock().unwrap().len(), 2);
    assert_eq!(loopback(&created, 0).disconnect_count(), 1);

    let chat = loopback(&created, 1);
    chat.handle().say("ada", "hello").unwrap();
    chat.wait_for_sent(1, WAIT).await;
    assert_eq!(chat.sent_texts(), ["Welcome back ada"]);

    // A broken file keeps the last good configuration.
    std::fs::write(&path, "[[connectors]\n").unwrap();
    runtime.reload().await.unwrap();
    assert_eq!(runtime.skill_count(), 2);
    assert!(runtime.is_running());

    runtime.stop().await;
}

#[tokio::test]
async fn reload_before_start_has_nothing_to_load() {
    let runtime = Runtime::new(RuntimeOptions::default());
    assert!(matches!(runtime.reload().await, Err(Error::NoConfig)));
}

#[tokio::test]
async fn run_follows_requests() {
    let created = Created::default();
    let runtime = Runtime::new(RuntimeOptions::default().with_connectors(connectors(&created)));

    let task = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.run(loopback_config(&["ping"])).await })
    };
    eventually(|| runtime.is_running()).await;

    runtime.request_reload();
    eventually(|| created.lock().unwrap().len() == 2 && runtime.is_running()).await;

    runtime.request_stop();
    tokio::time::timeout(WAIT, task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!runtime.is_running());
    assert_eq!(loopback(&created, 1).disconnect_count(), 1);
}

#[tokio::test]
async fn slow_skills_are_abandoned_after_grace_period() {
    let started = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let mut catalog = SkillCatalog::new();
    {
        let started = Arc::clone(&started);
        let finished = Arc::clone(&finished);
        catalog.register_skills(
            "slow",
            vec![
                Skill::builder("slow")
                    .matcher(Matcher::regex(RegexSpec::new("slow")).unwrap())
                    .handler(move |_, _, _| {
                        let started = Arc::clone(&started);
                        let finished = Arc::clone(&finished);
                        async move {
                            started.store(true, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            finished.store(true, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
            ],
        );
    }

    let created = Created::default();
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_skills(catalog),
    );
    let mut config = loopback_config(&["slow"]);
    config.runtime.grace_period_secs = 0;
    runtime.start(config).await.unwrap();

    loopback(&created, 0).handle().say("ada", "slow").unwrap();
    eventually(|| started.load(Ordering::SeqCst)).await;

    tokio::time::timeout(WAIT, runtime.stop()).await.unwrap();
    assert!(!finished.load(Ordering::SeqCst));
    assert!(loopback(&created, 0).sent().is_empty());
}

#[tokio::test]
async fn in_flight_skills_finish_within_grace_period() {
    let mut catalog = SkillCatalog::new();
    catalog.register_skills(
        "slowish",
        vec![
            Skill::builder("slowish")
                .matcher(Matcher::regex(RegexSpec::new("go")).unwrap())
                .handler(|host, _, event| async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    host.memory().put("done", &true).await?;
                    host.send(event.reply("done")).await?;
                    Ok(())
                }),
        ],
    );
    let created = Created::default();
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_skills(catalog),
    );
    runtime.start(loopback_config(&["slowish"])).await.unwrap();

    let chat = loopback(&created, 0);
    chat.handle().say("ada", "go").unwrap();
    eventually(|| runtime.stats().snapshot().messages_parsed == 1).await;
    runtime.stop().await;

    assert_eq!(chat.sent_texts(), ["done"]);
    assert_eq!(runtime.memory().get::<bool>("done").await.unwrap(), Some(true));
}

#[tokio::test]
async fn memory_outlives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("memory.db");
    let config = {
        let mut config = loopback_config(&["remember", "recall"]);
        config.databases = vec![
            ModuleConfig::new("main")
                .with_kind("sqlite")
                .with_setting("path", json!(db.to_string_lossy())),
        ];
        config
    };

    let created = Created::default();
    let runtime = Runtime::new(RuntimeOptions::default().with_connectors(connectors(&created)));
    runtime.start(config.clone()).await.unwrap();
    let chat = loopback(&created, 0);
    chat.handle().say("ada", "remember colour is teal").unwrap();
    chat.wait_for_sent(1, WAIT).await;
    runtime.stop().await;
    drop(runtime);

    let runtime = Runtime::new(RuntimeOptions::default().with_connectors(connectors(&created)));
    runtime.start(config).await.unwrap();
    let chat = loopback(&created, 1);
    chat.handle().say("ada", "what is colour?").unwrap();
    chat.wait_for_sent(1, WAIT).await;
    assert_eq!(chat.sent_texts(), ["colour is teal."]);
    runtime.stop().await;
}

#[tokio::test]
async fn webhooks_fire_their_skill() {
    let mut catalog = SkillCatalog::new();
    catalog.register_skills(
        "deploy",
        vec![
            Skill::builder("deploy")
                .matcher(Matcher::webhook("github"))
                .handler(|host, _, event| async move {
                    let branch = event
                        .matched()
                        .and_then(|m| m.payload.as_ref())
                        .and_then(|p| p["ref"].as_str())
                        .unwrap_or("unknown")
                        .to_string();
                    host.send(event.reply(format!("deploying {branch}"))).await?;
                    Ok(())
                }),
        ],
    );
    let created = Created::default();
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_skills(catalog),
    );
    runtime.start(loopback_config(&["deploy"])).await.unwrap();

    let response = router(Arc::clone(&runtime))
        .oneshot(
            Request::post("/skill/deploy/github")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"ref": "main"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let chat = loopback(&created, 0);
    chat.wait_for_sent(1, WAIT).await;
    assert_eq!(chat.sent_texts(), ["deploying main"]);
    assert_eq!(runtime.stats().snapshot().webhooks_called, 1);
    assert_eq!(runtime.stats().snapshot().messages_parsed, 0);

    let missing = router(Arc::clone(&runtime))
        .oneshot(
            Request::post("/skill/deploy/gitlab")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    runtime.stop().await;
}

#[tokio::test]
async fn web_api_binds_and_stops() {
    let created = Created::default();
    let runtime = Runtime::new(RuntimeOptions::default().with_connectors(connectors(&created)));
    let mut config = loopback_config(&["ping"]);
    config.web.enabled = true;
    config.web.port = 0;
    runtime.start(config).await.unwrap();

    let addr = runtime.web_addr().unwrap();
    assert_ne!(addr.port(), 0);
    runtime.stop().await;
    assert!(runtime.web_addr().is_none());
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn crontab_skills_fire_on_schedule() {
    let mut catalog = SkillCatalog::new();
    catalog.register_skills(
        "tick",
        vec![
            Skill::builder("tick")
                .matcher(Matcher::crontab("* * * * * *", None).unwrap())
                .handler(|host, _, event| async move {
                    host.send(event.reply("tick")).await?;
                    Ok(())
                }),
        ],
    );
    let created = Created::default();
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_connectors(connectors(&created))
            .with_skills(catalog),
    );
    runtime.start(loopback_config(&["tick"])).await.unwrap();

    let chat = loopback(&created, 0);
    let sent = chat.wait_for_sent(1, WAIT).await;
    assert_eq!(sent[0].text(), Some("tick"));
    assert_eq!(sent[0].connector_name(), Some("chat"));
    runtime.stop().await;
}
