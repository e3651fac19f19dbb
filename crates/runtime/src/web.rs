//! HTTP API: welcome, stats, webhook triggers and metrics.
//!
//! JSON responses are wrapped as `{"timestamp", "status", "result"}`.

use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, State},
        http::{StatusCode, header},
        response::IntoResponse,
        routing::{get, post},
    },
    serde_json::{Value, json},
    skiff_channels::{EventKind, MatchData},
    skiff_config::WebConfig,
    tokio::net::TcpListener,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{error, info, warn},
};

#[cfg(feature = "metrics")]
use skiff_metrics::{counter, dispatch as dispatch_metrics, labels};

use crate::{Error, Result, dispatch, runtime::Runtime};

/// Routes served by the web API.
pub fn router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stats", get(stats))
        .route("/stats/", get(stats))
        .route("/skill/{skill}/{webhook}", post(webhook))
        .route("/metrics", get(metrics))
        .with_state(runtime)
}

/// Bind and serve on `tracker` until `shutdown`. Returns the bound address.
pub(crate) async fn serve(
    runtime: Arc<Runtime>,
    config: &WebConfig,
    tracker: &TaskTracker,
    shutdown: CancellationToken,
) -> Result<SocketAddr> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::bind(&addr, e))?;
    let local = listener.local_addr()?;
    let app = router(runtime);

    tracker.spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!(error = %e, "web API stopped with an error");
        }
    });
    info!(addr = %local, "web API listening");
    Ok(local)
}

fn respond(status: StatusCode, result: Value) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "status": status.as_u16(),
            "result": result,
        })),
    )
}

async fn index() -> impl IntoResponse {
    respond(
        StatusCode::OK,
        json!({ "message": "Welcome to the skiff API" }),
    )
}

async fn stats(State(runtime): State<Arc<Runtime>>) -> impl IntoResponse {
    let stats = runtime.stats().snapshot();
    respond(
        StatusCode::OK,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "messages": {
                "total_parsed": stats.messages_parsed,
                "webhooks_called": stats.webhooks_called,
            },
            "modules": {
                "skills": runtime.skill_count(),
                "connectors": runtime.connectors().len(),
                "databases": runtime.memory().backend_count(),
            },
        }),
    )
}

/// Fire the skill named `skill` through its webhook matcher `webhook`.
///
/// A JSON body becomes the event payload; any other body is passed as a
/// string.
async fn webhook(
    State(runtime): State<Arc<Runtime>>,
    Path((skill, name)): Path<(String, String)>,
    body: Bytes,
) -> impl IntoResponse {
    let Some(ctx) = runtime.dispatch_context() else {
        return respond(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": "runtime is not running" }),
        );
    };
    let Some(target) = runtime.find_webhook(&skill, &name) else {
        warn!(skill = %skill, webhook = %name, "no skill for webhook");
        return respond(
            StatusCode::NOT_FOUND,
            json!({ "error": format!("no skill '{skill}' with webhook '{name}'") }),
        );
    };

    let payload = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    runtime.stats().record_webhook();
    #[cfg(feature = "metrics")]
    counter!(dispatch_metrics::WEBHOOKS_CALLED_TOTAL, labels::SKILL => skill.clone()).increment(1);

    let event = runtime
        .trigger_event(EventKind::Webhook {
            name: name.clone(),
            payload: payload.clone(),
        })
        .with_match(MatchData {
            payload: Some(payload),
            ..Default::default()
        });
    info!(skill = %skill, webhook = %name, "webhook called");
    dispatch::spawn_skill(&runtime, target, event, &ctx);

    respond(
        StatusCode::OK,
        json!({ "called": skill, "webhook": name }),
    )
}

async fn metrics(State(runtime): State<Arc<Runtime>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        runtime.metrics().render(),
    )
}
