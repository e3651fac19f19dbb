//! Process signals and explicit requests that drive [`Runtime::run`].
//!
//! SIGTERM and ctrl-c stop the runtime; SIGHUP reloads it. Where SIGHUP does
//! not exist, reload is only reachable through [`Runtime::request_reload`].

use {
    std::sync::Arc,
    tracing::{info, warn},
};

use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Reload,
    Stop,
}

/// Wait for the next stop or reload request.
pub async fn next_request(runtime: &Arc<Runtime>) -> Request {
    let request = tokio::select! {
        () = runtime.stop_notify().notified() => Request::Stop,
        () = runtime.reload_notify().notified() => Request::Reload,
        request = os_signal() => request,
    };
    info!(?request, "runtime request received");
    request
}

#[cfg(unix)]
async fn os_signal() -> Request {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut term, mut hup) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(term), Ok(hup)) => (term, hup),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "could not install signal handlers, only ctrl-c is handled");
            return ctrl_c().await;
        },
    };

    tokio::select! {
        _ = term.recv() => Request::Stop,
        _ = hup.recv() => Request::Reload,
        request = ctrl_c() => request,
    }
}

#[cfg(not(unix))]
async fn os_signal() -> Request {
    ctrl_c().await
}

async fn ctrl_c() -> Request {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Request::Stop,
        Err(e) => {
            warn!(error = %e, "could not listen for ctrl-c");
            // Without a handler, only explicit requests can end the loop.
            std::future::pending().await
        },
    }
}
