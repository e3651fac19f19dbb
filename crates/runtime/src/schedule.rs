//! Crontab triggers.

use std::sync::Arc;

use {
    chrono::Utc,
    skiff_channels::EventKind,
    skiff_skills::{CrontabMatcher, Skill},
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, info},
};

use crate::{
    dispatch::{self, DispatchContext},
    runtime::Runtime,
};

/// One task per crontab matcher, living until `shutdown`.
pub(crate) fn spawn_crontabs(
    runtime: &Arc<Runtime>,
    tracker: &TaskTracker,
    shutdown: &CancellationToken,
    ctx: &DispatchContext,
) {
    for (skill, cron) in runtime.crontabs() {
        info!(
            skill = %skill.name(),
            expression = %cron.expression(),
            timezone = ?cron.timezone(),
            "scheduling skill"
        );
        tracker.spawn(run_crontab(
            Arc::clone(runtime),
            skill,
            cron,
            shutdown.clone(),
            ctx.clone(),
        ));
    }
}

async fn run_crontab(
    runtime: Arc<Runtime>,
    skill: Arc<Skill>,
    cron: CrontabMatcher,
    shutdown: CancellationToken,
    ctx: DispatchContext,
) {
    loop {
        let now = Utc::now();
        let Some(next) = cron.next_after(now) else {
            debug!(skill = %skill.name(), "crontab has no further runs");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(wait) => {},
        }

        debug!(skill = %skill.name(), expression = %cron.expression(), "crontab fired");
        let event = runtime.trigger_event(EventKind::Scheduled {
            expression: cron.expression().to_string(),
        });
        dispatch::spawn_skill(&runtime, Arc::clone(&skill), event, &ctx);
    }
}
