//! Turning one inbound event into skill invocations.
//!
//! Every ranked matcher of every skill is evaluated; hits become
//! [`Candidate`]s sorted by score, ties going to the skill registered first.
//! The dispatch policy then picks the top candidate or every candidate above
//! `min_score`. Each invocation runs as its own task: an error or panic is
//! logged, answered with [`FAILURE_NOTICE`] on the originating channel and
//! never retried.

use std::sync::Arc;

use {
    serde_json::Value,
    skiff_channels::Event,
    skiff_config::{DispatchConfig, DispatchPolicy},
    skiff_skills::{Skill, SkillHost},
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use skiff_metrics::{counter, dispatch as dispatch_metrics, histogram, labels};

use crate::runtime::Runtime;

/// Sent back to the user when a skill fails.
pub const FAILURE_NOTICE: &str = "Whoops there has been an error.\nCheck the log for more information.";

/// Where dispatched skills run and how they are picked.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub handlers: TaskTracker,
    /// Cancelled when the grace period runs out.
    pub abandon: CancellationToken,
    pub policy: DispatchConfig,
}

impl DispatchContext {
    pub fn new(policy: DispatchConfig) -> Self {
        Self {
            handlers: TaskTracker::new(),
            abandon: CancellationToken::new(),
            policy,
        }
    }
}

/// One matcher hit.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub score: f64,
    pub skill: Arc<Skill>,
    pub config: Arc<Value>,
    /// Copy of the inbound event carrying this match's data.
    pub event: Event,
    /// Registration index of `skill`.
    pub order: usize,
}

/// Evaluate `event` against every ranked matcher, best first.
pub async fn rank(skills: &[Arc<Skill>], event: &Event) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (order, skill) in skills.iter().enumerate() {
        for matcher in skill.matchers().iter().filter(|m| !m.is_trigger()) {
            match matcher.evaluate(event).await {
                Ok(Some(outcome)) => candidates.push(Candidate {
                    score: outcome.score,
                    skill: Arc::clone(skill),
                    config: Arc::clone(skill.config()),
                    event: event.with_match(outcome.data),
                    order,
                }),
                Ok(None) => {},
                Err(e) => warn!(
                    skill = %skill.name(),
                    matcher = %matcher.kind(),
                    error = %e,
                    "matcher failed, treating as no match"
                ),
            }
        }
    }
    // Stable: equal scores keep registration order.
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}

/// Apply the dispatch policy to ranked candidates.
pub fn select(candidates: Vec<Candidate>, policy: &DispatchConfig) -> Vec<Candidate> {
    match policy.policy {
        DispatchPolicy::Top => candidates.into_iter().take(1).collect(),
        DispatchPolicy::All => candidates
            .into_iter()
            .filter(|c| c.score >= policy.min_score)
            .collect(),
    }
}

/// Rank `event` and spawn the selected skills. Returns how many were spawned.
pub(crate) async fn dispatch(runtime: &Arc<Runtime>, event: Event, ctx: &DispatchContext) -> usize {
    runtime.stats().record_message();
    #[cfg(feature = "metrics")]
    counter!(
        dispatch_metrics::EVENTS_PARSED_TOTAL,
        labels::CONNECTOR => event.connector_name().unwrap_or("none").to_string()
    )
    .increment(1);

    let skills = runtime.skills_snapshot();
    let selected = select(rank(&skills, &event).await, &ctx.policy);
    if selected.is_empty() {
        debug!(
            connector = event.connector_name().unwrap_or("none"),
            kind = event.kind().label(),
            "no skill matched"
        );
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::UNMATCHED_EVENTS_TOTAL).increment(1);
        return 0;
    }

    let count = selected.len();
    for candidate in selected {
        debug!(skill = %candidate.skill.name(), score = candidate.score, "dispatching");
        spawn_skill(runtime, candidate.skill, candidate.event, ctx);
    }
    count
}

/// Run `skill` on `event` as a tracked task with failure containment.
pub(crate) fn spawn_skill(
    runtime: &Arc<Runtime>,
    skill: Arc<Skill>,
    event: Event,
    ctx: &DispatchContext,
) {
    let runtime = Arc::clone(runtime);
    let abandon = ctx.abandon.clone();
    ctx.handlers.spawn(async move {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::SKILL_INVOCATIONS_TOTAL, labels::SKILL => skill.name().to_string())
            .increment(1);

        let host: Arc<dyn SkillHost> = runtime.clone();
        // A nested task turns a panic into a JoinError.
        let mut task = tokio::spawn(skill.invoke(host, event.clone()));
        let joined = tokio::select! {
            joined = &mut task => joined,
            () = abandon.cancelled() => {
                task.abort();
                warn!(skill = %skill.name(), "skill abandoned");
                return;
            },
        };

        #[cfg(feature = "metrics")]
        histogram!(dispatch_metrics::SKILL_DURATION_SECONDS, labels::SKILL => skill.name().to_string())
            .record(started.elapsed().as_secs_f64());

        let failure = match joined {
            Ok(Ok(())) => {
                debug!(skill = %skill.name(), "skill finished");
                return;
            },
            Ok(Err(e)) => format!("{e:#}"),
            Err(e) if e.is_panic() => "skill panicked".to_string(),
            Err(_) => return,
        };
        error!(
            skill = %skill.name(),
            text = event.text().unwrap_or_default(),
            error = %failure,
            "skill failed"
        );
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::SKILL_ERRORS_TOTAL, labels::SKILL => skill.name().to_string())
            .increment(1);

        tokio::select! {
            sent = runtime.send(event.reply(FAILURE_NOTICE)) => {
                if let Err(e) = sent {
                    warn!(skill = %skill.name(), error = %e, "could not deliver failure notice");
                }
            },
            () = abandon.cancelled() => {
                warn!(skill = %skill.name(), "failure notice abandoned");
            },
        }
    });
}
