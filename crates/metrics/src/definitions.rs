//! Metric names and label keys used across skiff.

/// Event parsing and skill dispatch
pub mod dispatch {
    /// Inbound events run through the matcher pipeline
    pub const EVENTS_PARSED_TOTAL: &str = "skiff_events_parsed_total";
    /// Skill invocations started
    pub const SKILL_INVOCATIONS_TOTAL: &str = "skiff_skill_invocations_total";
    /// Skill invocations that returned an error or panicked
    pub const SKILL_ERRORS_TOTAL: &str = "skiff_skill_errors_total";
    /// Wall time of a single skill invocation in seconds
    pub const SKILL_DURATION_SECONDS: &str = "skiff_skill_duration_seconds";
    /// Events that matched no skill
    pub const UNMATCHED_EVENTS_TOTAL: &str = "skiff_unmatched_events_total";
    /// Webhook triggers received over HTTP
    pub const WEBHOOKS_CALLED_TOTAL: &str = "skiff_webhooks_called_total";
}

/// Connector metrics
pub mod connectors {
    /// Connectors currently listening
    pub const ACTIVE: &str = "skiff_connectors_active";
    /// Connectors skipped because construction or connect failed
    pub const FAILED_TOTAL: &str = "skiff_connectors_failed_total";
    /// Outbound events delivered through a connector
    pub const EVENTS_SENT_TOTAL: &str = "skiff_connector_events_sent_total";
}

/// Memory metrics
pub mod memory {
    /// Reads served from the in-process cache
    pub const CACHE_HITS_TOTAL: &str = "skiff_memory_cache_hits_total";
    /// Reads that had to go to a storage backend
    pub const CACHE_MISSES_TOTAL: &str = "skiff_memory_cache_misses_total";
    /// Backend operations that failed
    pub const BACKEND_ERRORS_TOTAL: &str = "skiff_memory_backend_errors_total";
    /// Storage backends currently attached
    pub const BACKENDS_ACTIVE: &str = "skiff_memory_backends_active";
}

/// Runtime lifecycle metrics
pub mod runtime {
    /// Completed reloads
    pub const RELOADS_TOTAL: &str = "skiff_runtime_reloads_total";
    /// Skill tasks abandoned after the shutdown grace period
    pub const ABANDONED_TASKS_TOTAL: &str = "skiff_runtime_abandoned_tasks_total";
}

/// Common label keys
pub mod labels {
    pub const CONNECTOR: &str = "connector";
    pub const SKILL: &str = "skill";
    pub const BACKEND: &str = "backend";
}

/// Histogram buckets
pub mod buckets {
    /// Skill durations: 5ms to 2 minutes
    pub const SKILL_DURATION: [f64; 12] = [
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 15.0, 60.0, 120.0,
    ];
}
