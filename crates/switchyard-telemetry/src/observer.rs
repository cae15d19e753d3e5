//! Lifecycle observers backed by `tracing` and `metrics`.
//!
//! Register these on a router to get one structured log line and one counter
//! increment per lifecycle notification, without touching any handler.

use switchyard_core::{LifecycleObserver, Stage, StageContext};
use tracing::Level;

use crate::metrics::record_lifecycle_event;

/// Logs every lifecycle notification.
///
/// Anomalies (`aborted`, `timed_out`, `expired`) log at `WARN`, everything
/// else at `DEBUG`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates the observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the level a notification for `stage` is logged at.
    #[must_use]
    pub const fn level_for(stage: Stage) -> Level {
        if stage.is_anomaly() {
            Level::WARN
        } else {
            Level::DEBUG
        }
    }
}

macro_rules! stage_event {
    ($level:expr, $stage:expr, $ctx:expr) => {
        tracing::event!(
            $level,
            stage = %$stage,
            request_id = ?$ctx.request_id(),
            peer = ?$ctx.peer_addr(),
            status = ?$ctx.status().map(|s| s.code()),
            http.path = ?$ctx.path(),
            received = $ctx.received_bytes(),
            content_length = ?$ctx.content_length(),
            "lifecycle {}",
            $stage
        )
    };
}

impl LifecycleObserver for TracingObserver {
    fn on_stage(&self, stage: Stage, ctx: &StageContext<'_>) {
        if Self::level_for(stage) == Level::WARN {
            stage_event!(Level::WARN, stage, ctx);
        } else {
            stage_event!(Level::DEBUG, stage, ctx);
        }
    }
}

/// Counts every lifecycle notification in
/// `switchyard_lifecycle_events_total{stage}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObserver;

impl MetricsObserver {
    /// Creates the observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleObserver for MetricsObserver {
    fn on_stage(&self, stage: Stage, _ctx: &StageContext<'_>) {
        record_lifecycle_event(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use switchyard_core::{ObserverRegistry, Request, StageSet};

    #[test]
    fn test_tracing_observer_uses_standard_fields() {
        use crate::logging::fields;
        use crate::logging::tests::capture_field_names;

        let request = Request::new(Method::GET, "/dump");
        let events = capture_field_names(|| {
            TracingObserver::new().on_stage(Stage::Completed, &StageContext::for_request(&request));
        });

        assert_eq!(
            events,
            vec![vec![
                fields::STAGE,
                fields::REQUEST_ID,
                fields::PEER_ADDR,
                fields::REQUEST_STATUS,
                fields::HTTP_PATH,
                fields::RECEIVED_BYTES,
                fields::CONTENT_LENGTH,
            ]]
        );
    }

    #[test]
    fn test_level_for_anomalies() {
        assert_eq!(TracingObserver::level_for(Stage::Aborted), Level::WARN);
        assert_eq!(TracingObserver::level_for(Stage::TimedOut), Level::WARN);
        assert_eq!(TracingObserver::level_for(Stage::Expired), Level::WARN);
        assert_eq!(TracingObserver::level_for(Stage::Completed), Level::DEBUG);
        assert_eq!(TracingObserver::level_for(Stage::ConnectionOpened), Level::DEBUG);
    }

    #[test]
    fn test_observers_handle_every_stage() {
        let mut registry = ObserverRegistry::new();
        registry
            .register(TracingObserver::new())
            .register_for(StageSet::all(), MetricsObserver::new());

        let request = Request::new(Method::POST, "/form");
        for stage in Stage::ALL {
            registry.notify(stage, &StageContext::for_request(&request));
            registry.notify(stage, &StageContext::detached());
        }
        assert_eq!(registry.len(), 2);
    }
}
