//! Table-driven lifecycle observers.
//!
//! Instead of overriding one hook per stage, observers subscribe to a
//! [`StageSet`] and receive a single `on_stage` call. The registry delivers
//! notifications in registration order and isolates observers from each
//! other: a panicking observer is logged and skipped, the rest still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::context::StageContext;
use crate::lifecycle::{Stage, StageSet};

/// Receives lifecycle notifications.
///
/// Implementations must not block; they run inline on the transport's
/// connection task.
pub trait LifecycleObserver: Send + Sync {
    /// Called for every subscribed stage.
    fn on_stage(&self, stage: Stage, ctx: &StageContext<'_>);
}

impl<F> LifecycleObserver for F
where
    F: Fn(Stage, &StageContext<'_>) + Send + Sync,
{
    fn on_stage(&self, stage: Stage, ctx: &StageContext<'_>) {
        self(stage, ctx);
    }
}

struct Subscription {
    stages: StageSet,
    observer: Arc<dyn LifecycleObserver>,
}

/// An ordered list of observers with per-observer stage filters.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use switchyard_core::{ObserverRegistry, Stage, StageContext, StageSet};
///
/// let anomalies = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&anomalies);
///
/// let mut registry = ObserverRegistry::new();
/// registry.register_for(StageSet::anomalies(), move |_stage: Stage, _ctx: &StageContext<'_>| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// registry.notify(Stage::Completed, &StageContext::detached());
/// registry.notify(Stage::TimedOut, &StageContext::detached());
/// assert_eq!(anomalies.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default, Clone)]
pub struct ObserverRegistry {
    subscriptions: Vec<Arc<Subscription>>,
}

impl ObserverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes an observer to every stage.
    pub fn register(&mut self, observer: impl LifecycleObserver + 'static) -> &mut Self {
        self.register_for(StageSet::all(), observer)
    }

    /// Subscribes an observer to the given stages.
    pub fn register_for(
        &mut self,
        stages: StageSet,
        observer: impl LifecycleObserver + 'static,
    ) -> &mut Self {
        self.register_shared(stages, Arc::new(observer))
    }

    /// Subscribes an already shared observer.
    pub fn register_shared(
        &mut self,
        stages: StageSet,
        observer: Arc<dyn LifecycleObserver>,
    ) -> &mut Self {
        self.subscriptions
            .push(Arc::new(Subscription { stages, observer }));
        self
    }

    /// Delivers `stage` to every subscribed observer, in registration order.
    pub fn notify(&self, stage: Stage, ctx: &StageContext<'_>) {
        for (index, sub) in self.subscriptions.iter().enumerate() {
            if !sub.stages.contains(stage) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| sub.observer.on_stage(stage, ctx)));
            if outcome.is_err() {
                tracing::error!(
                    observer = index,
                    stage = %stage,
                    request_id = ?ctx.request_id(),
                    "lifecycle observer panicked"
                );
            }
        }
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::RecordingObserver;
    use crate::request::Request;
    use http::Method;

    #[test]
    fn test_registry_filters_by_stage_set() {
        let all = Arc::new(RecordingObserver::new());
        let finished_only = Arc::new(RecordingObserver::new());

        let mut registry = ObserverRegistry::new();
        registry
            .register_shared(StageSet::all(), all.clone())
            .register_shared(StageSet::of(&[Stage::Finished]), finished_only.clone());

        let ctx = StageContext::detached();
        registry.notify(Stage::Completed, &ctx);
        registry.notify(Stage::Finished, &ctx);

        assert_eq!(all.stages(), vec![Stage::Completed, Stage::Finished]);
        assert_eq!(finished_only.stages(), vec![Stage::Finished]);
    }

    #[test]
    fn test_registry_preserves_registration_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut registry = ObserverRegistry::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            registry.register(move |_: Stage, _: &StageContext<'_>| order.lock().push(i));
        }

        registry.notify(Stage::RequestIncoming, &StageContext::detached());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let after = Arc::new(RecordingObserver::new());

        let mut registry = ObserverRegistry::new();
        registry.register(|_: Stage, _: &StageContext<'_>| panic!("observer bug"));
        registry.register_shared(StageSet::all(), after.clone());

        let request = Request::new(Method::GET, "/dump");
        registry.notify(Stage::HeaderReceived, &StageContext::for_request(&request));

        assert_eq!(after.stages(), vec![Stage::HeaderReceived]);
    }

    #[test]
    fn test_empty_registry() {
        let registry = ObserverRegistry::new();
        assert!(registry.is_empty());
        registry.notify(Stage::Expired, &StageContext::detached());
    }
}
