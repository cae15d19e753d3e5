//! High-level router API.
//!
//! This module provides [`PrefixRouter`], the single entry point that
//! receives every request, and its [`PrefixRouterBuilder`].

use std::sync::Arc;

use switchyard_core::{
    DiagnosticBuffer, HandlerResult, LifecycleObserver, ObserverRegistry, Request,
    RequestHandler, Response, Stage, StageContext, StageSet, DEFAULT_DIAGNOSTIC_CAPACITY,
};

use crate::binding::{HandlerFactory, RouteBinding};
use crate::error::RouterError;

/// Decides whether a request may proceed, after its headers are parsed.
pub type Authorizer = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Where a path would be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget<'a> {
    /// The first binding whose prefix matches.
    Binding {
        /// Position in declaration order.
        index: usize,
        /// The matching prefix.
        prefix: &'a str,
    },
    /// No binding matched.
    Fallback,
}

impl std::fmt::Display for RouteTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binding { index, prefix } => write!(f, "binding[{index}] {prefix}"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// A first-match path-prefix router.
///
/// Bindings are scanned in declaration order and the first prefix that the
/// request path starts with wins, even if a later binding is longer. A
/// matched binding gets a brand-new handler for every request. Paths matching
/// nothing go to one shared fallback handler.
///
/// The binding list is immutable once built, so the router can be shared
/// across threads and dispatch concurrently.
///
/// # Example
///
/// ```rust
/// use switchyard_core::fixtures::TextHandler;
/// use switchyard_core::{Request, Response};
/// use switchyard_router::{PrefixRouter, RouteTarget};
/// use http::Method;
///
/// let router = PrefixRouter::builder(TextHandler::new("static"))
///     .route("/file", || TextHandler::new("file"))
///     .route("/files", || TextHandler::new("files"))
///     .build()
///     .unwrap();
///
/// // First match wins: "/files" is shadowed by "/file".
/// assert_eq!(
///     router.resolve("/files/x"),
///     RouteTarget::Binding { index: 0, prefix: "/file" }
/// );
///
/// let mut response = Response::new();
/// router
///     .dispatch(&Request::new(Method::GET, "/other.css"), &mut response)
///     .unwrap();
/// assert_eq!(response.body(), b"static");
/// ```
pub struct PrefixRouter {
    bindings: Vec<RouteBinding>,
    fallback: Arc<dyn RequestHandler>,
    observers: ObserverRegistry,
    authorizer: Option<Authorizer>,
    diagnostic_capacity: usize,
}

impl PrefixRouter {
    /// Starts building a router around a fallback handler.
    pub fn builder(fallback: impl RequestHandler + 'static) -> PrefixRouterBuilder {
        PrefixRouterBuilder::new(fallback)
    }

    /// Returns where `path` would be dispatched.
    ///
    /// An empty path matches no binding.
    #[must_use]
    pub fn resolve(&self, path: &str) -> RouteTarget<'_> {
        self.bindings
            .iter()
            .enumerate()
            .find(|(_, binding)| binding.matches(path))
            .map_or(RouteTarget::Fallback, |(index, binding)| {
                RouteTarget::Binding {
                    index,
                    prefix: binding.prefix(),
                }
            })
    }

    /// Dispatches a request with a fresh diagnostic buffer.
    pub fn dispatch(&self, request: &Request, response: &mut Response) -> HandlerResult {
        let mut diagnostics = DiagnosticBuffer::with_capacity(self.diagnostic_capacity);
        self.dispatch_with(request, response, &mut diagnostics)
    }

    /// Dispatches a request, recording diagnostics into `diagnostics`.
    ///
    /// The buffer is flushed if the handler fails and cleared on every exit
    /// path. Handler errors are returned unchanged.
    pub fn dispatch_with(
        &self,
        request: &Request,
        response: &mut Response,
        diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        let mut scope = diagnostics.scope();
        let target = self.resolve(request.path());
        tracing::debug!(
            request_id = %request.id(),
            http.path = request.path(),
            target = %target,
            "dispatching request"
        );

        let result = match target {
            RouteTarget::Binding { index, .. } => {
                let handler = self.bindings[index].instantiate();
                handler.service(request, response, &mut scope)
            }
            RouteTarget::Fallback => self.fallback.service(request, response, &mut scope),
        };

        if let Err(err) = &result {
            scope.error(format!("request {} failed: {err}", request.id()));
        }
        result
    }

    /// Returns the shared fallback handler.
    #[must_use]
    pub const fn fallback(&self) -> &Arc<dyn RequestHandler> {
        &self.fallback
    }

    /// Returns the bindings in declaration order.
    #[must_use]
    pub fn bindings(&self) -> &[RouteBinding] {
        &self.bindings
    }

    /// Returns the registered lifecycle observers.
    #[must_use]
    pub const fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Returns the per-request diagnostic buffer capacity.
    #[must_use]
    pub const fn diagnostic_capacity(&self) -> usize {
        self.diagnostic_capacity
    }
}

impl RequestHandler for PrefixRouter {
    fn service(
        &self,
        request: &Request,
        response: &mut Response,
        diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        self.dispatch_with(request, response, diagnostics)
    }

    fn authorize(&self, request: &Request, _response: &mut Response) -> bool {
        tracing::debug!(
            request_id = %request.id(),
            peer = ?request.peer_addr(),
            status = request.status().code(),
            http.path = request.path(),
            received = request.received_bytes(),
            content_length = ?request.content_length(),
            "authorizing request"
        );
        let allowed = self.authorizer.as_ref().map_or(true, |authorizer| authorizer(request));
        if !allowed {
            tracing::info!(
                request_id = %request.id(),
                http.path = request.path(),
                "request denied"
            );
        }
        allowed
    }

    fn notify(&self, stage: Stage, ctx: &StageContext<'_>) {
        self.observers.notify(stage, ctx);
    }
}

impl std::fmt::Debug for PrefixRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixRouter")
            .field("bindings", &self.bindings)
            .field("observers", &self.observers)
            .field("authorizer", &self.authorizer.is_some())
            .field("diagnostic_capacity", &self.diagnostic_capacity)
            .finish_non_exhaustive()
    }
}

/// Builder for [`PrefixRouter`].
pub struct PrefixRouterBuilder {
    bindings: Vec<RouteBinding>,
    fallback: Arc<dyn RequestHandler>,
    observers: ObserverRegistry,
    authorizer: Option<Authorizer>,
    diagnostic_capacity: usize,
}

impl PrefixRouterBuilder {
    /// Creates a builder whose fallback is `fallback`.
    pub fn new(fallback: impl RequestHandler + 'static) -> Self {
        Self::with_shared_fallback(Arc::new(fallback))
    }

    /// Creates a builder around an already shared fallback.
    #[must_use]
    pub fn with_shared_fallback(fallback: Arc<dyn RequestHandler>) -> Self {
        Self {
            bindings: Vec::new(),
            fallback,
            observers: ObserverRegistry::new(),
            authorizer: None,
            diagnostic_capacity: DEFAULT_DIAGNOSTIC_CAPACITY,
        }
    }

    /// Binds `prefix` to a factory producing a new handler per request.
    #[must_use]
    pub fn route<F, H>(self, prefix: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: RequestHandler + 'static,
    {
        let boxed: HandlerFactory =
            Arc::new(move || -> Box<dyn RequestHandler> { Box::new(factory()) });
        self.binding(RouteBinding::new(prefix, boxed))
    }

    /// Appends a prebuilt binding.
    #[must_use]
    pub fn binding(mut self, binding: RouteBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Registers an observer for every stage.
    #[must_use]
    pub fn observer(mut self, observer: impl LifecycleObserver + 'static) -> Self {
        self.observers.register(observer);
        self
    }

    /// Registers an observer for the given stages.
    #[must_use]
    pub fn observer_for(
        mut self,
        stages: StageSet,
        observer: impl LifecycleObserver + 'static,
    ) -> Self {
        self.observers.register_for(stages, observer);
        self
    }

    /// Registers a shared observer for the given stages.
    #[must_use]
    pub fn shared_observer(
        mut self,
        stages: StageSet,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        self.observers.register_shared(stages, observer);
        self
    }

    /// Installs the access check consulted by `authorize`.
    #[must_use]
    pub fn authorizer(mut self, authorizer: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    /// Sets the per-request diagnostic buffer capacity.
    #[must_use]
    pub const fn diagnostic_capacity(mut self, capacity: usize) -> Self {
        self.diagnostic_capacity = capacity;
        self
    }

    /// Builds the router.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::EmptyPrefix`] if a binding has an empty prefix.
    pub fn build(self) -> Result<PrefixRouter, RouterError> {
        if let Some(index) = self.bindings.iter().position(|b| b.prefix().is_empty()) {
            return Err(RouterError::EmptyPrefix { index });
        }

        for (index, binding) in self.bindings.iter().enumerate() {
            if let Some(earlier) = self.bindings[..index]
                .iter()
                .find(|earlier| binding.prefix().starts_with(earlier.prefix()))
            {
                tracing::warn!(
                    prefix = binding.prefix(),
                    shadowed_by = earlier.prefix(),
                    "route binding is unreachable: an earlier prefix always matches first"
                );
            }
        }

        tracing::debug!(
            bindings = self.bindings.len(),
            observers = self.observers.len(),
            "prefix router built"
        );

        Ok(PrefixRouter {
            bindings: self.bindings,
            fallback: self.fallback,
            observers: self.observers,
            authorizer: self.authorizer,
            diagnostic_capacity: self.diagnostic_capacity,
        })
    }
}

impl std::fmt::Debug for PrefixRouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixRouterBuilder")
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}
