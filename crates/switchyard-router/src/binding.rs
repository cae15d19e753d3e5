//! Prefix bindings.

use std::sync::Arc;

use switchyard_core::RequestHandler;

/// Creates a fresh handler for one request.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn RequestHandler> + Send + Sync>;

/// A literal path prefix bound to a handler factory.
#[derive(Clone)]
pub struct RouteBinding {
    prefix: String,
    factory: HandlerFactory,
}

impl RouteBinding {
    /// Binds `prefix` to `factory`.
    pub fn new(prefix: impl Into<String>, factory: HandlerFactory) -> Self {
        Self {
            prefix: prefix.into(),
            factory,
        }
    }

    /// Returns the bound prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns `true` if `path` starts with the prefix, byte for byte.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        path.as_bytes().starts_with(self.prefix.as_bytes())
    }

    /// Creates a new handler instance.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn RequestHandler> {
        (self.factory)()
    }
}

impl std::fmt::Debug for RouteBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBinding")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::fixtures::TextHandler;

    fn binding(prefix: &str) -> RouteBinding {
        RouteBinding::new(
            prefix,
            Arc::new(|| -> Box<dyn RequestHandler> { Box::new(TextHandler::new("x")) }),
        )
    }

    #[test]
    fn test_matches_is_literal_and_case_sensitive() {
        let b = binding("/file");
        assert!(b.matches("/file"));
        assert!(b.matches("/files/x"));
        assert!(b.matches("/file?x"));
        assert!(!b.matches("/File"));
        assert!(!b.matches("/fil"));
        assert!(!b.matches(""));
    }

    #[test]
    fn test_matches_has_no_wildcards() {
        let b = binding("/a*");
        assert!(b.matches("/a*/b"));
        assert!(!b.matches("/ab"));
    }
}
