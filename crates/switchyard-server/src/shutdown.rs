//! Graceful shutdown signal handling.
//!
//! [`ShutdownSignal`] is a cloneable flag that every connection task watches.
//! Once triggered, the accept loop stops, open connections are asked to
//! finish their current exchange, and [`ConnectionTracker`] reports when the
//! last one is gone.
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! tokio::select! {
//!     () = shutdown.wait() => println!("Shutdown signal received"),
//!     () = tokio::time::sleep(Duration::from_secs(60)) => println!("Timeout"),
//! }
//! ```

use std::sync::Arc;

use tokio::sync::watch;

/// A signal that can be used to trigger and await graceful shutdown.
///
/// All clones observe the same flag.
///
/// ```rust
/// use switchyard_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let other = shutdown.clone();
///
/// other.trigger();
/// assert!(shutdown.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Triggers shutdown. Idempotent.
    pub fn trigger(&self) {
        if !self.sender.send_replace(true) {
            tracing::debug!("Shutdown triggered");
        }
    }

    /// Returns `true` once shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes when shutdown is triggered, immediately if it already was.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }

    /// Creates a signal that triggers on SIGTERM or SIGINT (Ctrl+C).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            if wait_for_os_signal().await {
                trigger.trigger();
            }
        });

        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for SIGTERM or SIGINT.
///
/// Returns `false` if no handler could be installed, in which case the
/// server can only be stopped through its [`ShutdownSignal`].
async fn wait_for_os_signal() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to register signal handlers");
                    return false;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
        true
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to wait for Ctrl+C");
            return false;
        }
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        true
    }
}

/// Counts open connections so shutdown can wait for them to drain.
///
/// ```rust
/// use switchyard_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    /// Registers a connection for as long as the token lives.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.send_modify(|n| *n += 1);
        ConnectionToken {
            active: Arc::clone(&self.active),
        }
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        *self.active.borrow()
    }

    /// Completes once every token has been dropped.
    pub async fn wait_for_shutdown(&self) {
        let mut receiver = self.active.subscribe();
        let _ = receiver.wait_for(|n| *n == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// An open connection. Dropping it decrements the tracker.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_signal_new() {
        let shutdown = ShutdownSignal::new();
        assert!(!shutdown.is_shutdown());
    }

    #[test]
    fn test_shutdown_signal_trigger_idempotent() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_shutdown());
    }

    #[test]
    fn test_shutdown_signal_clone_shares_state() {
        let shutdown = ShutdownSignal::default();
        let clone = shutdown.clone();
        clone.trigger();
        assert!(shutdown.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_completes_when_triggered() {
        let shutdown = ShutdownSignal::new();
        let trigger = shutdown.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger();
        });

        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .expect("wait should complete after trigger");
    }

    #[tokio::test]
    async fn test_wait_completes_immediately_if_triggered() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        tokio::time::timeout(Duration::from_millis(50), shutdown.wait())
            .await
            .expect("wait should complete immediately");
    }

    #[test]
    fn test_connection_tracker_counts_tokens() {
        let tracker = ConnectionTracker::default();
        let a = tracker.acquire();
        let b = tracker.acquire();
        assert_eq!(tracker.active_connections(), 2);

        drop(a);
        assert_eq!(tracker.active_connections(), 1);
        drop(b);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_tracker_wait_immediate_when_idle() {
        let tracker = ConnectionTracker::new();
        tokio::time::timeout(Duration::from_millis(50), tracker.wait_for_shutdown())
            .await
            .expect("no connections to wait for");
    }

    #[tokio::test]
    async fn test_tracker_wait_for_last_token() {
        let tracker = ConnectionTracker::new();
        let token = tracker.acquire();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(token);
        });

        tokio::time::timeout(Duration::from_secs(1), tracker.wait_for_shutdown())
            .await
            .expect("wait should complete when the token drops");
        assert_eq!(tracker.active_connections(), 0);
    }
}
