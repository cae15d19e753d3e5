//! Lifecycle stages and the per-request state machine.
//!
//! A request moves through the normal stages
//!
//! ```text
//! RequestIncoming -> HeaderReceived -> ( AccessDenied | BodyReceived* -> Completed ) -> Finished
//! ```
//!
//! while `Aborted`, `TimedOut` and `Expired` may preempt it at any in-flight
//! point. `ConnectionOpened` belongs to the connection, not to a request.
//!
//! [`RequestLifecycle`] enforces the ordering and at-most-once guarantees so a
//! transport can call it before every notification and skip transitions that
//! would break the contract.

use serde::{Deserialize, Serialize};

use crate::error::LifecycleViolation;

/// A lifecycle notification point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// A connection was accepted; no request framed yet.
    ConnectionOpened,
    /// The start line of a request was parsed.
    RequestIncoming,
    /// All headers were parsed.
    HeaderReceived,
    /// `authorize` returned `false`.
    AccessDenied,
    /// Some body bytes arrived. May recur.
    BodyReceived,
    /// The request was fully received and is handed to `service`.
    Completed,
    /// The response was fully sent.
    Finished,
    /// The peer went away.
    Aborted,
    /// A configured deadline passed.
    TimedOut,
    /// An orphaned request was reclaimed by the transport.
    Expired,
}

impl Stage {
    /// Every stage, in declaration order.
    pub const ALL: [Stage; 10] = [
        Stage::ConnectionOpened,
        Stage::RequestIncoming,
        Stage::HeaderReceived,
        Stage::AccessDenied,
        Stage::BodyReceived,
        Stage::Completed,
        Stage::Finished,
        Stage::Aborted,
        Stage::TimedOut,
        Stage::Expired,
    ];

    /// Returns the snake_case name used in logs and metric labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConnectionOpened => "connection_opened",
            Self::RequestIncoming => "request_incoming",
            Self::HeaderReceived => "header_received",
            Self::AccessDenied => "access_denied",
            Self::BodyReceived => "body_received",
            Self::Completed => "completed",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
            Self::TimedOut => "timed_out",
            Self::Expired => "expired",
        }
    }

    /// Returns `true` for the externally detected failure stages.
    #[must_use]
    pub const fn is_anomaly(self) -> bool {
        matches!(self, Self::Aborted | Self::TimedOut | Self::Expired)
    }

    /// Returns `true` for stages that may fire more than once per request.
    #[must_use]
    pub const fn is_recurring(self) -> bool {
        matches!(self, Self::BodyReceived)
    }

    /// Returns `true` for stages that end a request's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished) || self.is_anomaly()
    }

    /// Position in the normal progression; `None` for anomalies.
    const fn rank(self) -> Option<u8> {
        match self {
            Self::ConnectionOpened => Some(0),
            Self::RequestIncoming => Some(1),
            Self::HeaderReceived => Some(2),
            Self::AccessDenied | Self::BodyReceived => Some(3),
            Self::Completed => Some(4),
            Self::Finished => Some(5),
            Self::Aborted | Self::TimedOut | Self::Expired => None,
        }
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A compact set of [`Stage`]s.
///
/// # Example
///
/// ```
/// use switchyard_core::{Stage, StageSet};
///
/// let set = StageSet::of(&[Stage::Aborted, Stage::TimedOut]);
/// assert!(set.contains(Stage::Aborted));
/// assert!(!set.contains(Stage::Finished));
/// assert_eq!(set.len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageSet(u16);

impl StageSet {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The set of all stages.
    #[must_use]
    pub const fn all() -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < Stage::ALL.len() {
            bits |= Stage::ALL[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// The three anomaly stages.
    #[must_use]
    pub const fn anomalies() -> Self {
        Self(Stage::Aborted.bit() | Stage::TimedOut.bit() | Stage::Expired.bit())
    }

    /// Builds a set from a slice.
    #[must_use]
    pub fn of(stages: &[Stage]) -> Self {
        stages.iter().fold(Self::empty(), |set, s| set.with(*s))
    }

    /// Returns a copy with `stage` added.
    #[must_use]
    pub const fn with(self, stage: Stage) -> Self {
        Self(self.0 | stage.bit())
    }

    /// Adds a stage.
    pub fn insert(&mut self, stage: Stage) {
        self.0 |= stage.bit();
    }

    /// Returns `true` if `stage` is a member.
    #[must_use]
    pub const fn contains(self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    /// Returns `true` if no stage is a member.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the number of members.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), StageSet::with)
    }
}

/// Tracks which stages fired for one request and rejects invalid transitions.
///
/// # Example
///
/// ```
/// use switchyard_core::{RequestLifecycle, Stage};
///
/// let mut lifecycle = RequestLifecycle::new();
/// lifecycle.advance(Stage::RequestIncoming).unwrap();
/// lifecycle.advance(Stage::HeaderReceived).unwrap();
/// lifecycle.advance(Stage::BodyReceived).unwrap();
/// lifecycle.advance(Stage::BodyReceived).unwrap();
/// lifecycle.advance(Stage::Completed).unwrap();
///
/// // AccessDenied is exclusive with Completed.
/// assert!(lifecycle.advance(Stage::AccessDenied).is_err());
///
/// lifecycle.advance(Stage::Finished).unwrap();
/// assert!(lifecycle.is_closed());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestLifecycle {
    fired: StageSet,
    last: Option<Stage>,
    terminal: Option<Stage>,
    body_events: u64,
}

impl RequestLifecycle {
    /// Creates a lifecycle with no stage fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `stage` if the transition is valid.
    pub fn advance(&mut self, stage: Stage) -> Result<(), LifecycleViolation> {
        self.check(stage)?;
        self.fired.insert(stage);
        if stage == Stage::BodyReceived {
            self.body_events += 1;
        }
        if stage.is_anomaly() {
            self.terminal.get_or_insert(stage);
        } else {
            self.last = Some(stage);
            if stage == Stage::Finished {
                self.terminal = Some(stage);
            }
        }
        Ok(())
    }

    fn check(&self, stage: Stage) -> Result<(), LifecycleViolation> {
        if stage == Stage::ConnectionOpened {
            return Err(LifecycleViolation::ConnectionScoped(stage));
        }
        if self.fired.contains(Stage::Finished) {
            return Err(LifecycleViolation::AfterTerminal {
                stage,
                terminal: Stage::Finished,
            });
        }
        if stage.is_anomaly() {
            // Anomalies may race each other, but each fires at most once.
            if self.fired.contains(stage) {
                return Err(LifecycleViolation::Duplicate(stage));
            }
            return Ok(());
        }
        if let Some(terminal) = self.terminal {
            return Err(LifecycleViolation::AfterTerminal { stage, terminal });
        }
        if self.fired.contains(stage) && !stage.is_recurring() {
            return Err(LifecycleViolation::Duplicate(stage));
        }
        if self.fired.contains(Stage::AccessDenied)
            && matches!(stage, Stage::BodyReceived | Stage::Completed)
        {
            return Err(LifecycleViolation::Exclusive {
                stage,
                conflicts_with: Stage::AccessDenied,
            });
        }
        if stage == Stage::AccessDenied && self.fired.contains(Stage::Completed) {
            return Err(LifecycleViolation::Exclusive {
                stage,
                conflicts_with: Stage::Completed,
            });
        }
        if let Some(last) = self.last {
            let repeat = stage == last && stage.is_recurring();
            if !repeat && stage.rank() <= last.rank() {
                return Err(LifecycleViolation::OutOfOrder { stage, after: last });
            }
        }
        Ok(())
    }

    /// Returns `true` if `stage` already fired.
    #[must_use]
    pub const fn has_fired(&self, stage: Stage) -> bool {
        self.fired.contains(stage)
    }

    /// Returns every stage fired so far.
    #[must_use]
    pub const fn fired(&self) -> StageSet {
        self.fired
    }

    /// Returns the most recent normal stage.
    #[must_use]
    pub const fn last(&self) -> Option<Stage> {
        self.last
    }

    /// Returns the first terminal stage reached, if any.
    #[must_use]
    pub const fn terminal(&self) -> Option<Stage> {
        self.terminal
    }

    /// Returns how many times `BodyReceived` fired.
    #[must_use]
    pub const fn body_events(&self) -> u64 {
        self.body_events
    }

    /// Returns `true` once any stage fired.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        !self.fired.is_empty()
    }

    /// Returns `true` once `Finished` or an anomaly fired.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.terminal.is_some()
    }

    /// Returns `true` while the request is started but not yet closed.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.is_started() && !self.is_closed()
    }
}
