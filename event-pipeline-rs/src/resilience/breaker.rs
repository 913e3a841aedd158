//! Per-model circuit breaker state machine
//!
//! `BreakerState` is a plain value. Every transition is a method taking the
//! current instant explicitly, so the state machine can be driven in tests
//! without a clock. Sharing and locking live in the registry.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Default number of consecutive failures that opens a breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

/// Default time an open breaker rejects calls before allowing a probe
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Breaker configuration, shared by every model in a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,

    /// Fixed time an open breaker waits before a probe is allowed
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Status of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerStatus {
    /// Calls pass through
    Closed,

    /// Calls are rejected locally
    Open,

    /// One probe call is allowed through
    HalfOpen,
}

impl fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Answer to "may I call this model now?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker is closed
    Pass,

    /// The caller holds the single half-open probe
    Probe,

    /// Breaker is open or the probe is taken
    Rejected {
        /// Time until a probe may be attempted
        retry_in: Duration,
    },
}

impl Admission {
    /// Whether the call may go ahead
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }
}

/// Health record for one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerState {
    /// Model this state belongs to
    pub model_id: String,

    /// Failures since the last success
    pub consecutive_failures: u32,

    /// Current status
    pub status: BreakerStatus,

    /// When the breaker last opened; always set while not closed
    pub opened_at: Option<Instant>,

    /// When the current half-open probe was handed out
    pub probe_started_at: Option<Instant>,
}

impl BreakerState {
    /// A closed breaker with no failures
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            consecutive_failures: 0,
            status: BreakerStatus::Closed,
            opened_at: None,
            probe_started_at: None,
        }
    }

    fn cooldown_elapsed(&self, now: Instant, config: &BreakerConfig) -> bool {
        match self.opened_at {
            Some(opened_at) => now.saturating_duration_since(opened_at) >= config.cooldown,
            None => true,
        }
    }

    fn probe_in_flight(&self, now: Instant, config: &BreakerConfig) -> bool {
        // A probe older than the cooldown is assumed abandoned.
        match self.probe_started_at {
            Some(started) => now.saturating_duration_since(started) < config.cooldown,
            None => false,
        }
    }

    fn remaining_cooldown(&self, now: Instant, config: &BreakerConfig) -> Duration {
        match self.opened_at {
            Some(opened_at) => config
                .cooldown
                .saturating_sub(now.saturating_duration_since(opened_at)),
            None => Duration::ZERO,
        }
    }

    /// Whether a call could be admitted right now. Does not change state.
    pub fn is_usable(&self, now: Instant, config: &BreakerConfig) -> bool {
        match self.status {
            BreakerStatus::Closed => true,
            BreakerStatus::Open => self.cooldown_elapsed(now, config),
            BreakerStatus::HalfOpen => !self.probe_in_flight(now, config),
        }
    }

    /// Admit or reject a call.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and the
    /// caller receives the probe slot. While the probe is out every other
    /// caller is rejected.
    pub fn try_acquire(&mut self, now: Instant, config: &BreakerConfig) -> Admission {
        match self.status {
            BreakerStatus::Closed => Admission::Pass,
            BreakerStatus::Open if self.cooldown_elapsed(now, config) => {
                self.status = BreakerStatus::HalfOpen;
                self.probe_started_at = Some(now);
                Admission::Probe
            }
            BreakerStatus::Open => Admission::Rejected {
                retry_in: self.remaining_cooldown(now, config),
            },
            BreakerStatus::HalfOpen if !self.probe_in_flight(now, config) => {
                self.probe_started_at = Some(now);
                Admission::Probe
            }
            BreakerStatus::HalfOpen => Admission::Rejected {
                retry_in: self
                    .probe_started_at
                    .map(|started| {
                        config
                            .cooldown
                            .saturating_sub(now.saturating_duration_since(started))
                    })
                    .unwrap_or(Duration::ZERO),
            },
        }
    }

    /// Record a successful call. Returns the new status if it changed.
    ///
    /// A late success reported while the breaker is open (from a call that was
    /// admitted before it opened) does not close it; only a probe can.
    pub fn on_success(&mut self) -> Option<BreakerStatus> {
        match self.status {
            BreakerStatus::Closed => {
                self.consecutive_failures = 0;
                None
            }
            BreakerStatus::HalfOpen => {
                self.consecutive_failures = 0;
                self.status = BreakerStatus::Closed;
                self.opened_at = None;
                self.probe_started_at = None;
                Some(BreakerStatus::Closed)
            }
            BreakerStatus::Open => None,
        }
    }

    /// Record a failed call. Returns the new status if it changed.
    pub fn on_failure(&mut self, now: Instant, config: &BreakerConfig) -> Option<BreakerStatus> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.status {
            BreakerStatus::Closed if self.consecutive_failures >= config.failure_threshold => {
                self.open(now);
                Some(BreakerStatus::Open)
            }
            BreakerStatus::Closed => None,
            BreakerStatus::HalfOpen => {
                self.open(now);
                Some(BreakerStatus::Open)
            }
            BreakerStatus::Open => None,
        }
    }

    fn open(&mut self, now: Instant) {
        self.status = BreakerStatus::Open;
        self.opened_at = Some(now);
        self.probe_started_at = None;
    }
}
