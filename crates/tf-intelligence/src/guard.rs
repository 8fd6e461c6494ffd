use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::oracle::OracleError;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Normal operation – calls reach the oracle.
    Closed,
    /// Too many consecutive failures – calls are refused without contacting
    /// the oracle until the cooldown elapses.
    Open,
    /// Cooldown elapsed – a single probe call is admitted, concurrent callers
    /// are refused until it settles.
    HalfOpen,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Maximum duration for an individual oracle call.
    pub call_timeout: Duration,
    /// Consecutive failures before the guard opens.
    pub failure_threshold: u32,
    /// How long the guard stays open before letting a probe through.
    pub cooldown: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(20),
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl GuardConfig {
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

#[derive(Debug)]
struct InnerState {
    state: GuardState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probing: bool,
}

// ---------------------------------------------------------------------------
// OracleGuard
// ---------------------------------------------------------------------------

/// Bounds every oracle call by a timeout and an optional cancellation token,
/// and stops contacting an oracle that keeps failing.
///
/// Every way a guarded call can go wrong comes back as an [`OracleError`], so
/// callers have a single "unavailable" path that leads to the fallback rule.
/// A cancelled call does not count against the oracle's failure streak.
#[derive(Debug, Clone)]
pub struct OracleGuard {
    config: GuardConfig,
    inner: Arc<Mutex<InnerState>>,
}

impl Default for OracleGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

impl OracleGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(InnerState {
                state: GuardState::Closed,
                failure_count: 0,
                opened_at: None,
                probing: false,
            })),
        }
    }

    pub async fn state(&self) -> GuardState {
        self.inner.lock().await.state
    }

    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.failure_count
    }

    /// Run `f` under the guard.
    pub async fn call<F, Fut, T>(
        &self,
        cancel: Option<&CancellationToken>,
        f: F,
    ) -> Result<T, OracleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
    {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(OracleError::Cancelled);
        }

        let probe = self.admit().await?;

        let timed = tokio::time::timeout(self.config.call_timeout, f());
        let outcome = match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    if probe {
                        self.inner.lock().await.probing = false;
                    }
                    return Err(OracleError::Cancelled);
                }
                res = timed => res,
            },
            None => timed.await,
        };

        match outcome {
            Ok(Ok(value)) => {
                self.record_success().await;
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure(probe).await;
                Err(e)
            }
            Err(_elapsed) => {
                self.record_failure(probe).await;
                Err(OracleError::Timeout(self.config.call_timeout))
            }
        }
    }

    /// Decide whether a call may reach the oracle. Returns `true` when the
    /// admitted call is the half-open probe.
    async fn admit(&self) -> Result<bool, OracleError> {
        let refused = || -> Result<bool, OracleError> {
            Err(OracleError::Unavailable(
                "oracle disabled after repeated failures".into(),
            ))
        };
        let mut guard = self.inner.lock().await;
        match guard.state {
            GuardState::Closed => Ok(false),
            GuardState::Open => match guard.opened_at {
                Some(opened) if opened.elapsed() >= self.config.cooldown => {
                    info!("oracle guard transitioning Open -> HalfOpen");
                    guard.state = GuardState::HalfOpen;
                    guard.probing = true;
                    Ok(true)
                }
                _ => refused(),
            },
            GuardState::HalfOpen if guard.probing => refused(),
            GuardState::HalfOpen => {
                guard.probing = true;
                Ok(true)
            }
        }
    }

    async fn record_success(&self) {
        let mut guard = self.inner.lock().await;
        if guard.state == GuardState::HalfOpen {
            info!("oracle guard transitioning HalfOpen -> Closed");
        }
        guard.state = GuardState::Closed;
        guard.failure_count = 0;
        guard.opened_at = None;
        guard.probing = false;
    }

    async fn record_failure(&self, probe: bool) {
        let mut guard = self.inner.lock().await;
        guard.failure_count += 1;
        if probe {
            guard.probing = false;
        }

        match guard.state {
            GuardState::Closed if guard.failure_count >= self.config.failure_threshold => {
                warn!(
                    failures = guard.failure_count,
                    "oracle guard transitioning Closed -> Open"
                );
                guard.state = GuardState::Open;
                guard.opened_at = Some(Instant::now());
            }
            GuardState::HalfOpen => {
                warn!("oracle guard transitioning HalfOpen -> Open (probe failed)");
                guard.state = GuardState::Open;
                guard.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    /// Manually close the guard.
    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        guard.state = GuardState::Closed;
        guard.failure_count = 0;
        guard.opened_at = None;
        guard.probing = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
