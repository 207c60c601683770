//! Worker configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::provider::CredentialApi;

/// Polling cadence parameters.
///
/// A machine with no address or an unsettled status is polled every
/// `short_poll`, backing off by `short_poll_backoff` per attempt up to a
/// ceiling of `long_poll`. A machine with an address and a started status
/// is only checked every `long_poll` to catch drift.
#[derive(Debug, Clone)]
pub struct PollIntervals {
    /// Base interval of the short poll group.
    pub short_poll: Duration,

    /// Interval of the long poll group; also the backoff ceiling.
    pub long_poll: Duration,

    /// Multiplicative backoff applied to the short interval after each
    /// unproductive poll.
    pub short_poll_backoff: f64,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            short_poll: Duration::from_secs(1),
            long_poll: Duration::from_secs(15 * 60),
            short_poll_backoff: 2.0,
        }
    }
}

impl PollIntervals {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.short_poll.is_zero() {
            return Err(ConfigError::ShortPollNotValid);
        }
        if self.long_poll < self.short_poll {
            return Err(ConfigError::LongPollNotValid);
        }
        if !self.short_poll_backoff.is_finite() || self.short_poll_backoff < 1.0 {
            return Err(ConfigError::BackoffNotValid);
        }
        Ok(())
    }
}

/// Hook invoked after every completed loop iteration.
///
/// The only observability point into the loop: tests install one and wait on
/// its notifications instead of sleeping. Leave unset in production.
pub type LoopCompletedHook = Box<dyn Fn() + Send>;

/// Configuration for [`crate::InstancePoller::spawn`].
///
/// The facade, environ, and credential adapters are mandatory by
/// construction; [`Config::validate`] checks the numeric parameters.
pub struct Config<F, E> {
    /// Model-side RPC surface.
    pub facade: F,

    /// Provider adapter.
    pub environ: E,

    /// Credential adapter, threaded into provider calls so adapters can
    /// flag bad cloud credentials where they are discovered.
    pub credentials: Arc<dyn CredentialApi>,

    /// Polling cadence.
    pub intervals: PollIntervals,

    /// Test-only loop observability; see [`LoopCompletedHook`].
    pub loop_completed_hook: Option<LoopCompletedHook>,
}

impl<F, E> Config<F, E> {
    /// A config with default intervals and no hook.
    pub fn new(facade: F, environ: E, credentials: Arc<dyn CredentialApi>) -> Self {
        Self {
            facade,
            environ,
            credentials,
            intervals: PollIntervals::default(),
            loop_completed_hook: None,
        }
    }

    /// Check the configuration without starting anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.intervals.validate()
    }
}
