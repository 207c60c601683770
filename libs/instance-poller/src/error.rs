//! Error types for the instance poller.

use fleet_model::MachineTag;
use thiserror::Error;

/// Construction-time configuration failures.
///
/// Raised only by [`crate::Config::validate`]; the running loop never sees
/// these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The short poll interval is zero.
    #[error("short poll interval not valid: must be non-zero")]
    ShortPollNotValid,

    /// The long poll interval is below the short poll interval.
    #[error("long poll interval not valid: must be at least the short poll interval")]
    LongPollNotValid,

    /// The backoff factor would shrink or corrupt the interval.
    #[error("short poll backoff not valid: must be a finite factor of at least 1.0")]
    BackoffNotValid,
}

/// Errors surfaced by the model facade and machine handles.
#[derive(Debug, Error)]
pub enum FacadeError {
    /// The machine exists but has no provider instance behind it yet.
    #[error("machine {0} not provisioned")]
    NotProvisioned(MachineTag),

    /// Any other facade failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FacadeError {
    /// True when the error means "no instance id assigned yet".
    pub fn is_not_provisioned(&self) -> bool {
        matches!(self, FacadeError::NotProvisioned(_))
    }
}

/// Terminal errors reported by [`crate::InstancePoller::wait`].
#[derive(Debug, Error)]
pub enum PollerError {
    /// The machine-change watcher channel closed underneath the loop.
    #[error("machines watcher closed")]
    WatcherClosed,

    /// The watcher could not be established at startup.
    #[error("cannot watch model machines")]
    Watch(#[source] FacadeError),

    /// A machine's instance id could not be read for a reason other than
    /// it not being provisioned yet.
    #[error("cannot get instance id for machine {machine}")]
    ResolveInstanceId {
        machine: MachineTag,
        #[source]
        source: FacadeError,
    },

    /// The provider instance query failed outright.
    #[error("provider instance query failed")]
    Provider(#[source] anyhow::Error),

    /// Any other facade or machine-handle failure.
    #[error(transparent)]
    Facade(#[from] FacadeError),

    /// The loop task panicked.
    #[error("instance poller task panicked")]
    Panicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_provisioned_is_recognised() {
        let err = FacadeError::NotProvisioned(MachineTag::new("3"));
        assert!(err.is_not_provisioned());
        assert_eq!(err.to_string(), "machine 3 not provisioned");

        let other = FacadeError::Other(anyhow::anyhow!("connection reset"));
        assert!(!other.is_not_provisioned());
    }

    #[test]
    fn resolve_error_names_the_machine() {
        let err = PollerError::ResolveInstanceId {
            machine: MachineTag::new("7"),
            source: FacadeError::Other(anyhow::anyhow!("boom")),
        };
        assert_eq!(err.to_string(), "cannot get instance id for machine 7");
    }
}
