//! # fleet-instance-poller
//!
//! Worker that keeps the model's machine records in sync with what the
//! infrastructure provider actually reports. For every known machine it
//! periodically asks the provider for the instance's status and network
//! addresses; when those diverge from the model's record, the provider's
//! values are written back.
//!
//! ## Architecture
//!
//! One task owns all polling state and multiplexes four event sources:
//!
//! ```text
//! watcher batches ──┐
//! short ticker ─────┤
//! long ticker ──────┼─> loop ─> poll groups ─> provider ─> machine records
//! shutdown ─────────┘
//! ```
//!
//! Machines start in the *short* poll group, polled at sub-minute cadence
//! with exponential backoff while they boot. Once a machine has an address
//! and its status has settled, it is promoted to the *long* poll group and
//! only checked at a fixed multi-minute cadence. Any watcher event for a
//! machine drops it back to the short group for close observation.
//!
//! All scheduling state is in memory; after a restart it is rebuilt from
//! watcher deliveries.
//!
//! ## Modules
//!
//! - `config`: construction parameters and validation
//! - `error`: the construction / facade / fatal error taxonomy
//! - `facade`: model-side interfaces (facade, machine handles, watcher)
//! - `provider`: provider-side interfaces (environ, instances, call context)
//! - `testing`: mock implementations of every seam, for tests

pub mod config;
pub mod error;
pub mod facade;
pub mod provider;
pub mod testing;

mod groups;
mod worker;

pub use config::{Config, LoopCompletedHook, PollIntervals};
pub use error::{ConfigError, FacadeError, PollerError};
pub use facade::{Facade, Machine, MachineChanges, StatusData};
pub use provider::{CallContext, CredentialApi, Environ, Instance};
pub use worker::InstancePoller;
