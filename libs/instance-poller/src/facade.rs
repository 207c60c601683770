//! Model-side interfaces: the facade and machine handles.
//!
//! The poller never talks to persistence directly; everything it knows about
//! machines arrives through these traits. Handle types are expected to be
//! cheap to clone and to share state between clones, so a refresh through
//! one clone is visible through all of them.

use async_trait::async_trait;
use tokio::sync::mpsc;

use fleet_model::{InstanceId, Life, MachineTag, ProviderAddress, Status, StatusInfo};

use crate::error::FacadeError;

/// Stream of machine-change batches.
///
/// Each batch carries the tags that changed since the last delivery. Closure
/// of the channel is fatal to the consumer; dropping the receiver stops the
/// watcher.
pub type MachineChanges = mpsc::Receiver<Vec<MachineTag>>;

/// Extra key/value detail attached to a status write.
pub type StatusData = serde_json::Map<String, serde_json::Value>;

/// The model-side RPC surface the poller consumes.
#[async_trait]
pub trait Facade: Send + Sync + 'static {
    type Machine: Machine;

    /// Watch for machine additions, removals, and lifecycle changes.
    async fn watch_model_machines(&self) -> Result<MachineChanges, FacadeError>;

    /// Fetch a handle to one machine record.
    async fn machine(&self, tag: &MachineTag) -> Result<Self::Machine, FacadeError>;
}

/// A handle to one machine record in the model.
#[async_trait]
pub trait Machine: Send + Sync + 'static {
    /// The machine's tag.
    fn tag(&self) -> &MachineTag;

    /// Lifecycle as of the last refresh.
    fn life(&self) -> Life;

    /// Reload the record's attributes from the model.
    async fn refresh(&self) -> Result<(), FacadeError>;

    /// The provider instance id backing this machine;
    /// [`FacadeError::NotProvisioned`] until one is assigned.
    async fn instance_id(&self) -> Result<InstanceId, FacadeError>;

    /// True for machines enrolled into the model by hand rather than
    /// provisioned through the provider.
    async fn is_manual(&self) -> Result<bool, FacadeError>;

    /// Instance-level status recorded in the model.
    async fn instance_status(&self) -> Result<StatusInfo, FacadeError>;

    /// Record a new instance-level status.
    async fn set_instance_status(
        &self,
        status: Status,
        message: &str,
        data: Option<StatusData>,
    ) -> Result<(), FacadeError>;

    /// Machine-level status, distinct from the instance-level one.
    async fn status(&self) -> Result<StatusInfo, FacadeError>;

    /// Addresses currently recorded for this machine.
    async fn provider_addresses(&self) -> Result<Vec<ProviderAddress>, FacadeError>;

    /// Replace the recorded address set.
    async fn set_provider_addresses(
        &self,
        addresses: Vec<ProviderAddress>,
    ) -> Result<(), FacadeError>;
}
