//! Mock implementations of every seam the poller consumes.
//!
//! Shipped with the crate the same way the runtime mock ships next to the
//! runtime trait: unit and integration tests drive the worker entirely
//! through these. Handles are cheap clones sharing interior state, so a
//! test can hold one clone while the worker holds another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use fleet_model::{InstanceId, Life, MachineTag, ProviderAddress, Status, StatusInfo};

use crate::error::FacadeError;
use crate::facade::{Facade, Machine, MachineChanges, StatusData};
use crate::provider::{CallContext, CredentialApi, Environ, Instance};

// =============================================================================
// Machine
// =============================================================================

#[derive(Debug)]
struct MachineState {
    life: Life,
    life_after_refresh: Option<Life>,
    manual: bool,
    instance_id: Option<InstanceId>,
    instance_id_error: Option<String>,
    instance_status: StatusInfo,
    instance_status_error: Option<String>,
    status_write_error: Option<String>,
    machine_status: StatusInfo,
    addresses: Vec<ProviderAddress>,

    refresh_calls: u32,
    instance_id_calls: Vec<Instant>,
    set_instance_status_calls: Vec<StatusInfo>,
    set_address_calls: Vec<Vec<ProviderAddress>>,
}

/// Mock machine handle with scriptable state and call recorders.
#[derive(Clone)]
pub struct MockMachine {
    tag: MachineTag,
    state: Arc<Mutex<MachineState>>,
}

impl MockMachine {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: MachineTag::new(tag),
            state: Arc::new(Mutex::new(MachineState {
                life: Life::Alive,
                life_after_refresh: None,
                manual: false,
                instance_id: None,
                instance_id_error: None,
                instance_status: StatusInfo::bare(Status::Pending),
                instance_status_error: None,
                status_write_error: None,
                machine_status: StatusInfo::bare(Status::Pending),
                addresses: Vec::new(),
                refresh_calls: 0,
                instance_id_calls: Vec::new(),
                set_instance_status_calls: Vec::new(),
                set_address_calls: Vec::new(),
            })),
        }
    }

    pub fn set_life(&self, life: Life) {
        self.state.lock().unwrap().life = life;
    }

    /// Life the machine will report after its next refresh.
    pub fn set_life_after_refresh(&self, life: Life) {
        self.state.lock().unwrap().life_after_refresh = Some(life);
    }

    pub fn set_manual(&self, manual: bool) {
        self.state.lock().unwrap().manual = manual;
    }

    /// Give the machine a provider instance id; until this is called,
    /// `instance_id()` reports not-provisioned.
    pub fn set_instance_id(&self, id: impl Into<String>) {
        self.state.lock().unwrap().instance_id = Some(InstanceId::new(id));
    }

    /// Make `instance_id()` fail with an opaque error instead.
    pub fn fail_instance_id(&self, message: impl Into<String>) {
        self.state.lock().unwrap().instance_id_error = Some(message.into());
    }

    pub fn set_instance_status(&self, status: StatusInfo) {
        self.state.lock().unwrap().instance_status = status;
    }

    /// Make `instance_status()` reads fail.
    pub fn fail_instance_status(&self, message: impl Into<String>) {
        self.state.lock().unwrap().instance_status_error = Some(message.into());
    }

    /// Make `set_instance_status()` writes fail.
    pub fn fail_status_writes(&self, message: impl Into<String>) {
        self.state.lock().unwrap().status_write_error = Some(message.into());
    }

    pub fn set_machine_status(&self, status: StatusInfo) {
        self.state.lock().unwrap().machine_status = status;
    }

    pub fn set_addresses(&self, addresses: Vec<ProviderAddress>) {
        self.state.lock().unwrap().addresses = addresses;
    }

    pub fn recorded_instance_status(&self) -> StatusInfo {
        self.state.lock().unwrap().instance_status.clone()
    }

    pub fn recorded_addresses(&self) -> Vec<ProviderAddress> {
        self.state.lock().unwrap().addresses.clone()
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.lock().unwrap().refresh_calls
    }

    /// Timestamps of every `instance_id()` call, in the test clock.
    pub fn instance_id_calls(&self) -> Vec<Instant> {
        self.state.lock().unwrap().instance_id_calls.clone()
    }

    pub fn set_instance_status_calls(&self) -> Vec<StatusInfo> {
        self.state.lock().unwrap().set_instance_status_calls.clone()
    }

    pub fn set_address_calls(&self) -> Vec<Vec<ProviderAddress>> {
        self.state.lock().unwrap().set_address_calls.clone()
    }
}

#[async_trait]
impl Machine for MockMachine {
    fn tag(&self) -> &MachineTag {
        &self.tag
    }

    fn life(&self) -> Life {
        self.state.lock().unwrap().life
    }

    async fn refresh(&self) -> Result<(), FacadeError> {
        let mut state = self.state.lock().unwrap();
        state.refresh_calls += 1;
        if let Some(life) = state.life_after_refresh.take() {
            state.life = life;
        }
        Ok(())
    }

    async fn instance_id(&self) -> Result<InstanceId, FacadeError> {
        let mut state = self.state.lock().unwrap();
        state.instance_id_calls.push(Instant::now());
        if let Some(message) = &state.instance_id_error {
            return Err(FacadeError::Other(anyhow!("{message}")));
        }
        state
            .instance_id
            .clone()
            .ok_or_else(|| FacadeError::NotProvisioned(self.tag.clone()))
    }

    async fn is_manual(&self) -> Result<bool, FacadeError> {
        Ok(self.state.lock().unwrap().manual)
    }

    async fn instance_status(&self) -> Result<StatusInfo, FacadeError> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.instance_status_error {
            return Err(FacadeError::Other(anyhow!("{message}")));
        }
        Ok(state.instance_status.clone())
    }

    async fn set_instance_status(
        &self,
        status: Status,
        message: &str,
        _data: Option<StatusData>,
    ) -> Result<(), FacadeError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = &state.status_write_error {
            return Err(FacadeError::Other(anyhow!("{error}")));
        }
        let info = StatusInfo::new(status, message);
        state.set_instance_status_calls.push(info.clone());
        state.instance_status = info;
        Ok(())
    }

    async fn status(&self) -> Result<StatusInfo, FacadeError> {
        Ok(self.state.lock().unwrap().machine_status.clone())
    }

    async fn provider_addresses(&self) -> Result<Vec<ProviderAddress>, FacadeError> {
        Ok(self.state.lock().unwrap().addresses.clone())
    }

    async fn set_provider_addresses(
        &self,
        addresses: Vec<ProviderAddress>,
    ) -> Result<(), FacadeError> {
        let mut state = self.state.lock().unwrap();
        state.set_address_calls.push(addresses.clone());
        state.addresses = addresses;
        Ok(())
    }
}

// =============================================================================
// Facade
// =============================================================================

struct FacadeState {
    machines: HashMap<MachineTag, MockMachine>,
    changes: Option<MachineChanges>,
}

/// Mock model facade: a bag of machines plus one watcher channel.
#[derive(Clone)]
pub struct MockFacade {
    state: Arc<Mutex<FacadeState>>,
}

impl MockFacade {
    /// Build the facade and hand back the watcher's sending side.
    pub fn new() -> (Self, mpsc::Sender<Vec<MachineTag>>) {
        let (tx, rx) = mpsc::channel(16);
        let facade = Self {
            state: Arc::new(Mutex::new(FacadeState {
                machines: HashMap::new(),
                changes: Some(rx),
            })),
        };
        (facade, tx)
    }

    pub fn add_machine(&self, machine: MockMachine) {
        self.state
            .lock()
            .unwrap()
            .machines
            .insert(machine.tag().clone(), machine);
    }
}

#[async_trait]
impl Facade for MockFacade {
    type Machine = MockMachine;

    async fn watch_model_machines(&self) -> Result<MachineChanges, FacadeError> {
        self.state
            .lock()
            .unwrap()
            .changes
            .take()
            .ok_or_else(|| FacadeError::Other(anyhow!("watcher already taken")))
    }

    async fn machine(&self, tag: &MachineTag) -> Result<MockMachine, FacadeError> {
        self.state
            .lock()
            .unwrap()
            .machines
            .get(tag)
            .cloned()
            .ok_or_else(|| FacadeError::Other(anyhow!("machine {tag} not found")))
    }
}

// =============================================================================
// Provider
// =============================================================================

#[derive(Debug)]
struct InstanceState {
    status: StatusInfo,
    addresses: Vec<ProviderAddress>,
}

/// Mock provider instance with scriptable status and addresses.
#[derive(Clone)]
pub struct MockInstance {
    id: InstanceId,
    state: Arc<Mutex<InstanceState>>,
}

impl MockInstance {
    pub fn new(id: impl Into<String>, status: StatusInfo) -> Self {
        Self {
            id: InstanceId::new(id),
            state: Arc::new(Mutex::new(InstanceState {
                status,
                addresses: Vec::new(),
            })),
        }
    }

    pub fn set_status(&self, status: StatusInfo) {
        self.state.lock().unwrap().status = status;
    }

    pub fn set_addresses(&self, addresses: Vec<ProviderAddress>) {
        self.state.lock().unwrap().addresses = addresses;
    }
}

#[async_trait]
impl Instance for MockInstance {
    fn id(&self) -> &InstanceId {
        &self.id
    }

    async fn status(&self, _ctx: &CallContext) -> StatusInfo {
        self.state.lock().unwrap().status.clone()
    }

    async fn addresses(&self, _ctx: &CallContext) -> anyhow::Result<Vec<ProviderAddress>> {
        Ok(self.state.lock().unwrap().addresses.clone())
    }
}

struct EnvironState {
    instances: HashMap<InstanceId, MockInstance>,
    fail_next: Option<String>,
    calls: Vec<Vec<InstanceId>>,
}

/// Mock provider adapter: answers lookups from a map of known instances,
/// leaving unknown ids as `None` slots.
#[derive(Clone)]
pub struct MockEnviron {
    state: Arc<Mutex<EnvironState>>,
}

impl MockEnviron {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EnvironState {
                instances: HashMap::new(),
                fail_next: None,
                calls: Vec::new(),
            })),
        }
    }

    pub fn add_instance(&self, instance: MockInstance) {
        self.state
            .lock()
            .unwrap()
            .instances
            .insert(instance.id().clone(), instance);
    }

    pub fn remove_instance(&self, id: &InstanceId) {
        self.state.lock().unwrap().instances.remove(id);
    }

    /// Make the next `instances()` query fail outright.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_next = Some(message.into());
    }

    /// Every id batch queried so far.
    pub fn calls(&self) -> Vec<Vec<InstanceId>> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl Default for MockEnviron {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Environ for MockEnviron {
    type Instance = MockInstance;

    async fn instances(
        &self,
        _ctx: &CallContext,
        ids: &[InstanceId],
    ) -> anyhow::Result<Vec<Option<MockInstance>>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ids.to_vec());
        if let Some(message) = state.fail_next.take() {
            anyhow::bail!("{message}");
        }
        Ok(ids
            .iter()
            .map(|id| state.instances.get(id).cloned())
            .collect())
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Mock credential adapter recording invalidation reasons.
#[derive(Clone, Default)]
pub struct MockCredentials {
    invalidations: Arc<Mutex<Vec<String>>>,
}

impl MockCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidations(&self) -> Vec<String> {
        self.invalidations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialApi for MockCredentials {
    async fn invalidate_model_credential(&self, reason: &str) -> anyhow::Result<()> {
        self.invalidations.lock().unwrap().push(reason.to_string());
        Ok(())
    }
}
