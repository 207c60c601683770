//! Integration tests driving the spawned worker through its public surface:
//! the watcher channel, the virtual clock, and the loop-completed hook.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use fleet_instance_poller::testing::{
    MockCredentials, MockEnviron, MockFacade, MockInstance, MockMachine,
};
use fleet_instance_poller::{
    CallContext, Config, ConfigError, Environ, InstancePoller, PollerError,
};
use fleet_model::{AddressScope, InstanceId, MachineTag, ProviderAddress, Status, StatusInfo};

fn config_with_hook<E>(
    facade: MockFacade,
    environ: E,
) -> (Config<MockFacade, E>, mpsc::UnboundedReceiver<()>) {
    let (hook_tx, hook_rx) = mpsc::unbounded_channel();
    let mut config = Config::new(facade, environ, Arc::new(MockCredentials::new()));
    config.loop_completed_hook = Some(Box::new(move || {
        let _ = hook_tx.send(());
    }));
    (config, hook_rx)
}

#[tokio::test]
async fn spawn_rejects_invalid_config() {
    let (facade, _changes_tx) = MockFacade::new();
    let mut config = Config::new(facade, MockEnviron::new(), Arc::new(MockCredentials::new()));
    config.intervals.short_poll = Duration::ZERO;

    let result = InstancePoller::spawn(config);
    assert!(matches!(result, Err(ConfigError::ShortPollNotValid)));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn kill_then_wait_is_clean() {
    let (facade, _changes_tx) = MockFacade::new();
    let config = Config::new(facade, MockEnviron::new(), Arc::new(MockCredentials::new()));

    let poller = InstancePoller::spawn(config).unwrap();
    poller.kill();
    // Killing twice is fine.
    poller.kill();
    assert!(poller.wait().await.is_ok());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn watcher_closure_is_fatal() {
    let (facade, changes_tx) = MockFacade::new();
    let config = Config::new(facade, MockEnviron::new(), Arc::new(MockCredentials::new()));

    let poller = InstancePoller::spawn(config).unwrap();
    drop(changes_tx);

    match poller.wait().await {
        Err(PollerError::WatcherClosed) => {}
        other => panic!("expected watcher-closed error, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn loop_polls_and_updates_machines() {
    let (facade, changes_tx) = MockFacade::new();
    let environ = MockEnviron::new();

    let machine = MockMachine::new("1");
    machine.set_instance_id("i-1");
    machine.set_machine_status(StatusInfo::bare(Status::Started));
    facade.add_machine(machine.clone());

    let instance = MockInstance::new("i-1", StatusInfo::bare(Status::Running));
    instance.set_addresses(vec![ProviderAddress::new("10.0.0.1", AddressScope::Public)]);
    environ.add_instance(instance);

    let (config, mut hook_rx) = config_with_hook(facade, environ.clone());
    let poller = InstancePoller::spawn(config).unwrap();

    changes_tx.send(vec![MachineTag::new("1")]).await.unwrap();
    // First iteration handles the watcher batch, the second is the short
    // tick that polls the new entry; the paused clock advances on its own.
    hook_rx.recv().await.unwrap();
    hook_rx.recv().await.unwrap();

    assert_eq!(
        machine.recorded_instance_status(),
        StatusInfo::bare(Status::Running)
    );
    assert_eq!(
        machine.recorded_addresses(),
        vec![ProviderAddress::new("10.0.0.1", AddressScope::Public)]
    );
    assert_eq!(environ.calls().len(), 1);

    poller.kill();
    assert!(poller.wait().await.is_ok());
}

/// Environ that parks inside the query until cancelled, flagging entry
/// first.
struct BlockingEnviron {
    entered: Arc<Notify>,
}

#[async_trait]
impl Environ for BlockingEnviron {
    type Instance = MockInstance;

    async fn instances(
        &self,
        ctx: &CallContext,
        _ids: &[InstanceId],
    ) -> anyhow::Result<Vec<Option<MockInstance>>> {
        self.entered.notify_one();
        ctx.cancelled().await;
        anyhow::bail!("query cancelled");
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn kill_cancels_in_flight_provider_call() {
    let (facade, changes_tx) = MockFacade::new();
    let machine = MockMachine::new("1");
    machine.set_instance_id("i-1");
    facade.add_machine(machine);

    let entered = Arc::new(Notify::new());
    let environ = BlockingEnviron {
        entered: Arc::clone(&entered),
    };

    let (config, mut hook_rx) = config_with_hook(facade, environ);
    let poller = InstancePoller::spawn(config).unwrap();
    changes_tx.send(vec![MachineTag::new("1")]).await.unwrap();
    hook_rx.recv().await.unwrap();

    // The short tick is now stuck inside the provider query.
    entered.notified().await;

    poller.kill();
    assert!(poller.wait().await.is_ok());
}

/// Environ that reports a credential problem through the call context and
/// then fails the query.
struct AuthFailingEnviron;

#[async_trait]
impl Environ for AuthFailingEnviron {
    type Instance = MockInstance;

    async fn instances(
        &self,
        ctx: &CallContext,
        _ids: &[InstanceId],
    ) -> anyhow::Result<Vec<Option<MockInstance>>> {
        ctx.credentials()
            .invalidate_model_credential("cloud rejected the stored credential")
            .await?;
        anyhow::bail!("unauthorized");
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn credential_problems_reach_the_credential_adapter() {
    let (facade, changes_tx) = MockFacade::new();
    let machine = MockMachine::new("1");
    machine.set_instance_id("i-1");
    facade.add_machine(machine);

    let credentials = MockCredentials::new();
    let config = Config::new(facade, AuthFailingEnviron, Arc::new(credentials.clone()));
    let poller = InstancePoller::spawn(config).unwrap();
    changes_tx.send(vec![MachineTag::new("1")]).await.unwrap();

    // The first short tick hits the failing query; the invalidation lands
    // before the fatal error tears the loop down.
    match poller.wait().await {
        Err(PollerError::Provider(_)) => {}
        other => panic!("expected provider query failure, got {other:?}"),
    }
    assert_eq!(
        credentials.invalidations(),
        vec!["cloud rejected the stored credential".to_string()]
    );
}
