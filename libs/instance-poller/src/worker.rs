//! The instance-poller worker.
//!
//! One task owns all polling state and multiplexes four event sources:
//! shutdown, watcher batches, the short ticker, and the long ticker. Every
//! facade and provider call is awaited from that task, so no locking guards
//! the poll groups; a slow adapter stalls polling rather than racing it.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fleet_model::{addresses_equal, InstanceId, Life, MachineTag, Status};

use crate::config::{Config, LoopCompletedHook, PollIntervals};
use crate::error::{ConfigError, PollerError};
use crate::facade::{Facade, Machine};
use crate::groups::{GroupSet, PollGroup};
use crate::provider::{CallContext, Environ, Instance};

/// Handle to a running instance poller.
///
/// The loop starts on [`spawn`](InstancePoller::spawn) and runs until it is
/// killed or hits a fatal error. Killing is idempotent and cancels any
/// in-flight facade or provider call; [`wait`](InstancePoller::wait) yields
/// the terminal error, or `Ok(())` after a clean kill.
pub struct InstancePoller {
    handle: JoinHandle<Result<(), PollerError>>,
    cancel: CancellationToken,
}

impl InstancePoller {
    /// Validate `config` and start the polling loop.
    pub fn spawn<F, E>(config: Config<F, E>) -> Result<Self, ConfigError>
    where
        F: Facade,
        E: Environ,
    {
        config.validate()?;

        let cancel = CancellationToken::new();
        let updater = Updater::new(config, cancel.clone());

        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_cancel.cancelled() => Ok(()),
                result = updater.run() => result,
            }
        });

        Ok(Self { handle, cancel })
    }

    /// Ask the loop to exit.
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    /// Wait for the loop to return and yield its terminal error.
    pub async fn wait(self) -> Result<(), PollerError> {
        match self.handle.await {
            Ok(result) => result,
            Err(_) => Err(PollerError::Panicked),
        }
    }
}

/// The loop body: owns the poll groups and every adapter handle.
struct Updater<F: Facade, E: Environ> {
    facade: F,
    environ: E,
    intervals: PollIntervals,
    call_ctx: CallContext,
    groups: GroupSet<F::Machine>,
    loop_completed_hook: Option<LoopCompletedHook>,
}

impl<F: Facade, E: Environ> Updater<F, E> {
    fn new(config: Config<F, E>, cancel: CancellationToken) -> Self {
        let Config {
            facade,
            environ,
            credentials,
            intervals,
            loop_completed_hook,
        } = config;
        Self {
            facade,
            environ,
            intervals,
            call_ctx: CallContext::new(cancel, credentials),
            groups: GroupSet::new(),
            loop_completed_hook,
        }
    }

    async fn run(mut self) -> Result<(), PollerError> {
        let mut changes = self
            .facade
            .watch_model_machines()
            .await
            .map_err(PollerError::Watch)?;

        // Both tickers fire one full period after startup and re-arm only
        // after their handler has finished.
        let start = Instant::now();
        let mut short_ticker = interval_at(start + self.intervals.short_poll, self.intervals.short_poll);
        short_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut long_ticker = interval_at(start + self.intervals.long_poll, self.intervals.long_poll);
        long_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                batch = changes.recv() => {
                    let Some(tags) = batch else {
                        return Err(PollerError::WatcherClosed);
                    };
                    for tag in tags {
                        self.queue_for_polling(tag).await?;
                    }
                }
                _ = short_ticker.tick() => {
                    self.poll_group(PollGroup::Short).await?;
                }
                _ = long_ticker.tick() => {
                    self.poll_group(PollGroup::Long).await?;
                }
            }

            if let Some(hook) = &self.loop_completed_hook {
                hook();
            }
        }
    }

    /// Track `tag`, refresh it if already tracked, or prune it when dead.
    async fn queue_for_polling(&mut self, tag: MachineTag) -> Result<(), PollerError> {
        let tracked = self.groups.get(&tag).map(|entry| Arc::clone(&entry.machine));
        if let Some(machine) = tracked {
            // Re-read the record before deciding anything; the event payload
            // alone says nothing about what changed.
            machine.refresh().await?;
            if machine.life() == Life::Dead {
                if let Some(entry) = self.groups.remove(&tag) {
                    debug!(
                        machine = %tag,
                        instance_id = ?entry.instance_id,
                        "removing dead machine"
                    );
                }
                return Ok(());
            }

            // Something changed on the machine; observe it at fine
            // granularity until it settles again.
            let now = Instant::now();
            if let Some(entry) = self.groups.get_mut(&tag) {
                entry.reset(now, &self.intervals);
                if entry.group == PollGroup::Long {
                    self.groups.move_to(&tag, PollGroup::Short);
                    debug!(machine = %tag, "moving machine back to short poll group");
                }
            }
            return Ok(());
        }

        let machine = self.facade.machine(&tag).await?;

        // Manual machines are invisible to the provider. Pin their instance
        // status to running and leave them untracked.
        if machine.is_manual().await? {
            let current = machine.instance_status().await?;
            if current.status != Status::Running {
                if let Err(e) = machine
                    .set_instance_status(Status::Running, "Manually provisioned machine", None)
                    .await
                {
                    error!(machine = %tag, error = %e, "cannot set instance status");
                    return Err(e.into());
                }
            }
            return Ok(());
        }

        self.groups
            .insert_short(tag, Arc::new(machine), Instant::now(), &self.intervals);
        Ok(())
    }

    /// Poll every due member of `group` against the provider in one batch.
    async fn poll_group(&mut self, group: PollGroup) -> Result<(), PollerError> {
        let now = Instant::now();

        let mut batch: Vec<InstanceId> = Vec::new();
        for tag in self.groups.members(group) {
            let Some(entry) = self.groups.get(&tag) else {
                continue;
            };
            // Short-group members are gated by their backoff deadline; the
            // long group polls every member on every firing.
            if group == PollGroup::Short && now < entry.due_at {
                continue;
            }

            let machine = Arc::clone(&entry.machine);
            let instance_id = match entry.instance_id.clone() {
                Some(id) => id,
                None => match machine.instance_id().await {
                    Ok(id) => {
                        self.groups.set_instance_id(&tag, id.clone());
                        id
                    }
                    Err(e) if e.is_not_provisioned() => {
                        // Not provisioned yet: retry later, less often, or
                        // as soon as the watcher reports a change.
                        if let Some(entry) = self.groups.get_mut(&tag) {
                            entry.bump(now, &self.intervals);
                        }
                        continue;
                    }
                    Err(e) => {
                        return Err(PollerError::ResolveInstanceId {
                            machine: tag,
                            source: e,
                        });
                    }
                },
            };
            batch.push(instance_id);
        }

        if batch.is_empty() {
            return Ok(());
        }

        let infos = self
            .environ
            .instances(&self.call_ctx, &batch)
            .await
            .map_err(PollerError::Provider)?;

        for (instance_id, info) in batch.iter().zip(infos) {
            // A missing slot usually means the instance was torn down and
            // the watcher has not told us yet. The entry stays put until it
            // does.
            let Some(info) = info else {
                warn!(
                    instance_id = %instance_id,
                    "unable to retrieve instance information"
                );
                continue;
            };

            let Some(tag) = self.groups.tag_for_instance(instance_id).cloned() else {
                continue;
            };

            let provider_status = self
                .process_provider_info(&tag, instance_id, &info, now)
                .await?;

            let Some(machine) = self.groups.get(&tag).map(|e| Arc::clone(&e.machine)) else {
                continue;
            };
            let machine_status = machine.status().await?;
            self.maybe_switch_poll_group(group, &tag, provider_status, machine_status.status, now)
                .await;
        }

        Ok(())
    }

    /// Apply provider-reported status and addresses to the machine record.
    ///
    /// Returns the provider status code fed into the group-transition
    /// policy.
    async fn process_provider_info(
        &mut self,
        tag: &MachineTag,
        instance_id: &InstanceId,
        info: &E::Instance,
        now: Instant,
    ) -> Result<Status, PollerError> {
        let Some(machine) = self.groups.get(tag).map(|e| Arc::clone(&e.machine)) else {
            return Ok(Status::Unknown);
        };

        let current = match machine.instance_status().await {
            Ok(status) => status,
            Err(e) => {
                // Should not happen for a provisioned machine. Report
                // unknown so the machine lands back in the short poll group.
                warn!(
                    machine = %tag,
                    instance_id = %instance_id,
                    error = %e,
                    "cannot get current instance status"
                );
                return Ok(Status::Unknown);
            }
        };

        let provider_status = info.status(&self.call_ctx).await;
        if provider_status != current {
            info!(
                machine = %tag,
                instance_id = %instance_id,
                from = %current,
                to = %provider_status,
                "instance status changed"
            );
            if let Err(e) = machine
                .set_instance_status(provider_status.status.clone(), &provider_status.message, None)
                .await
            {
                error!(machine = %tag, error = %e, "cannot set instance status");
                return Err(e.into());
            }

            // A freshly running instance is about to settle further; watch
            // it closely again.
            if provider_status.status == Status::Running {
                if let Some(entry) = self.groups.get_mut(tag) {
                    entry.reset(now, &self.intervals);
                }
            }
        }

        // Dead machines are cleaned up when the watcher reports them; no
        // point updating the record further.
        if machine.life() == Life::Dead {
            return Ok(Status::Unknown);
        }

        let current_addresses = machine.provider_addresses().await?;
        let provider_addresses = info
            .addresses(&self.call_ctx)
            .await
            .map_err(PollerError::Provider)?;
        if !addresses_equal(&current_addresses, &provider_addresses) {
            info!(
                machine = %tag,
                instance_id = %instance_id,
                addresses = ?provider_addresses,
                "machine has new addresses"
            );
            if let Err(e) = machine.set_provider_addresses(provider_addresses).await {
                error!(machine = %tag, error = %e, "cannot set provider addresses");
                return Err(e.into());
            }
        }

        Ok(provider_status.status)
    }

    /// Re-evaluate which poll group the entry belongs to after a poll.
    async fn maybe_switch_poll_group(
        &mut self,
        current_group: PollGroup,
        tag: &MachineTag,
        provider_status: Status,
        machine_status: Status,
        now: Instant,
    ) {
        if provider_status == Status::Allocating || provider_status == Status::Pending {
            // Keep the machine in the short poll group until it settles.
            if let Some(entry) = self.groups.get_mut(tag) {
                entry.bump(now, &self.intervals);
            }
            return;
        }

        let Some(machine) = self.groups.get(tag).map(|e| Arc::clone(&e.machine)) else {
            return;
        };
        let addresses = machine.provider_addresses().await.unwrap_or_default();

        // A long-group machine that went quiet or lost its addresses needs
        // fine-grained observation again.
        if current_group == PollGroup::Long
            && (provider_status == Status::Unknown || addresses.is_empty())
        {
            self.groups.move_to(tag, PollGroup::Short);
            if let Some(entry) = self.groups.get_mut(tag) {
                entry.reset(now, &self.intervals);
            }
            debug!(machine = %tag, "moving machine back to short poll group");
            return;
        }

        // Started and reachable: drift checks only from here on.
        if !addresses.is_empty() && machine_status == Status::Started {
            if current_group == PollGroup::Long {
                debug!(machine = %tag, "machine already in long poll group");
                return;
            }
            self.groups.move_to(tag, PollGroup::Long);
            debug!(machine = %tag, "moving machine to long poll group");
            return;
        }

        // Still booting or otherwise unsettled; give it more time before
        // the next look.
        if current_group == PollGroup::Short {
            if let Some(entry) = self.groups.get_mut(tag) {
                entry.bump(now, &self.intervals);
            }
        }
    }
}
