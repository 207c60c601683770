//! Provider-side interfaces: the environ adapter and its instances.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fleet_model::{InstanceId, ProviderAddress, StatusInfo};

/// Credential surface used to flag bad cloud credentials discovered during
/// provider calls.
#[async_trait]
pub trait CredentialApi: Send + Sync {
    /// Mark the model's cloud credential invalid, with an operator-facing
    /// reason.
    async fn invalidate_model_credential(&self, reason: &str) -> anyhow::Result<()>;
}

/// Context threaded through provider calls.
///
/// Carries the supervisor-bound cancellation token and the credential
/// adapter, so provider implementations can abort early on shutdown and
/// report credential problems where they are discovered. The poller itself
/// imposes no per-call deadline; adapters own their own timeouts.
#[derive(Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    credentials: Arc<dyn CredentialApi>,
}

impl CallContext {
    pub fn new(cancel: CancellationToken, credentials: Arc<dyn CredentialApi>) -> Self {
        Self { cancel, credentials }
    }

    /// True once the owning worker has been killed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the owning worker is killed.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// The credential adapter for this model.
    pub fn credentials(&self) -> &dyn CredentialApi {
        self.credentials.as_ref()
    }
}

/// The provider adapter: what the poller needs from the cloud.
#[async_trait]
pub trait Environ: Send + Sync + 'static {
    type Instance: Instance;

    /// Look up instances by id.
    ///
    /// The reply is aligned positionally with `ids`; a slot is `None` when
    /// the provider has no record of that instance (the partial-result
    /// case). An `Err` is reserved for query-level failures and aborts the
    /// caller.
    async fn instances(
        &self,
        ctx: &CallContext,
        ids: &[InstanceId],
    ) -> anyhow::Result<Vec<Option<Self::Instance>>>;
}

/// A provisioned machine as the provider sees it.
#[async_trait]
pub trait Instance: Send + Sync {
    /// The provider's identifier for this instance.
    fn id(&self) -> &InstanceId;

    /// Current provider-side status.
    async fn status(&self, ctx: &CallContext) -> StatusInfo;

    /// Provider-reported network addresses.
    async fn addresses(&self, ctx: &CallContext) -> anyhow::Result<Vec<ProviderAddress>>;
}
