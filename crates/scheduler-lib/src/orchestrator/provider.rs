//! Cloud provider capability interface

use crate::error::ProviderError;
use crate::models::{PricingEntry, ResourceSpec};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Operations the scheduler needs from a cloud vendor
///
/// Every mutating call carries an idempotency key; repeating a call with the
/// same key must not repeat its effect.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Create an instance and return its id
    async fn create(
        &self,
        spec: &ResourceSpec,
        region: Option<&str>,
        idempotency_key: &str,
    ) -> ProviderResult<String>;

    async fn resize(
        &self,
        instance_id: &str,
        spec: &ResourceSpec,
        idempotency_key: &str,
    ) -> ProviderResult<()>;

    async fn terminate(&self, instance_id: &str, idempotency_key: &str) -> ProviderResult<()>;

    /// Drain workload and data from one instance onto another
    async fn migrate(
        &self,
        from_instance_id: &str,
        to_instance_id: &str,
        idempotency_key: &str,
    ) -> ProviderResult<()>;

    async fn get_pricing(&self) -> ProviderResult<Vec<PricingEntry>>;
}

/// One provider-side step of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Resize,
    Create,
    Migrate,
    Terminate,
    /// Best-effort cleanup of an instance created by a failed migration
    Rollback,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Resize => "resize",
            Step::Create => "create",
            Step::Migrate => "migrate",
            Step::Terminate => "terminate",
            Step::Rollback => "rollback",
        }
    }
}

/// Idempotency key for one step of an action, stable across retries
pub fn idempotency_key(action_id: &str, step: Step) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action_id.as_bytes());
    hasher.update(b":");
    hasher.update(step.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
