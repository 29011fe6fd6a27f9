//! The provider client capability consumed by the job engine.

use std::sync::Arc;

use async_trait::async_trait;
use memberflow_core::Account;

use crate::entity::{Dialog, Entity, IdShape};
use crate::error::ProviderError;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// An authenticated connection to the messaging provider.
///
/// Every call is network I/O and may fail with any [`ProviderError`] class.
/// Implementations are not expected to be safe for interleaved use by
/// several jobs; callers go through [`crate::ClientRegistry`] for that.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Look up a public username (without `@`).
    async fn resolve_username(&self, username: &str) -> ProviderResult<Entity>;

    /// Look up a raw numeric id using one of the provider's call shapes.
    async fn resolve_id(&self, id: i64, shape: IdShape) -> ProviderResult<Entity>;

    /// Resolve the target group or channel of a job.
    async fn resolve_group(&self, group_id: &str) -> ProviderResult<Entity>;

    async fn list_contacts(&self) -> ProviderResult<Vec<Entity>>;

    /// Most recent conversations first.
    async fn list_dialogs(&self, limit: usize) -> ProviderResult<Vec<Dialog>>;

    async fn list_participants(&self, group: &Entity, limit: usize) -> ProviderResult<Vec<Entity>>;

    /// Invite a user into a channel or supergroup.
    async fn invite_to_channel(&self, group: &Entity, user: &Entity) -> ProviderResult<()>;

    /// Add a user to a basic group (alternate call shape).
    async fn add_chat_user(&self, group: &Entity, user: &Entity) -> ProviderResult<()>;

    async fn is_connected(&self) -> bool;

    async fn reconnect(&self) -> ProviderResult<()>;

    async fn disconnect(&self);
}

/// Creates connected clients for accounts.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, account: &Account) -> ProviderResult<Arc<dyn ProviderClient>>;
}
