//! Invitation Executor: add a resolved entity to the target group.
//!
//! Methods are tried in order: Direct → Refreshed → AddChatUser.
//! Rate limits stop the chain and surface the wait; unrecoverable errors stop
//! the chain for this item; anything else moves on to the next method.

use crate::client::{ProviderClient, ProviderResult};
use crate::entity::Entity;
use crate::error::ProviderError;

/// Result of one invitation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Added,
    Failed(String),
    /// Provider demands a wait of this many seconds.
    RateLimited(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteMethod {
    /// Invite with the entity as resolved.
    Direct,
    /// Re-resolve by username first; guards against stale access hashes.
    Refreshed,
    /// Basic groups take a different call than channels.
    AddChatUser,
}

impl InviteMethod {
    pub const CHAIN: [InviteMethod; 3] = [
        InviteMethod::Direct,
        InviteMethod::Refreshed,
        InviteMethod::AddChatUser,
    ];
}

#[derive(Debug, Default, Clone)]
pub struct InvitationExecutor;

impl InvitationExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn invite(&self, client: &dyn ProviderClient, group: &Entity, entity: &Entity) -> Outcome {
        let mut last_error: Option<ProviderError> = None;

        for method in InviteMethod::CHAIN {
            let Some(result) = self.attempt(method, client, group, entity).await else {
                continue;
            };

            match result {
                Ok(()) => {
                    if method != InviteMethod::Direct {
                        tracing::debug!("➕ Added {} via {method:?}", entity.label());
                    }
                    return Outcome::Added;
                }
                Err(ProviderError::FloodWait { seconds }) => {
                    tracing::warn!("⏳ Flood wait {seconds}s while inviting {}", entity.label());
                    return Outcome::RateLimited(seconds);
                }
                Err(ProviderError::Unrecoverable(kind)) => {
                    tracing::debug!("⛔ {} cannot be added: {kind}", entity.label());
                    return Outcome::Failed(kind.to_string());
                }
                Err(e) => {
                    tracing::debug!("{method:?} failed for {}: {e}", entity.label());
                    last_error = Some(e);
                }
            }
        }

        Outcome::Failed(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no invitation method succeeded".into()),
        )
    }

    /// `None` when the method does not apply to this entity.
    async fn attempt(
        &self,
        method: InviteMethod,
        client: &dyn ProviderClient,
        group: &Entity,
        entity: &Entity,
    ) -> Option<ProviderResult<()>> {
        match method {
            InviteMethod::Direct => Some(client.invite_to_channel(group, entity).await),
            InviteMethod::Refreshed => {
                let username = entity.username.as_deref()?;
                Some(match client.resolve_username(username).await {
                    Ok(fresh) => client.invite_to_channel(group, &fresh).await,
                    Err(e) => Err(e),
                })
            }
            InviteMethod::AddChatUser => Some(client.add_chat_user(group, entity).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnrecoverableKind;
    use crate::testing::ScriptedClient;

    fn group() -> Entity {
        Entity::channel(-100, "Target")
    }

    #[tokio::test]
    async fn test_direct_success() {
        let client = ScriptedClient::new();
        let user = Entity::user(1);
        assert_eq!(InvitationExecutor::new().invite(&client, &group(), &user).await, Outcome::Added);
        assert_eq!(client.invited(), vec![1]);
    }

    #[tokio::test]
    async fn test_unrecoverable_stops_chain() {
        let client = ScriptedClient::new();
        client.fail_invites(1, ProviderError::Unrecoverable(UnrecoverableKind::PrivacyRestricted));
        let user = Entity::user(1).with_username("private_person");
        let outcome = InvitationExecutor::new().invite(&client, &group(), &user).await;
        assert_eq!(outcome, Outcome::Failed("privacy restricted".into()));
        assert_eq!(client.invite_attempts(), vec![1]);
    }

    #[tokio::test]
    async fn test_flood_wait_surfaces() {
        let client = ScriptedClient::new();
        client.fail_invites(1, ProviderError::FloodWait { seconds: 42 });
        let outcome = InvitationExecutor::new().invite(&client, &group(), &Entity::user(1)).await;
        assert_eq!(outcome, Outcome::RateLimited(42));
    }

    #[tokio::test]
    async fn test_refreshed_after_stale_entity() {
        let client = ScriptedClient::new();
        client.add_username(Entity::user(1).with_username("eve_e").with_access_hash(2));
        client.fail_invite_once(1, ProviderError::Transient("400: CHANNEL_INVALID".into()));
        let stale = Entity::user(1).with_username("eve_e").with_access_hash(1);
        let outcome = InvitationExecutor::new().invite(&client, &group(), &stale).await;
        assert_eq!(outcome, Outcome::Added);
        assert_eq!(client.invite_attempts(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_add_chat_user_fallback() {
        let client = ScriptedClient::new();
        client.fail_direct(1, ProviderError::Transient("400: PEER_ID_INVALID".into()));
        let outcome = InvitationExecutor::new()
            .invite(&client, &Entity::group(-5, "Basic"), &Entity::user(1))
            .await;
        assert_eq!(outcome, Outcome::Added);
        assert!(client.calls().contains(&"add_chat_user".to_string()));
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_error() {
        let client = ScriptedClient::new();
        client.fail_invites(1, ProviderError::Transient("500: INTERNAL".into()));
        let outcome = InvitationExecutor::new().invite(&client, &group(), &Entity::user(1)).await;
        assert_eq!(outcome, Outcome::Failed("500: INTERNAL".into()));
        // No username, so the refreshed method is skipped.
        assert_eq!(client.invite_attempts(), vec![1, 1]);
    }
}
