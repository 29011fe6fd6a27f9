//! Entity Resolver: raw identifier → provider entity.
//!
//! Resolution is an ordered fallback chain: each strategy is tried in turn,
//! swallows its own errors and either produces an entity or hands over to the
//! next one. A miss across the whole chain is a normal outcome (`None`).

use std::time::Duration;

use memberflow_core::config::ResolverConfig;

use crate::client::{ProviderClient, ProviderResult};
use crate::entity::{Entity, IdShape};

/// A parsed target identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Provider-native numeric id.
    Numeric(i64),
    /// Username without the leading `@`.
    Handle(String),
}

impl Identifier {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.chars().all(|c| c.is_ascii_digit()) {
            return raw.parse().ok().map(Identifier::Numeric);
        }
        let handle = raw.trim_start_matches('@');
        if handle.is_empty() {
            return None;
        }
        Some(Identifier::Handle(handle.to_string()))
    }

    /// Does `entity` answer to this identifier (id, username or phone)?
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Identifier::Numeric(id) => entity.id == *id || entity.has_phone(&id.to_string()),
            Identifier::Handle(handle) => entity.has_username(handle),
        }
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Numeric(id) => write!(f, "{id}"),
            Identifier::Handle(handle) => write!(f, "@{handle}"),
        }
    }
}

/// One link of the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectHandle,
    Contacts,
    RecentDialogs,
    NumericVariants,
    GroupParticipants,
}

impl Strategy {
    pub const CHAIN: [Strategy; 5] = [
        Strategy::DirectHandle,
        Strategy::Contacts,
        Strategy::RecentDialogs,
        Strategy::NumericVariants,
        Strategy::GroupParticipants,
    ];

    pub fn applies_to(&self, identifier: &Identifier) -> bool {
        match self {
            Strategy::DirectHandle => matches!(identifier, Identifier::Handle(_)),
            Strategy::NumericVariants => matches!(identifier, Identifier::Numeric(_)),
            _ => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DirectHandle => "direct_handle",
            Strategy::Contacts => "contacts",
            Strategy::RecentDialogs => "recent_dialogs",
            Strategy::NumericVariants => "numeric_variants",
            Strategy::GroupParticipants => "group_participants",
        }
    }
}

pub struct EntityResolver {
    config: ResolverConfig,
}

impl EntityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolve `raw` through the fallback chain. `None` means unresolvable.
    pub async fn resolve(&self, client: &dyn ProviderClient, raw: &str) -> Option<Entity> {
        let identifier = Identifier::parse(raw)?;
        let delay = Duration::from_millis(self.config.strategy_delay_ms);
        let mut first = true;

        for strategy in Strategy::CHAIN {
            if !strategy.applies_to(&identifier) {
                continue;
            }
            if !first && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            first = false;

            match self.attempt(strategy, client, &identifier).await {
                Ok(Some(entity)) => {
                    tracing::debug!("🔎 Resolved {identifier} via {}", strategy.name());
                    return Some(entity);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("Strategy {} failed for {identifier}: {e}", strategy.name());
                }
            }
        }

        tracing::debug!("❓ Could not resolve {identifier}");
        None
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        client: &dyn ProviderClient,
        identifier: &Identifier,
    ) -> ProviderResult<Option<Entity>> {
        match strategy {
            Strategy::DirectHandle => match identifier {
                Identifier::Handle(handle) => client.resolve_username(handle).await.map(Some),
                Identifier::Numeric(_) => Ok(None),
            },
            Strategy::Contacts => {
                let contacts = client.list_contacts().await?;
                Ok(contacts.into_iter().find(|c| identifier.matches(c)))
            }
            Strategy::RecentDialogs => {
                let dialogs = client.list_dialogs(self.config.dialog_limit).await?;
                Ok(dialogs
                    .into_iter()
                    .map(|d| d.entity)
                    .find(|e| identifier.matches(e)))
            }
            Strategy::NumericVariants => {
                let Identifier::Numeric(id) = identifier else {
                    return Ok(None);
                };
                for shape in IdShape::ALL {
                    match client.resolve_id(*id, shape).await {
                        Ok(entity) => return Ok(Some(entity)),
                        Err(e) => tracing::debug!("resolve_id({id}, {shape:?}) failed: {e}"),
                    }
                }
                Ok(None)
            }
            Strategy::GroupParticipants => {
                let dialogs = client.list_dialogs(self.config.dialog_limit).await?;
                let groups = dialogs
                    .into_iter()
                    .map(|d| d.entity)
                    .filter(Entity::is_container)
                    .take(self.config.group_scan_limit);

                for group in groups {
                    match client
                        .list_participants(&group, self.config.participants_per_group)
                        .await
                    {
                        Ok(members) => {
                            if let Some(found) = members.into_iter().find(|m| identifier.matches(m)) {
                                return Ok(Some(found));
                            }
                        }
                        Err(e) => tracing::debug!("Participants of {} unavailable: {e}", group.label()),
                    }
                }
                Ok(None)
            }
        }
    }
}
