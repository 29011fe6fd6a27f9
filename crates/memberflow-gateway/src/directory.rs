//! Directory helpers: what an account can reach before a job is created.

use std::time::Duration;

use serde::Serialize;

use crate::client::{ProviderClient, ProviderResult};
use crate::entity::Entity;
use crate::error::ProviderError;
use crate::resolver::EntityResolver;

/// Identifiers of the account's contacts, usable as a member list.
///
/// A flood wait up to `ceiling` is waited out and the listing retried once.
pub async fn accessible_contacts(client: &dyn ProviderClient, ceiling: Duration) -> ProviderResult<Vec<String>> {
    let contacts = match client.list_contacts().await {
        Ok(contacts) => contacts,
        Err(ProviderError::FloodWait { seconds }) if Duration::from_secs(seconds) <= ceiling => {
            tracing::warn!("⏳ Contact listing rate limited, waiting {seconds}s");
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            client.list_contacts().await?
        }
        Err(e) => return Err(e),
    };

    Ok(contacts
        .iter()
        .filter(|c| !c.is_bot)
        .map(contact_identifier)
        .collect())
}

fn contact_identifier(entity: &Entity) -> String {
    match &entity.username {
        Some(u) => format!("@{u}"),
        None => entity.id.to_string(),
    }
}

/// Which identifiers of a list resolve for this account.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub total: usize,
    pub accessible: Vec<String>,
    pub inaccessible: Vec<String>,
}

impl ValidationReport {
    /// Accessible share, rounded to a whole percent.
    pub fn success_rate(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.accessible.len() as f64 / self.total as f64) * 100.0).round() as u32
    }
}

pub async fn validate_identifiers(
    resolver: &EntityResolver,
    client: &dyn ProviderClient,
    identifiers: &[String],
) -> ValidationReport {
    let mut report = ValidationReport {
        total: identifiers.len(),
        ..ValidationReport::default()
    };
    for id in identifiers {
        match resolver.resolve(client, id).await {
            Some(_) => report.accessible.push(id.clone()),
            None => report.inaccessible.push(id.clone()),
        }
    }
    tracing::info!(
        "✅ {} of {} identifiers accessible",
        report.accessible.len(),
        report.total
    );
    report
}

/// A group or channel the account administers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminChannel {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    pub participants_count: u32,
}

pub async fn admin_channels(client: &dyn ProviderClient, limit: usize) -> ProviderResult<Vec<AdminChannel>> {
    let dialogs = client.list_dialogs(limit).await?;
    Ok(dialogs
        .into_iter()
        .filter(|d| d.is_admin && d.entity.is_container())
        .map(|d| AdminChannel {
            id: d.entity.id,
            title: d.entity.title.clone().unwrap_or_else(|| "Unknown Channel".into()),
            username: d.entity.username.clone(),
            participants_count: d.participants_count,
        })
        .collect())
}
