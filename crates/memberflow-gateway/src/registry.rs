//! Client registry: one live provider client per account.
//!
//! Clients are created on first use, reused across jobs, reconnected when
//! they report a dropped connection and torn down on disconnect. Each account
//! slot carries its own async lock: jobs of the same account take turns on
//! the client, jobs of different accounts never wait on each other.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use memberflow_core::Account;
use tokio::sync::OwnedMutexGuard;

use crate::client::{Connector, ProviderClient, ProviderResult};

type Slot = Arc<tokio::sync::Mutex<Option<Arc<dyn ProviderClient>>>>;

/// Exclusive use of an account's client until dropped.
pub struct ClientLease {
    _guard: OwnedMutexGuard<Option<Arc<dyn ProviderClient>>>,
    client: Arc<dyn ProviderClient>,
}

impl Deref for ClientLease {
    type Target = dyn ProviderClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

pub struct ClientRegistry {
    connector: Arc<dyn Connector>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ClientRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, account_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    /// Lock the account's client, connecting or reconnecting as needed.
    pub async fn acquire(&self, account: &Account) -> ProviderResult<ClientLease> {
        let mut guard = self.slot(&account.id).lock_owned().await;

        let client = match guard.clone() {
            Some(client) if client.is_connected().await => client,
            Some(client) => {
                tracing::info!("🔄 Client for {} dropped, reconnecting", account.label());
                client.reconnect().await?;
                client
            }
            None => {
                let client = self.connector.connect(account).await?;
                tracing::debug!("Registered client for account {}", account.id);
                *guard = Some(client.clone());
                client
            }
        };

        Ok(ClientLease {
            _guard: guard,
            client,
        })
    }

    /// Tear down the account's client. Waits for the current lease holder.
    pub async fn disconnect(&self, account_id: &str) -> bool {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.remove(account_id)
        };
        let Some(slot) = slot else {
            return false;
        };
        let client = slot.lock().await.take();
        match client {
            Some(client) => {
                client.disconnect().await;
                tracing::info!("🔌 Disconnected client for account {account_id}");
                true
            }
            None => false,
        }
    }

    /// Accounts with a registry slot.
    pub fn accounts(&self) -> Vec<String> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = slots.keys().cloned().collect();
        ids.sort();
        ids
    }
}
