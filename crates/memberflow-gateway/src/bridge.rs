//! Provider bridge client: JSON over HTTP.
//!
//! The bridge is a sidecar that holds the provider protocol session. Every
//! method is `POST {base_url}/{method}` with the account session in the body;
//! every response uses the `{ok, result, error_code, description}` envelope.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use memberflow_core::Account;
use memberflow_core::config::GatewayConfig;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::client::{Connector, ProviderClient, ProviderResult};
use crate::entity::{Dialog, Entity, IdShape};
use crate::error::{FLOOD_CODE, ProviderError};

/// Bridge response envelope.
#[derive(Debug, Deserialize)]
pub struct BridgeResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub error_code: Option<i32>,
    pub description: Option<String>,
}

impl<T> BridgeResponse<T> {
    /// Unwrap the envelope, classifying provider errors.
    pub fn into_result(self, method: &str) -> ProviderResult<Option<T>> {
        if self.ok {
            return Ok(self.result);
        }
        let code = self.error_code.unwrap_or_default();
        match self.description {
            Some(tag) => Err(ProviderError::from_rpc(code, &tag)),
            None if code == FLOOD_CODE => Err(ProviderError::from_rpc(code, "")),
            None => Err(ProviderError::Transient(format!("{method} failed with code {code}"))),
        }
    }
}

/// HTTP client for one account's bridge session.
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
    session: String,
    api_id: String,
    api_hash: String,
    connected: AtomicBool,
}

impl BridgeClient {
    /// Fails when the HTTP client cannot be built with the configured timeout.
    pub fn new(config: &GatewayConfig, session: &str) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transient(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session: session.to_string(),
            api_id: config.api_id.clone(),
            api_hash: config.api_hash.clone(),
            connected: AtomicBool::new(false),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> ProviderResult<Option<T>> {
        let mut body = serde_json::json!({
            "session": self.session,
            "api_id": self.api_id,
            "api_hash": self.api_hash,
        });
        if let (Some(body), serde_json::Value::Object(params)) = (body.as_object_mut(), params) {
            body.extend(params);
        }

        let response = self
            .http
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    self.connected.store(false, Ordering::Relaxed);
                }
                ProviderError::Transient(format!("{method} failed: {e}"))
            })?;

        let envelope: BridgeResponse<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Invalid {method} response: {e}")))?;
        envelope.into_result(method)
    }

    async fn fetch<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> ProviderResult<T> {
        self.call(method, params)
            .await?
            .ok_or_else(|| ProviderError::Transient(format!("{method} returned no result")))
    }

    /// Open the bridge session.
    pub async fn connect(&self) -> ProviderResult<()> {
        self.call::<serde_json::Value>("connect", serde_json::json!({})).await?;
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl ProviderClient for BridgeClient {
    async fn resolve_username(&self, username: &str) -> ProviderResult<Entity> {
        let username = username.trim_start_matches('@');
        self.fetch("resolveUsername", serde_json::json!({ "username": username }))
            .await
    }

    async fn resolve_id(&self, id: i64, shape: IdShape) -> ProviderResult<Entity> {
        self.fetch("resolveId", serde_json::json!({ "id": id, "shape": shape }))
            .await
    }

    async fn resolve_group(&self, group_id: &str) -> ProviderResult<Entity> {
        self.fetch("resolveGroup", serde_json::json!({ "group": group_id }))
            .await
    }

    async fn list_contacts(&self) -> ProviderResult<Vec<Entity>> {
        self.fetch("getContacts", serde_json::json!({})).await
    }

    async fn list_dialogs(&self, limit: usize) -> ProviderResult<Vec<Dialog>> {
        self.fetch("getDialogs", serde_json::json!({ "limit": limit }))
            .await
    }

    async fn list_participants(&self, group: &Entity, limit: usize) -> ProviderResult<Vec<Entity>> {
        self.fetch(
            "getParticipants",
            serde_json::json!({ "group": group, "limit": limit }),
        )
        .await
    }

    async fn invite_to_channel(&self, group: &Entity, user: &Entity) -> ProviderResult<()> {
        self.call::<serde_json::Value>(
            "inviteToChannel",
            serde_json::json!({ "channel": group, "users": [user] }),
        )
        .await?;
        Ok(())
    }

    async fn add_chat_user(&self, group: &Entity, user: &Entity) -> ProviderResult<()> {
        self.call::<serde_json::Value>(
            "addChatUser",
            serde_json::json!({ "chat": group, "user": user }),
        )
        .await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn reconnect(&self) -> ProviderResult<()> {
        tracing::info!("🔌 Reconnecting bridge session at {}", self.base_url);
        self.connect().await
    }

    async fn disconnect(&self) {
        if let Err(e) = self
            .call::<serde_json::Value>("disconnect", serde_json::json!({}))
            .await
        {
            tracing::debug!("Bridge disconnect failed: {e}");
        }
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Connects accounts through the bridge described by [`GatewayConfig`].
pub struct BridgeConnector {
    config: GatewayConfig,
}

impl BridgeConnector {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for BridgeConnector {
    async fn connect(&self, account: &Account) -> ProviderResult<Arc<dyn ProviderClient>> {
        if account.session.is_empty() {
            return Err(ProviderError::Transient(format!(
                "account {} has no session",
                account.id
            )));
        }
        let client = BridgeClient::new(&self.config, &account.session)?;
        client.connect().await?;
        tracing::info!("✅ Connected account {} via {}", account.label(), self.config.base_url);
        Ok(Arc::new(client))
    }
}
