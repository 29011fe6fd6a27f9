//! Shared domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A connected provider account. Jobs run on behalf of exactly one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub phone: String,
    pub username: Option<String>,
    /// Opaque session handed to the gateway on connect.
    pub session: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: &str, phone: &str, session: &str) -> Self {
        Self {
            id: id.to_string(),
            phone: phone.to_string(),
            username: None,
            session: session.to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Short label for logs: `@username` when known, otherwise the phone.
    pub fn label(&self) -> String {
        match &self.username {
            Some(u) => format!("@{u}"),
            None => self.phone.clone(),
        }
    }
}
