//! Provider entities: resolved, addressable handles used in API calls.
//! Never persisted: an Entity lives for one resolution + invitation attempt.

use serde::{Deserialize, Serialize};

/// What kind of peer an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Group,
    Channel,
}

/// A resolved provider entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    #[serde(default)]
    pub access_hash: Option<i64>,
    pub kind: EntityKind,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Display name for users, title for groups and channels.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl Entity {
    pub fn user(id: i64) -> Self {
        Self {
            id,
            access_hash: None,
            kind: EntityKind::User,
            username: None,
            phone: None,
            title: None,
            is_bot: false,
        }
    }

    pub fn channel(id: i64, title: &str) -> Self {
        Self {
            kind: EntityKind::Channel,
            title: Some(title.to_string()),
            ..Self::user(id)
        }
    }

    pub fn group(id: i64, title: &str) -> Self {
        Self {
            kind: EntityKind::Group,
            title: Some(title.to_string()),
            ..Self::user(id)
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.trim_start_matches('@').to_string());
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn with_access_hash(mut self, hash: i64) -> Self {
        self.access_hash = Some(hash);
        self
    }

    /// Case-insensitive username match; `handle` may carry a leading `@`.
    pub fn has_username(&self, handle: &str) -> bool {
        let handle = handle.trim_start_matches('@');
        self.username
            .as_deref()
            .is_some_and(|u| u.eq_ignore_ascii_case(handle))
    }

    /// Phone match on digits only (`+1 555-0100` == `15550100`).
    pub fn has_phone(&self, digits: &str) -> bool {
        self.phone.as_deref().is_some_and(|p| {
            let own: String = p.chars().filter(|c| c.is_ascii_digit()).collect();
            !own.is_empty() && own == digits
        })
    }

    /// Groups and channels can hold participants.
    pub fn is_container(&self) -> bool {
        matches!(self.kind, EntityKind::Group | EntityKind::Channel)
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match (&self.username, &self.title) {
            (Some(u), _) => format!("@{u}"),
            (None, Some(t)) => format!("{t} ({})", self.id),
            (None, None) => self.id.to_string(),
        }
    }
}

/// An entry of the account's conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialog {
    pub entity: Entity,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub participants_count: u32,
}

impl Dialog {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            is_admin: false,
            participants_count: 0,
        }
    }
}

/// Call shapes for looking up a raw numeric id. Providers accept a bare id
/// for some peers and require a wrapped user or peer reference for others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdShape {
    Bare,
    User,
    Peer,
}

impl IdShape {
    pub const ALL: [IdShape; 3] = [IdShape::Bare, IdShape::User, IdShape::Peer];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_match_ignores_case_and_at() {
        let e = Entity::user(1).with_username("@Alice_01");
        assert_eq!(e.username.as_deref(), Some("Alice_01"));
        assert!(e.has_username("alice_01"));
        assert!(e.has_username("@ALICE_01"));
        assert!(!e.has_username("alice"));
    }

    #[test]
    fn test_phone_match_on_digits() {
        let e = Entity::user(1).with_phone("+1 555-0100");
        assert!(e.has_phone("15550100"));
        assert!(!e.has_phone("5550100"));
        assert!(!Entity::user(2).has_phone("15550100"));
    }

    #[test]
    fn test_entity_wire_shape() {
        let e: Entity = serde_json::from_str(r#"{"id": 42, "kind": "channel", "title": "News"}"#).unwrap();
        assert_eq!(e.kind, EntityKind::Channel);
        assert!(e.is_container());
        assert_eq!(e.label(), "News (42)");
    }
}
