//! Provider error classification.
//!
//! Providers report failures as an error code plus an upper-case error tag
//! (`FLOOD_WAIT_35`, `USER_PRIVACY_RESTRICTED`, ...). The tag decides the
//! class; message text beyond the tag is never inspected.

use memberflow_core::MemberFlowError;
use thiserror::Error;

/// RPC code providers use for every flood signal.
pub const FLOOD_CODE: i32 = 420;

/// Wait assumed when a flood signal carries no duration.
pub const DEFAULT_FLOOD_WAIT_SECS: u64 = 60;

/// Reasons that make retrying an invitation pointless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnrecoverableKind {
    PrivacyRestricted,
    Blocked,
    Deactivated,
    Bot,
    TooManyChannels,
}

impl std::fmt::Display for UnrecoverableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnrecoverableKind::PrivacyRestricted => write!(f, "privacy restricted"),
            UnrecoverableKind::Blocked => write!(f, "blocked"),
            UnrecoverableKind::Deactivated => write!(f, "account deactivated"),
            UnrecoverableKind::Bot => write!(f, "is a bot"),
            UnrecoverableKind::TooManyChannels => write!(f, "member of too many channels"),
        }
    }
}

/// A classified provider failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Provider demands a wait before the next call.
    #[error("rate limited, wait {seconds}s")]
    FloodWait { seconds: u64 },

    #[error("unrecoverable: {0}")]
    Unrecoverable(UnrecoverableKind),

    /// Anything else: network trouble, unknown RPC errors, lookups that missed.
    #[error("{0}")]
    Transient(String),
}

impl ProviderError {
    /// Classify an RPC error by code and tag.
    pub fn from_rpc(code: i32, tag: &str) -> Self {
        let tag = tag.trim().to_ascii_uppercase();

        for prefix in ["FLOOD_WAIT_", "FLOOD_PREMIUM_WAIT_", "SLOWMODE_WAIT_"] {
            if let Some(secs) = tag.strip_prefix(prefix).and_then(|s| s.parse::<u64>().ok()) {
                return ProviderError::FloodWait { seconds: secs };
            }
        }

        let kind = match tag.as_str() {
            "USER_PRIVACY_RESTRICTED" | "USER_NOT_MUTUAL_CONTACT" => {
                Some(UnrecoverableKind::PrivacyRestricted)
            }
            "USER_BLOCKED" | "YOU_BLOCKED_USER" | "USER_KICKED" | "USER_BANNED_IN_CHANNEL" => {
                Some(UnrecoverableKind::Blocked)
            }
            "USER_DEACTIVATED" | "USER_DEACTIVATED_BAN" | "INPUT_USER_DEACTIVATED" => {
                Some(UnrecoverableKind::Deactivated)
            }
            "USER_BOT" | "BOT_GROUPS_BLOCKED" => Some(UnrecoverableKind::Bot),
            "USER_CHANNELS_TOO_MUCH" => Some(UnrecoverableKind::TooManyChannels),
            _ => None,
        };

        let bare_flood = matches!(tag.as_str(), "FLOOD_WAIT" | "FLOOD_PREMIUM_WAIT" | "SLOWMODE_WAIT");
        match kind {
            Some(kind) => ProviderError::Unrecoverable(kind),
            None if code == FLOOD_CODE || bare_flood => ProviderError::FloodWait {
                seconds: DEFAULT_FLOOD_WAIT_SECS,
            },
            None if tag.is_empty() => ProviderError::Transient(format!("RPC error {code}")),
            None => ProviderError::Transient(format!("{code}: {tag}")),
        }
    }

    pub fn is_flood_wait(&self) -> bool {
        matches!(self, ProviderError::FloodWait { .. })
    }
}

impl From<ProviderError> for MemberFlowError {
    fn from(e: ProviderError) -> Self {
        MemberFlowError::Gateway(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flood_wait_tags() {
        assert_eq!(
            ProviderError::from_rpc(420, "FLOOD_WAIT_35"),
            ProviderError::FloodWait { seconds: 35 }
        );
        assert_eq!(
            ProviderError::from_rpc(420, "slowmode_wait_10"),
            ProviderError::FloodWait { seconds: 10 }
        );
        assert_eq!(
            ProviderError::from_rpc(420, "FLOOD_PREMIUM_WAIT_3"),
            ProviderError::FloodWait { seconds: 3 }
        );
    }

    #[test]
    fn test_flood_without_duration_uses_default() {
        let default = ProviderError::FloodWait { seconds: DEFAULT_FLOOD_WAIT_SECS };
        assert_eq!(ProviderError::from_rpc(420, "FLOOD_WAIT"), default);
        assert_eq!(ProviderError::from_rpc(420, ""), default);
        assert_eq!(ProviderError::from_rpc(420, "FLOOD_WAIT_X"), default);
        assert_eq!(ProviderError::from_rpc(400, "SLOWMODE_WAIT"), default);
        // An explicit duration still wins over the default.
        assert_eq!(
            ProviderError::from_rpc(420, "FLOOD_WAIT_7"),
            ProviderError::FloodWait { seconds: 7 }
        );
    }

    #[test]
    fn test_unrecoverable_tags() {
        assert_eq!(
            ProviderError::from_rpc(403, "USER_PRIVACY_RESTRICTED"),
            ProviderError::Unrecoverable(UnrecoverableKind::PrivacyRestricted)
        );
        assert_eq!(
            ProviderError::from_rpc(400, "USER_BOT"),
            ProviderError::Unrecoverable(UnrecoverableKind::Bot)
        );
        assert_eq!(
            ProviderError::from_rpc(400, "USER_DEACTIVATED"),
            ProviderError::Unrecoverable(UnrecoverableKind::Deactivated)
        );
        assert_eq!(
            ProviderError::from_rpc(400, "YOU_BLOCKED_USER"),
            ProviderError::Unrecoverable(UnrecoverableKind::Blocked)
        );
    }

    #[test]
    fn test_free_text_does_not_classify() {
        // A description merely mentioning a flood is not a flood signal.
        let err = ProviderError::from_rpc(400, "PEER_ID_INVALID");
        assert!(matches!(err, ProviderError::Transient(_)));
        let err = ProviderError::from_rpc(500, "something about FLOOD_WAIT");
        assert!(!err.is_flood_wait());
    }

    #[test]
    fn test_into_workspace_error() {
        let err: MemberFlowError = ProviderError::FloodWait { seconds: 5 }.into();
        assert!(matches!(err, MemberFlowError::Gateway(_)));
    }
}
