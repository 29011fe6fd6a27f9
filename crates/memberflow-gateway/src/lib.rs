//! # MemberFlow Gateway
//!
//! Everything that talks to the messaging provider.
//!
//! ## Architecture
//! ```text
//! ClientRegistry (one live client per account, per-account lock)
//!   └── ProviderClient (trait) ── BridgeClient (HTTP/JSON bridge)
//!
//! EntityResolver       raw identifier → Entity
//!   DirectHandle → Contacts → RecentDialogs → NumericVariants → GroupParticipants
//!
//! InvitationExecutor   Entity → Outcome
//!   Direct → Refreshed → AddChatUser
//! ```

pub mod bridge;
pub mod client;
pub mod directory;
pub mod entity;
pub mod error;
pub mod invite;
pub mod registry;
pub mod resolver;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::{BridgeClient, BridgeConnector};
pub use client::{Connector, ProviderClient, ProviderResult};
pub use entity::{Dialog, Entity, EntityKind, IdShape};
pub use error::{ProviderError, UnrecoverableKind};
pub use invite::{InvitationExecutor, Outcome};
pub use registry::{ClientLease, ClientRegistry};
pub use resolver::{EntityResolver, Identifier};
