//! # MemberFlow Core
//!
//! Shared building blocks for the MemberFlow workspace:
//! - `error`: the workspace error type and `Result` alias
//! - `config`: TOML configuration with serde defaults
//! - `types`: provider accounts
//! - `traits`: store seams consumed by the engine

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::MemberFlowConfig;
pub use error::{MemberFlowError, Result};
pub use traits::AccountStore;
pub use types::Account;
