//! Store seams shared across crates.

use crate::error::Result;
use crate::types::Account;

/// Account records, consumed by the job engine to connect clients.
pub trait AccountStore: Send + Sync {
    fn save_account(&self, account: &Account) -> Result<()>;
    fn get_account(&self, id: &str) -> Result<Option<Account>>;
    /// Mark the account inactive and clear its session.
    fn deactivate_account(&self, id: &str) -> Result<()>;
}
