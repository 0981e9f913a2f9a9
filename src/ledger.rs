//! Credit ledger boundary.
//!
//! The ledger maps user ids to prepaid credits (1 credit = 1 minute of
//! transcription). The pipeline consults it before a live session starts and
//! decrements it once at settlement. The decrement is atomic and clamped at
//! zero at the trait boundary, so concurrent sessions for one user can never
//! drive the balance negative or lose an update through read-modify-write.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Interface to the credit store
pub trait CreditLedger: Send + Sync {
    /// Credits remaining for a user. [`Error::CreditLookup`] when unknown.
    fn get_credits(&self, user_id: &str) -> Result<u64>;

    /// Atomically subtract `amount`, clamping at zero. Returns the new balance.
    fn decrement_credits(&self, user_id: &str, amount: u64) -> Result<u64>;

    /// Record consumed minutes. Fire-and-forget: failures are logged, never
    /// propagated.
    fn record_usage(&self, user_id: &str, minutes: u64, description: &str);
}

/// A usage-log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: String,
    pub minutes: u64,
    pub description: String,
}

/// In-memory ledger for the server binary and tests
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<String, u64>>,
    usage: Mutex<Vec<UsageRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            usage: Mutex::new(Vec::new()),
        }
    }

    /// Seed from a user-id -> credits map
    pub fn with_accounts(accounts: HashMap<String, u64>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
            usage: Mutex::new(Vec::new()),
        }
    }

    pub fn set_credits(&self, user_id: &str, credits: u64) {
        self.accounts
            .lock()
            .unwrap()
            .insert(user_id.to_string(), credits);
    }

    /// Snapshot of recorded usage, mostly for tests and the stats endpoint
    pub fn usage_log(&self) -> Vec<UsageRecord> {
        self.usage.lock().unwrap().clone()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl CreditLedger for InMemoryLedger {
    fn get_credits(&self, user_id: &str) -> Result<u64> {
        self.accounts
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .ok_or_else(|| Error::CreditLookup(format!("unknown user: {}", user_id)))
    }

    fn decrement_credits(&self, user_id: &str, amount: u64) -> Result<u64> {
        let mut accounts = self.accounts.lock().unwrap();
        let balance = accounts
            .get_mut(user_id)
            .ok_or_else(|| Error::CreditLookup(format!("unknown user: {}", user_id)))?;
        *balance = balance.saturating_sub(amount);
        Ok(*balance)
    }

    fn record_usage(&self, user_id: &str, minutes: u64, description: &str) {
        self.usage.lock().unwrap().push(UsageRecord {
            user_id: user_id.to_string(),
            minutes,
            description: description.to_string(),
        });
    }
}
