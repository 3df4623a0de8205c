//! In-memory user ledger
//!
//! Owns user records and their credit balances. Every balance mutation
//! goes through a per-user mutex, so debits, credits and refunds for the
//! same user are linearized while different users never contend beyond
//! the brief map lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Credits granted to every new account
pub const SIGNUP_CREDITS: u64 = 1;

/// Opaque user identifier, doubling as the bearer token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Mint a fresh identifier (UUID v4, 122 random bits)
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Snapshot of a user record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub credits: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Account {
    credits: Mutex<u64>,
    created_at: DateTime<Utc>,
}

impl Account {
    fn balance(&self) -> std::sync::MutexGuard<'_, u64> {
        self.credits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// User ledger
#[derive(Debug, Default)]
pub struct UserLedger {
    accounts: RwLock<HashMap<UserId, Arc<Account>>>,
}

impl UserLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user with the signup balance
    pub fn create_user(&self) -> User {
        let account = Arc::new(Account {
            credits: Mutex::new(SIGNUP_CREDITS),
            created_at: Utc::now(),
        });

        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let mut id = UserId::generate();
        while accounts.contains_key(&id) {
            id = UserId::generate();
        }
        accounts.insert(id.clone(), Arc::clone(&account));
        drop(accounts);

        tracing::info!(user_id = %id, credits = SIGNUP_CREDITS, "user created");

        User {
            id,
            credits: SIGNUP_CREDITS,
            created_at: account.created_at,
        }
    }

    /// Look up a user
    ///
    /// # Errors
    ///
    /// Returns `UnknownUser` if the identifier was never issued
    pub fn get_user(&self, id: &UserId) -> Result<User> {
        let account = self.account(id)?;
        let credits = *account.balance();
        Ok(User {
            id: id.clone(),
            credits,
            created_at: account.created_at,
        })
    }

    /// Atomically take `amount` credits, returning the new balance
    ///
    /// # Errors
    ///
    /// Returns `UnknownUser`, `InvalidAmount` for zero, or
    /// `InsufficientCredit` when the balance is below `amount`
    pub fn debit(&self, id: &UserId, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let account = self.account(id)?;
        let mut balance = account.balance();
        if *balance < amount {
            return Err(Error::InsufficientCredit {
                balance: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        let remaining = *balance;
        drop(balance);

        tracing::debug!(user_id = %id, amount, remaining, "credits debited");
        Ok(remaining)
    }

    /// Atomically add `amount` credits, returning the new balance
    ///
    /// Used both for refunds after a failed metered call and for
    /// payment grants.
    ///
    /// # Errors
    ///
    /// Returns `UnknownUser`, `InvalidAmount` for zero, or
    /// `BalanceOverflow` if the new balance would not fit in a `u64`
    pub fn credit(&self, id: &UserId, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let account = self.account(id)?;
        let mut balance = account.balance();
        let total = balance.checked_add(amount).ok_or(Error::BalanceOverflow {
            balance: *balance,
            amount,
        })?;
        *balance = total;
        drop(balance);

        tracing::debug!(user_id = %id, amount, total, "credits added");
        Ok(total)
    }

    /// Number of accounts
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn account(&self, id: &UserId) -> Result<Arc<Account>> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownUser(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_starts_with_one_credit() {
        let ledger = UserLedger::new();
        let user = ledger.create_user();

        assert_eq!(user.credits, 1);
        assert_eq!(ledger.get_user(&user.id).unwrap().credits, 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn user_ids_are_unique_uuids() {
        let ledger = UserLedger::new();
        let a = ledger.create_user();
        let b = ledger.create_user();

        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(a.id.as_str()).is_ok());
    }

    #[test]
    fn unknown_user_is_not_found() {
        let ledger = UserLedger::new();
        let err = ledger.get_user(&UserId::from("nope")).unwrap_err();
        assert!(matches!(err, Error::UnknownUser(_)));
    }

    #[test]
    fn debit_refuses_to_go_negative() {
        let ledger = UserLedger::new();
        let user = ledger.create_user();

        assert_eq!(ledger.debit(&user.id, 1).unwrap(), 0);
        let err = ledger.debit(&user.id, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientCredit {
                balance: 0,
                requested: 1
            }
        ));
        assert_eq!(ledger.get_user(&user.id).unwrap().credits, 0);
    }

    #[test]
    fn credit_requires_known_user_and_positive_amount() {
        let ledger = UserLedger::new();
        let user = ledger.create_user();

        assert_eq!(ledger.credit(&user.id, 1000).unwrap(), 1001);
        assert!(matches!(
            ledger.credit(&user.id, 0),
            Err(Error::InvalidAmount(0))
        ));
        assert!(matches!(
            ledger.credit(&UserId::from("ghost"), 5),
            Err(Error::UnknownUser(_))
        ));
    }

    #[test]
    fn credit_overflow_is_an_error_and_leaves_balance() {
        let ledger = UserLedger::new();
        let user = ledger.create_user();
        ledger.credit(&user.id, u64::MAX - 1).unwrap();

        let err = ledger.credit(&user.id, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::BalanceOverflow {
                balance: u64::MAX,
                amount: 2
            }
        ));
        assert_eq!(ledger.get_user(&user.id).unwrap().credits, u64::MAX);
    }

    #[test]
    fn concurrent_debits_never_overspend() {
        let ledger = Arc::new(UserLedger::new());
        let user = ledger.create_user();
        ledger.credit(&user.id, 9).unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let id = user.id.clone();
                std::thread::spawn(move || ledger.debit(&id, 1).is_ok())
            })
            .collect();

        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 10);
        assert_eq!(ledger.get_user(&user.id).unwrap().credits, 0);
    }
}
