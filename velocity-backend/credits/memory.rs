use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CreditError, CreditLedger};

/// Process-local ledger. Users appear with `initial_balance` on first use.
pub struct InMemoryCreditLedger {
    initial_balance: i64,
    balances: Mutex<HashMap<String, i64>>,
}

impl InMemoryCreditLedger {
    pub fn new(initial_balance: i64) -> Self {
        Self {
            initial_balance,
            balances: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CreditLedger for InMemoryCreditLedger {
    async fn reserve(&self, user_id: &str, amount: i64) -> Result<i64, CreditError> {
        if amount <= 0 {
            return Err(CreditError::InvalidAmount(amount));
        }
        let mut balances = self.balances.lock().await;
        let balance = balances
            .entry(user_id.to_string())
            .or_insert(self.initial_balance);
        if *balance < amount {
            return Err(CreditError::Insufficient {
                balance: *balance,
                required: amount,
            });
        }
        *balance -= amount;
        tracing::debug!(user_id = %user_id, amount, balance = *balance, "credits reserved");
        Ok(*balance)
    }

    async fn refund(&self, user_id: &str, amount: i64) -> Result<i64, CreditError> {
        if amount <= 0 {
            return Err(CreditError::InvalidAmount(amount));
        }
        let mut balances = self.balances.lock().await;
        let balance = balances
            .entry(user_id.to_string())
            .or_insert(self.initial_balance);
        *balance += amount;
        tracing::debug!(user_id = %user_id, amount, balance = *balance, "credits refunded");
        Ok(*balance)
    }

    async fn balance(&self, user_id: &str) -> i64 {
        self.balances
            .lock()
            .await
            .get(user_id)
            .copied()
            .unwrap_or(self.initial_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_user_starts_with_initial_balance() {
        let ledger = InMemoryCreditLedger::new(500);
        assert_eq!(ledger.balance("alice").await, 500);
    }

    #[tokio::test]
    async fn reserve_and_refund() {
        let ledger = InMemoryCreditLedger::new(500);
        assert_eq!(ledger.reserve("alice", 100).await.unwrap(), 400);
        assert_eq!(ledger.refund("alice", 100).await.unwrap(), 500);
        assert_eq!(ledger.balance("bob").await, 500);
    }

    #[tokio::test]
    async fn insufficient_reserve_leaves_balance_untouched() {
        let ledger = InMemoryCreditLedger::new(150);
        ledger.reserve("alice", 100).await.unwrap();

        let err = ledger.reserve("alice", 100).await.unwrap_err();
        assert_eq!(
            err,
            CreditError::Insufficient {
                balance: 50,
                required: 100
            }
        );
        assert_eq!(ledger.balance("alice").await, 50);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let ledger = InMemoryCreditLedger::new(500);
        assert!(ledger.reserve("alice", 0).await.is_err());
        assert!(ledger.refund("alice", -5).await.is_err());
    }
}
