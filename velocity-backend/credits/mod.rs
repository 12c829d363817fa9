pub mod memory;

use async_trait::async_trait;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CreditError {
    #[error("insufficient credits: balance {balance}, required {required}")]
    Insufficient { balance: i64, required: i64 },

    #[error("invalid credit amount: {0}")]
    InvalidAmount(i64),
}

/// Per-user credit balance. Generation reserves up front and refunds when
/// the run fails.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Debit `amount`, or fail without changing the balance.
    async fn reserve(&self, user_id: &str, amount: i64) -> Result<i64, CreditError>;
    async fn refund(&self, user_id: &str, amount: i64) -> Result<i64, CreditError>;
    async fn balance(&self, user_id: &str) -> i64;
}
