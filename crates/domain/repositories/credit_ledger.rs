use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{
    entities::{
        credit_balances::CreditBalanceEntity, credit_transactions::CreditTransactionEntity,
    },
    value_objects::{
        credits::{ConsumeOutcome, CreditOutcome},
        enums::credit_types::CreditType,
    },
};

/// Per-user, per-type credit balances.
///
/// Implementations must make `consume` an atomic check-and-decrement: two
/// concurrent debits against the same row may never both observe the same
/// positive balance. A `reference_id` that was already applied for the same
/// user and direction turns the call into a no-op.
#[automock]
#[async_trait]
pub trait CreditLedgerRepository {
    async fn list_balances(&self, user_id: Uuid) -> Result<Vec<CreditBalanceEntity>>;

    async fn find_balance(
        &self,
        user_id: Uuid,
        credit_type: CreditType,
    ) -> Result<Option<CreditBalanceEntity>>;

    async fn consume(
        &self,
        user_id: Uuid,
        credit_type: CreditType,
        amount: i32,
        reference_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome>;

    async fn credit(
        &self,
        user_id: Uuid,
        credit_type: CreditType,
        amount: i32,
        expires_at: Option<DateTime<Utc>>,
        reference_id: Option<String>,
    ) -> Result<CreditOutcome>;

    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CreditTransactionEntity>>;

    /// Units debited per credit type at or after `since`. Types with no
    /// debits in the window are absent.
    async fn usage_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<HashMap<CreditType, i32>>;
}
