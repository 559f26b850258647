use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::credit_types::CreditType,
    infra::db::postgres::schema::credit_balances,
};

/// One row per `(user, credit type)`. `balance == total - used` always holds.
#[derive(Debug, Clone, PartialEq, Selectable, Queryable)]
#[diesel(table_name = credit_balances)]
pub struct CreditBalanceEntity {
    pub user_id: Uuid,
    pub credit_type: String,
    pub balance: i32,
    pub used: i32,
    pub total: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CreditBalanceEntity {
    pub fn empty(user_id: Uuid, credit_type: CreditType) -> Self {
        Self {
            user_id,
            credit_type: credit_type.to_string(),
            balance: 0,
            used: 0,
            total: 0,
            expires_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn credit_type(&self) -> Option<CreditType> {
        CreditType::from_str(&self.credit_type)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Credits that can still be spent. Expired balances are not spendable.
    pub fn available_at(&self, now: DateTime<Utc>) -> i32 {
        if self.is_expired_at(now) {
            0
        } else {
            self.balance
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = credit_balances)]
pub struct InsertCreditBalanceEntity {
    pub user_id: Uuid,
    pub credit_type: String,
    pub balance: i32,
    pub used: i32,
    pub total: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CreditBalanceEntity {
    /// Expiry of the row after a top-up. A single row carries one expiry, so the
    /// later of the two wins and a non-expiring grant makes the row non-expiring.
    /// Credits that had already expired do not extend anything.
    pub fn merged_expiry(
        &self,
        incoming: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if self.is_expired_at(now) || self.balance == 0 {
            return incoming;
        }

        match (self.expires_at, incoming) {
            (None, _) | (_, None) => None,
            (Some(current), Some(incoming)) => Some(current.max(incoming)),
        }
    }

    /// `(total, balance)` once expired credits are dropped and `amount` is added.
    /// `None` when a counter would overflow.
    pub fn after_credit(&self, amount: i32, forfeited: i32) -> Option<(i32, i32)> {
        let total = self.total.checked_sub(forfeited)?.checked_add(amount)?;
        let balance = self.balance.checked_sub(forfeited)?.checked_add(amount)?;
        Some((total, balance))
    }

    /// Unspent credits lost to expiry when the row is topped up again.
    pub fn forfeited_at(&self, now: DateTime<Utc>) -> i32 {
        if self.is_expired_at(now) {
            self.balance
        } else {
            0
        }
    }
}
