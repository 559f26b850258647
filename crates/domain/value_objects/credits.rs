use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::{
        credit_balances::CreditBalanceEntity, credit_packages::CreditPackageEntity,
        credit_transactions::CreditTransactionEntity,
    },
    value_objects::{enums::credit_types::CreditType, payments::PaymentIntentDto},
};

/// Storage-level result of an atomic debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed { balance: i32 },
    /// The reference was already charged; nothing changed.
    AlreadyConsumed { balance: i32 },
    Insufficient { available: i32 },
}

/// Storage-level result of a credit grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited { balance: i32 },
    AlreadyCredited { balance: i32 },
}

impl CreditOutcome {
    pub fn balance(&self) -> i32 {
        match self {
            CreditOutcome::Credited { balance } | CreditOutcome::AlreadyCredited { balance } => {
                *balance
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalanceDto {
    pub credit_type: CreditType,
    pub balance: i32,
    pub used: i32,
    pub total: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

impl CreditBalanceDto {
    pub fn from_entity(credit_type: CreditType, entity: &CreditBalanceEntity, now: DateTime<Utc>) -> Self {
        Self {
            credit_type,
            balance: entity.balance,
            used: entity.used,
            total: entity.total,
            expires_at: entity.expires_at,
            expired: entity.is_expired_at(now),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub credit_type: Option<CreditType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesResponse {
    pub success: bool,
    pub balances: Vec<CreditBalanceDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeCreditsRequest {
    pub credit_type: CreditType,
    #[serde(default = "default_consume_amount")]
    pub amount: i32,
    #[serde(default)]
    pub reference_id: Option<String>,
}

fn default_consume_amount() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeCreditsResponse {
    pub success: bool,
    pub credit_type: CreditType,
    pub balance: i32,
    pub already_consumed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackageDto {
    pub id: Uuid,
    pub name: String,
    pub credit_type: CreditType,
    pub credit_amount: i32,
    pub bonus_credits: i32,
    pub price_minor: i32,
    pub currency: String,
    pub validity_days: Option<i32>,
}

impl CreditPackageDto {
    /// Packages with an unknown credit type are not offered.
    pub fn from_entity(entity: CreditPackageEntity) -> Option<Self> {
        let credit_type = entity.credit_type()?;
        Some(Self {
            id: entity.id,
            name: entity.name,
            credit_type,
            credit_amount: entity.credit_amount,
            bonus_credits: entity.bonus_credits,
            price_minor: entity.price_minor,
            currency: entity.currency,
            validity_days: entity.validity_days,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackagesResponse {
    pub success: bool,
    pub packages: Vec<CreditPackageDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseCreditsRequest {
    pub package_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseCreditsResponse {
    pub success: bool,
    pub payment_intent: PaymentIntentDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantCreditsRequest {
    pub user_id: Uuid,
    pub credit_type: CreditType,
    pub amount: i32,
    #[serde(default)]
    pub validity_days: Option<i32>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantCreditsResponse {
    pub success: bool,
    pub credit_type: CreditType,
    pub balance: i32,
    pub already_credited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransactionDto {
    pub id: Uuid,
    pub credit_type: String,
    pub kind: String,
    pub amount: i32,
    pub balance_after: i32,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CreditTransactionEntity> for CreditTransactionDto {
    fn from(value: CreditTransactionEntity) -> Self {
        Self {
            id: value.id,
            credit_type: value.credit_type,
            kind: value.kind,
            amount: value.amount,
            balance_after: value.balance_after,
            reference_id: value.reference_id,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub success: bool,
    pub transactions: Vec<CreditTransactionDto>,
}
