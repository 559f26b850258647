use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::credit_transactions;

pub const KIND_DEBIT: &str = "debit";
pub const KIND_CREDIT: &str = "credit";
pub const KIND_EXPIRE: &str = "expire";

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = credit_transactions)]
pub struct CreditTransactionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credit_type: String,
    pub kind: String,
    pub amount: i32,
    pub balance_after: i32,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = credit_transactions)]
pub struct InsertCreditTransactionEntity {
    pub user_id: Uuid,
    pub credit_type: String,
    pub kind: String,
    pub amount: i32,
    pub balance_after: i32,
    pub reference_id: Option<String>,
}
