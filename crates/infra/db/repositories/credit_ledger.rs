use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, RunQueryDsl, dsl::sum, insert_into, prelude::*, update};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{credit_balances, credit_transactions},
    },
};
use domain::{
    entities::{
        credit_balances::{CreditBalanceEntity, InsertCreditBalanceEntity},
        credit_transactions::{
            CreditTransactionEntity, InsertCreditTransactionEntity, KIND_CREDIT, KIND_DEBIT,
            KIND_EXPIRE,
        },
    },
    repositories::credit_ledger::CreditLedgerRepository,
    value_objects::{
        credits::{ConsumeOutcome, CreditOutcome},
        enums::credit_types::CreditType,
    },
};

pub struct CreditLedgerPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl CreditLedgerPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// Row lock on `(user_id, credit_type)`. Every mutation of a balance goes through it.
fn lock_balance(
    conn: &mut PgConnection,
    user_id: Uuid,
    credit_type: &str,
) -> QueryResult<Option<CreditBalanceEntity>> {
    credit_balances::table
        .filter(credit_balances::user_id.eq(user_id))
        .filter(credit_balances::credit_type.eq(credit_type))
        .select(CreditBalanceEntity::as_select())
        .for_update()
        .first::<CreditBalanceEntity>(conn)
        .optional()
}

fn reference_applied(
    conn: &mut PgConnection,
    user_id: Uuid,
    kind: &str,
    reference_id: Option<&str>,
) -> QueryResult<bool> {
    let Some(reference_id) = reference_id else {
        return Ok(false);
    };

    let existing = credit_transactions::table
        .filter(credit_transactions::user_id.eq(user_id))
        .filter(credit_transactions::kind.eq(kind))
        .filter(credit_transactions::reference_id.eq(reference_id))
        .select(credit_transactions::id)
        .first::<Uuid>(conn)
        .optional()?;

    Ok(existing.is_some())
}

fn record_transaction(
    conn: &mut PgConnection,
    transaction: InsertCreditTransactionEntity,
) -> QueryResult<()> {
    insert_into(credit_transactions::table)
        .values(&transaction)
        .execute(conn)?;
    Ok(())
}

#[async_trait]
impl CreditLedgerRepository for CreditLedgerPostgres {
    async fn list_balances(&self, user_id: Uuid) -> Result<Vec<CreditBalanceEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let balances = credit_balances::table
            .filter(credit_balances::user_id.eq(user_id))
            .order(credit_balances::credit_type.asc())
            .select(CreditBalanceEntity::as_select())
            .load::<CreditBalanceEntity>(&mut conn)?;

        Ok(balances)
    }

    async fn find_balance(
        &self,
        user_id: Uuid,
        credit_type: CreditType,
    ) -> Result<Option<CreditBalanceEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let balance = credit_balances::table
            .filter(credit_balances::user_id.eq(user_id))
            .filter(credit_balances::credit_type.eq(credit_type.to_string()))
            .select(CreditBalanceEntity::as_select())
            .first::<CreditBalanceEntity>(&mut conn)
            .optional()?;

        Ok(balance)
    }

    async fn consume(
        &self,
        user_id: Uuid,
        credit_type: CreditType,
        amount: i32,
        reference_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let credit_type = credit_type.to_string();

        let outcome = conn.transaction::<ConsumeOutcome, diesel::result::Error, _>(|conn| {
            let Some(row) = lock_balance(conn, user_id, &credit_type)? else {
                return Ok(ConsumeOutcome::Insufficient { available: 0 });
            };

            // Checked under the row lock so a retried request cannot slip past a
            // concurrent first attempt.
            if reference_applied(conn, user_id, KIND_DEBIT, reference_id.as_deref())? {
                return Ok(ConsumeOutcome::AlreadyConsumed {
                    balance: row.balance,
                });
            }

            let available = row.available_at(now);
            if available < amount {
                return Ok(ConsumeOutcome::Insufficient { available });
            }

            let balance = update(credit_balances::table)
                .filter(credit_balances::user_id.eq(user_id))
                .filter(credit_balances::credit_type.eq(&credit_type))
                .set((
                    credit_balances::balance.eq(credit_balances::balance - amount),
                    credit_balances::used.eq(credit_balances::used + amount),
                    credit_balances::updated_at.eq(now),
                ))
                .returning(credit_balances::balance)
                .get_result::<i32>(conn)?;

            record_transaction(
                conn,
                InsertCreditTransactionEntity {
                    user_id,
                    credit_type: credit_type.clone(),
                    kind: KIND_DEBIT.to_string(),
                    amount,
                    balance_after: balance,
                    reference_id: reference_id.clone(),
                },
            )?;

            Ok(ConsumeOutcome::Consumed { balance })
        })?;

        Ok(outcome)
    }

    async fn credit(
        &self,
        user_id: Uuid,
        credit_type: CreditType,
        amount: i32,
        expires_at: Option<DateTime<Utc>>,
        reference_id: Option<String>,
    ) -> Result<CreditOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();
        let credit_type = credit_type.to_string();

        let outcome = conn.transaction::<CreditOutcome, anyhow::Error, _>(|conn| {
            insert_into(credit_balances::table)
                .values(&InsertCreditBalanceEntity {
                    user_id,
                    credit_type: credit_type.clone(),
                    balance: 0,
                    used: 0,
                    total: 0,
                    expires_at: None,
                    updated_at: now,
                })
                .on_conflict((credit_balances::user_id, credit_balances::credit_type))
                .do_nothing()
                .execute(conn)?;

            let row = lock_balance(conn, user_id, &credit_type)?
                .ok_or(diesel::result::Error::NotFound)?;

            if reference_applied(conn, user_id, KIND_CREDIT, reference_id.as_deref())? {
                return Ok(CreditOutcome::AlreadyCredited {
                    balance: row.balance,
                });
            }

            let forfeited = row.forfeited_at(now);
            let (total, balance) = row.after_credit(amount, forfeited).ok_or_else(|| {
                anyhow::anyhow!("{credit_type} balance for user {user_id} would overflow")
            })?;

            if forfeited > 0 {
                record_transaction(
                    conn,
                    InsertCreditTransactionEntity {
                        user_id,
                        credit_type: credit_type.clone(),
                        kind: KIND_EXPIRE.to_string(),
                        amount: forfeited,
                        balance_after: 0,
                        reference_id: None,
                    },
                )?;
            }

            let merged_expiry = row.merged_expiry(expires_at, now);
            // The row is locked, so the values computed from it are current.
            let balance = update(credit_balances::table)
                .filter(credit_balances::user_id.eq(user_id))
                .filter(credit_balances::credit_type.eq(&credit_type))
                .set((
                    credit_balances::total.eq(total),
                    credit_balances::balance.eq(balance),
                    credit_balances::expires_at.eq(merged_expiry),
                    credit_balances::updated_at.eq(now),
                ))
                .returning(credit_balances::balance)
                .get_result::<i32>(conn)?;

            record_transaction(
                conn,
                InsertCreditTransactionEntity {
                    user_id,
                    credit_type: credit_type.clone(),
                    kind: KIND_CREDIT.to_string(),
                    amount,
                    balance_after: balance,
                    reference_id: reference_id.clone(),
                },
            )?;

            Ok(CreditOutcome::Credited { balance })
        })?;

        Ok(outcome)
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CreditTransactionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let transactions = credit_transactions::table
            .filter(credit_transactions::user_id.eq(user_id))
            .order(credit_transactions::created_at.desc())
            .limit(limit)
            .select(CreditTransactionEntity::as_select())
            .load::<CreditTransactionEntity>(&mut conn)?;

        Ok(transactions)
    }

    async fn usage_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<HashMap<CreditType, i32>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = credit_transactions::table
            .filter(credit_transactions::user_id.eq(user_id))
            .filter(credit_transactions::kind.eq(KIND_DEBIT))
            .filter(credit_transactions::created_at.ge(since))
            .group_by(credit_transactions::credit_type)
            .select((credit_transactions::credit_type, sum(credit_transactions::amount)))
            .load::<(String, Option<i64>)>(&mut conn)?;

        Ok(rows
            .into_iter()
            .filter_map(|(credit_type, used)| {
                let credit_type = CreditType::from_str(&credit_type)?;
                let used = i32::try_from(used.unwrap_or(0)).unwrap_or(i32::MAX);
                Some((credit_type, used))
            })
            .collect())
    }
}
