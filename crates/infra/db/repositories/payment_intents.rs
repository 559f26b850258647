use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::payment_intents},
};
use domain::{
    entities::payment_intents::{
        InsertPaymentIntentEntity, PaymentIntentEntity, UpdatePaymentIntentEntity,
    },
    repositories::payment_intents::PaymentIntentRepository,
    value_objects::enums::payment_statuses::PaymentStatus,
};

pub struct PaymentIntentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentIntentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentIntentRepository for PaymentIntentPostgres {
    async fn create_intent(&self, intent: InsertPaymentIntentEntity) -> Result<PaymentIntentEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let created = insert_into(payment_intents::table)
            .values(&intent)
            .returning(PaymentIntentEntity::as_select())
            .get_result::<PaymentIntentEntity>(&mut conn)?;

        Ok(created)
    }

    async fn find_by_id(&self, intent_id: Uuid) -> Result<Option<PaymentIntentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let intent = payment_intents::table
            .filter(payment_intents::id.eq(intent_id))
            .select(PaymentIntentEntity::as_select())
            .first::<PaymentIntentEntity>(&mut conn)
            .optional()?;

        Ok(intent)
    }

    async fn find_by_provider_intent_id(
        &self,
        provider_intent_id: &str,
    ) -> Result<Option<PaymentIntentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let intent = payment_intents::table
            .filter(payment_intents::provider_intent_id.eq(provider_intent_id))
            .select(PaymentIntentEntity::as_select())
            .first::<PaymentIntentEntity>(&mut conn)
            .optional()?;

        Ok(intent)
    }

    async fn update_intent(
        &self,
        intent_id: Uuid,
        expected: PaymentStatus,
        changes: UpdatePaymentIntentEntity,
    ) -> Result<Option<PaymentIntentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(payment_intents::table)
            .filter(payment_intents::id.eq(intent_id))
            .filter(payment_intents::status.eq(expected.as_str()))
            .set(&changes)
            .returning(PaymentIntentEntity::as_select())
            .get_result::<PaymentIntentEntity>(&mut conn)
            .optional()?;

        Ok(updated)
    }

    async fn mark_fulfilled(&self, intent_id: Uuid, fulfilled_at: DateTime<Utc>) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let affected = update(payment_intents::table)
            .filter(payment_intents::id.eq(intent_id))
            .filter(payment_intents::fulfilled_at.is_null())
            .set((
                payment_intents::fulfilled_at.eq(Some(fulfilled_at)),
                payment_intents::updated_at.eq(fulfilled_at),
            ))
            .execute(&mut conn)?;

        Ok(affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::value_objects::payments::PaymentTarget, infra::db::repositories::test_support,
    };

    async fn created_intent(repo: &PaymentIntentPostgres) -> PaymentIntentEntity {
        repo.create_intent(InsertPaymentIntentEntity::new(
            Uuid::new_v4(),
            &PaymentTarget::CreditPackage {
                package_id: Uuid::new_v4(),
            },
            49900,
            "PHP",
            Some(format!("pi_{}", Uuid::new_v4().simple())),
        ))
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires a migrated Postgres at DATABASE_URL
    async fn test_concurrent_fulfilment_is_claimed_once() {
        let Some(pool) = test_support::pool() else {
            return;
        };
        let repo = Arc::new(PaymentIntentPostgres::new(pool));
        let intent_id = created_intent(&repo).await.id;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.mark_fulfilled(intent_id, Utc::now()).await.unwrap() })
            })
            .collect();

        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                claimed += 1;
            }
        }

        assert_eq!(claimed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ignore] // Requires a migrated Postgres at DATABASE_URL
    async fn test_update_only_applies_while_status_matches() {
        let Some(pool) = test_support::pool() else {
            return;
        };
        let repo = PaymentIntentPostgres::new(pool);
        let intent = created_intent(&repo).await;

        let attached = repo
            .update_intent(
                intent.id,
                PaymentStatus::Created,
                UpdatePaymentIntentEntity::status(PaymentStatus::MethodAttached),
            )
            .await
            .unwrap();
        let stale = repo
            .update_intent(
                intent.id,
                PaymentStatus::Created,
                UpdatePaymentIntentEntity::status(PaymentStatus::Failed),
            )
            .await
            .unwrap();

        assert_eq!(attached.map(|i| i.status()), Some(PaymentStatus::MethodAttached));
        assert!(stale.is_none());
        let stored = repo.find_by_id(intent.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), PaymentStatus::MethodAttached);
    }
}
