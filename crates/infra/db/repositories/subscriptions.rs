use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};
use domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::enums::subscription_statuses::SubscriptionStatus,
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_active_subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .order(subscriptions::created_at.desc())
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(subscription)
    }

    async fn find_latest_subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.ne(SubscriptionStatus::Inactive.to_string()))
            .order(subscriptions::created_at.desc())
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(subscription)
    }

    async fn activate_subscription(
        &self,
        subscription: InsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        let activated = conn.transaction::<SubscriptionEntity, diesel::result::Error, _>(|conn| {
            // Serialise activations for the same user behind the current active row.
            let current_ids = subscriptions::table
                .filter(subscriptions::user_id.eq(subscription.user_id))
                .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
                .select(subscriptions::id)
                .for_update()
                .load::<Uuid>(conn)?;

            if let Some(payment_intent_id) = subscription.payment_intent_id {
                let existing = subscriptions::table
                    .filter(subscriptions::payment_intent_id.eq(payment_intent_id))
                    .select(SubscriptionEntity::as_select())
                    .first::<SubscriptionEntity>(conn)
                    .optional()?;

                if let Some(existing) = existing {
                    return Ok(existing);
                }
            }

            if !current_ids.is_empty() {
                update(subscriptions::table)
                    .filter(subscriptions::id.eq_any(current_ids))
                    .set((
                        subscriptions::status.eq(SubscriptionStatus::Inactive.to_string()),
                        subscriptions::updated_at.eq(now),
                    ))
                    .execute(conn)?;
            }

            let inserted = insert_into(subscriptions::table)
                .values(&subscription)
                .on_conflict(subscriptions::payment_intent_id)
                .do_nothing()
                .returning(SubscriptionEntity::as_select())
                .get_result::<SubscriptionEntity>(conn)
                .optional()?;

            match inserted {
                Some(row) => Ok(row),
                None => subscriptions::table
                    .filter(subscriptions::payment_intent_id.eq(subscription.payment_intent_id))
                    .select(SubscriptionEntity::as_select())
                    .first::<SubscriptionEntity>(conn),
            }
        })?;

        Ok(activated)
    }

    async fn cancel_active_subscription(
        &self,
        user_id: Uuid,
        canceled_at: DateTime<Utc>,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let canceled = update(subscriptions::table)
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Canceled.to_string()),
                subscriptions::canceled_at.eq(Some(canceled_at)),
                subscriptions::updated_at.eq(canceled_at),
            ))
            .returning(SubscriptionEntity::as_select())
            .get_results::<SubscriptionEntity>(&mut conn)?;

        Ok(canceled.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            entities::payment_intents::InsertPaymentIntentEntity,
            repositories::payment_intents::PaymentIntentRepository,
            value_objects::{enums::billing_cycles::BillingCycle, payments::PaymentTarget},
        },
        infra::db::repositories::{payment_intents::PaymentIntentPostgres, test_support},
    };
    use chrono::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires a migrated Postgres at DATABASE_URL
    async fn test_duplicate_activation_for_one_payment_yields_one_subscription() {
        let Some(pool) = test_support::pool() else {
            return;
        };
        let plan_id = test_support::insert_plan(&pool);
        let user_id = Uuid::new_v4();
        let intent = PaymentIntentPostgres::new(Arc::clone(&pool))
            .create_intent(InsertPaymentIntentEntity::new(
                user_id,
                &PaymentTarget::Subscription {
                    plan_id,
                    billing_cycle: BillingCycle::Monthly,
                },
                49900,
                "PHP",
                None,
            ))
            .await
            .unwrap();
        let repo = Arc::new(SubscriptionPostgres::new(pool));
        let now = Utc::now();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let subscription = InsertSubscriptionEntity {
                    user_id,
                    plan_id,
                    tier: "basic".to_string(),
                    billing_cycle: BillingCycle::Monthly.to_string(),
                    status: SubscriptionStatus::Active.to_string(),
                    current_period_start: now,
                    current_period_end: now + Duration::days(30),
                    payment_intent_id: Some(intent.id),
                };
                tokio::spawn(async move { repo.activate_subscription(subscription).await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }

        assert_eq!(ids[0], ids[1]);
        let active = repo.find_active_subscription(user_id).await.unwrap().unwrap();
        assert_eq!(active.id, ids[0]);
        assert_eq!(active.payment_intent_id, Some(intent.id));
    }
}
