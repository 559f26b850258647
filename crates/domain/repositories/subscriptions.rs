use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity};

#[automock]
#[async_trait]
pub trait SubscriptionRepository {
    /// The row currently marked `active`, whatever its period end.
    async fn find_active_subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// Most recent non-replaced subscription (active or canceled).
    async fn find_latest_subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// Replaces the active subscription with a new one. Activations carrying a
    /// `payment_intent_id` that was already applied return the existing row.
    async fn activate_subscription(
        &self,
        subscription: InsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity>;

    async fn cancel_active_subscription(
        &self,
        user_id: Uuid,
        canceled_at: DateTime<Utc>,
    ) -> Result<Option<SubscriptionEntity>>;
}
