use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::payment_intents::{
        InsertPaymentIntentEntity, PaymentIntentEntity, UpdatePaymentIntentEntity,
    },
    value_objects::enums::payment_statuses::PaymentStatus,
};

#[automock]
#[async_trait]
pub trait PaymentIntentRepository {
    async fn create_intent(&self, intent: InsertPaymentIntentEntity) -> Result<PaymentIntentEntity>;

    async fn find_by_id(&self, intent_id: Uuid) -> Result<Option<PaymentIntentEntity>>;

    async fn find_by_provider_intent_id(
        &self,
        provider_intent_id: &str,
    ) -> Result<Option<PaymentIntentEntity>>;

    /// Applies `update` only while the stored status is still `expected`.
    /// `None` means another writer moved the intent first.
    async fn update_intent(
        &self,
        intent_id: Uuid,
        expected: PaymentStatus,
        update: UpdatePaymentIntentEntity,
    ) -> Result<Option<PaymentIntentEntity>>;

    /// Claims fulfilment. Returns `false` when another caller already fulfilled the intent.
    async fn mark_fulfilled(&self, intent_id: Uuid, fulfilled_at: DateTime<Utc>) -> Result<bool>;
}
