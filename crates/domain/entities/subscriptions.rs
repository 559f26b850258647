use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::{
        billing_cycles::BillingCycle, plan_tiers::PlanTier,
        subscription_statuses::SubscriptionStatus,
    },
    infra::db::postgres::schema::subscriptions,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub tier: String,
    pub billing_cycle: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub payment_intent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionEntity {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_str(&self.status)
    }

    pub fn tier(&self) -> PlanTier {
        PlanTier::from_str(&self.tier).unwrap_or(PlanTier::Free)
    }

    pub fn billing_cycle(&self) -> BillingCycle {
        BillingCycle::from_str(&self.billing_cycle).unwrap_or(BillingCycle::Monthly)
    }

    /// Active status alone is not enough: the paid period must still be running.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status() == SubscriptionStatus::Active && self.current_period_end > now
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub tier: String,
    pub billing_cycle: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub payment_intent_id: Option<Uuid>,
}
