use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::{plans::PlanEntity, subscriptions::SubscriptionEntity},
    value_objects::{
        enums::{
            billing_cycles::BillingCycle, features::Feature, plan_tiers::PlanTier,
            subscription_statuses::SubscriptionStatus,
        },
        payments::PaymentIntentDto,
        plans::PlanLimits,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDto {
    pub id: Uuid,
    pub name: String,
    pub tier: PlanTier,
    pub price_monthly_minor: i32,
    pub price_yearly_minor: i32,
    pub currency: String,
    pub features: Vec<Feature>,
    pub limits: PlanLimits,
}

impl From<PlanEntity> for PlanDto {
    fn from(value: PlanEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            tier: value.tier,
            price_monthly_minor: value.price_monthly_minor,
            price_yearly_minor: value.price_yearly_minor,
            currency: value.currency,
            features: Feature::granted_to(value.tier),
            limits: value.limits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDto {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub tier: PlanTier,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionEntity> for SubscriptionDto {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            plan_id: value.plan_id,
            tier: value.tier(),
            billing_cycle: value.billing_cycle(),
            status: value.status(),
            current_period_start: value.current_period_start,
            current_period_end: value.current_period_end,
            canceled_at: value.canceled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlansResponse {
    pub success: bool,
    pub plans: Vec<PlanDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusDto {
    pub success: bool,
    pub is_active: bool,
    pub subscription: Option<SubscriptionDto>,
    pub plan: Option<PlanDto>,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub plan_id: Uuid,
    #[serde(default = "default_billing_cycle")]
    pub billing_cycle: BillingCycle,
}

fn default_billing_cycle() -> BillingCycle {
    BillingCycle::Monthly
}

/// `{isFree: true, subscription}` or `{isFree: false, paymentIntent}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub success: bool,
    pub is_free: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<PaymentIntentDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionResponse {
    pub success: bool,
    pub subscription: SubscriptionDto,
}
