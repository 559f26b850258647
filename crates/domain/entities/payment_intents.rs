use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        enums::{billing_cycles::BillingCycle, payment_statuses::PaymentStatus},
        payments::PaymentTarget,
    },
    infra::db::postgres::schema::payment_intents,
};

pub const TARGET_SUBSCRIPTION: &str = "subscription";
pub const TARGET_CREDIT_PACKAGE: &str = "credit_package";

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payment_intents)]
pub struct PaymentIntentEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_intent_id: Option<String>,
    pub target_kind: String,
    pub plan_id: Option<Uuid>,
    pub billing_cycle: Option<String>,
    pub package_id: Option<Uuid>,
    pub amount_minor: i32,
    pub currency: String,
    pub status: String,
    pub method_kind: Option<String>,
    pub redirect_url: Option<String>,
    pub last_error: Option<String>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntentEntity {
    /// Unknown stored statuses are treated as still processing so they get re-checked.
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.status).unwrap_or(PaymentStatus::Processing)
    }

    pub fn target(&self) -> Option<PaymentTarget> {
        match self.target_kind.as_str() {
            TARGET_SUBSCRIPTION => Some(PaymentTarget::Subscription {
                plan_id: self.plan_id?,
                billing_cycle: self
                    .billing_cycle
                    .as_deref()
                    .and_then(BillingCycle::from_str)?,
            }),
            TARGET_CREDIT_PACKAGE => Some(PaymentTarget::CreditPackage {
                package_id: self.package_id?,
            }),
            _ => None,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled_at.is_some()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payment_intents)]
pub struct InsertPaymentIntentEntity {
    pub user_id: Uuid,
    pub provider_intent_id: Option<String>,
    pub target_kind: String,
    pub plan_id: Option<Uuid>,
    pub billing_cycle: Option<String>,
    pub package_id: Option<Uuid>,
    pub amount_minor: i32,
    pub currency: String,
    pub status: String,
}

impl InsertPaymentIntentEntity {
    pub fn new(
        user_id: Uuid,
        target: &PaymentTarget,
        amount_minor: i32,
        currency: &str,
        provider_intent_id: Option<String>,
    ) -> Self {
        let (target_kind, plan_id, billing_cycle, package_id) = match target {
            PaymentTarget::Subscription {
                plan_id,
                billing_cycle,
            } => (
                TARGET_SUBSCRIPTION,
                Some(*plan_id),
                Some(billing_cycle.to_string()),
                None,
            ),
            PaymentTarget::CreditPackage { package_id } => {
                (TARGET_CREDIT_PACKAGE, None, None, Some(*package_id))
            }
        };

        Self {
            user_id,
            provider_intent_id,
            target_kind: target_kind.to_string(),
            plan_id,
            billing_cycle,
            package_id,
            amount_minor,
            currency: currency.to_string(),
            status: PaymentStatus::Created.to_string(),
        }
    }
}

/// Status change of an intent. `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = payment_intents)]
pub struct UpdatePaymentIntentEntity {
    pub status: Option<String>,
    pub provider_intent_id: Option<String>,
    pub method_kind: Option<String>,
    pub redirect_url: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UpdatePaymentIntentEntity {
    pub fn status(status: PaymentStatus) -> Self {
        Self {
            status: Some(status.to_string()),
            updated_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn with_method_kind(mut self, method_kind: impl Into<String>) -> Self {
        self.method_kind = Some(method_kind.into());
        self
    }

    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}
