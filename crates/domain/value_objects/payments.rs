use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::payment_intents::PaymentIntentEntity,
    value_objects::enums::{
        billing_cycles::BillingCycle, payment_methods::PaymentMethodKind,
        payment_statuses::PaymentStatus,
    },
};

/// What a payment intent buys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PaymentTarget {
    Subscription {
        plan_id: Uuid,
        billing_cycle: BillingCycle,
    },
    CreditPackage {
        package_id: Uuid,
    },
}

/// Result of submitting a payment for settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Succeeded,
    RequiresAction { redirect_url: String },
    Processing,
    Failed { reason: String },
}

impl ProcessOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            ProcessOutcome::Succeeded => PaymentStatus::Succeeded,
            ProcessOutcome::RequiresAction { .. } => PaymentStatus::RequiresAction,
            ProcessOutcome::Processing => PaymentStatus::Processing,
            ProcessOutcome::Failed { .. } => PaymentStatus::Failed,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    pub card_number: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub cvc: String,
}

impl CardDetails {
    pub fn last4(&self) -> &str {
        let len = self.card_number.len();
        self.card_number.get(len.saturating_sub(4)..).unwrap_or("")
    }
}

// Card numbers and CVCs must never reach the logs.
impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("last4", &self.last4())
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethodDetails {
    Card(CardDetails),
    #[serde(rename = "gcash")]
    GCash,
}

impl PaymentMethodDetails {
    pub fn kind(&self) -> PaymentMethodKind {
        match self {
            PaymentMethodDetails::Card(_) => PaymentMethodKind::Card,
            PaymentMethodDetails::GCash => PaymentMethodKind::GCash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BillingDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentMethodRequest {
    pub details: PaymentMethodDetails,
    #[serde(default)]
    pub billing: Option<BillingDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentMethodResponse {
    pub success: bool,
    pub payment_method_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentRequest {
    pub payment_intent_id: Uuid,
    pub payment_method_id: String,
    #[serde(default)]
    pub method_type: Option<PaymentMethodKind>,
    #[serde(default)]
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentResponse {
    pub success: bool,
    pub payment_intent_id: Uuid,
    pub status: PaymentStatus,
    pub processed: bool,
    pub requires_action: bool,
    pub processing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessPaymentResponse {
    pub fn from_outcome(payment_intent_id: Uuid, outcome: &ProcessOutcome) -> Self {
        let (redirect_url, error) = match outcome {
            ProcessOutcome::RequiresAction { redirect_url } => (Some(redirect_url.clone()), None),
            ProcessOutcome::Failed { reason } => (None, Some(reason.clone())),
            _ => (None, None),
        };

        Self {
            success: !matches!(outcome, ProcessOutcome::Failed { .. }),
            payment_intent_id,
            status: outcome.status(),
            processed: matches!(outcome, ProcessOutcome::Succeeded),
            requires_action: matches!(outcome, ProcessOutcome::RequiresAction { .. }),
            processing: matches!(outcome, ProcessOutcome::Processing),
            redirect_url,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
    pub payment_intent_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub success: bool,
    pub payment_intent_id: Uuid,
    pub status: PaymentStatus,
    /// Settlement was already recorded before this check, by a webhook or an earlier poll.
    pub already_processed: bool,
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentDto {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub amount_minor: i32,
    pub currency: String,
    pub target: Option<PaymentTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentIntentEntity> for PaymentIntentDto {
    fn from(value: PaymentIntentEntity) -> Self {
        Self {
            id: value.id,
            status: value.status(),
            amount_minor: value.amount_minor,
            currency: value.currency.clone(),
            target: value.target(),
            redirect_url: value.redirect_url.clone(),
            created_at: value.created_at,
        }
    }
}
