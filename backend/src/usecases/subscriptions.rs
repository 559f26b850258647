use std::sync::Arc;

use chrono::Utc;
use entitlements::domain::{
    entities::subscriptions::InsertSubscriptionEntity,
    repositories::{plans::PlanRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        enums::{features::Feature, subscription_statuses::SubscriptionStatus},
        iam::SessionContext,
        payments::PaymentTarget,
        subscriptions::{
            CancelSubscriptionResponse, PlanDto, PlansResponse, SubscribeRequest,
            SubscribeResponse, SubscriptionStatusDto,
        },
    },
};
use thiserror::Error;
use tracing::{error, info};

use crate::usecases::payments::{Checkout, PaymentError};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("plan not found")]
    PlanNotFound,
    #[error("no active subscription")]
    SubscriptionNotFound,
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::PlanNotFound | SubscriptionError::SubscriptionNotFound => {
                StatusCode::NOT_FOUND
            }
            SubscriptionError::Payment(err) => err.status_code(),
            SubscriptionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

pub struct SubscriptionUseCase<P, S, C>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    plan_repo: Arc<P>,
    subscription_repo: Arc<S>,
    checkout: Arc<C>,
}

impl<P, S, C> SubscriptionUseCase<P, S, C>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    pub fn new(plan_repo: Arc<P>, subscription_repo: Arc<S>, checkout: Arc<C>) -> Self {
        Self {
            plan_repo,
            subscription_repo,
            checkout,
        }
    }

    pub async fn plans(&self) -> UseCaseResult<PlansResponse> {
        let plans = self
            .plan_repo
            .list_active_plans()
            .await
            .map_err(|err| {
                error!(db_error = ?err, "subscriptions: failed to list plans");
                SubscriptionError::Internal(err)
            })?
            .into_iter()
            .map(PlanDto::from)
            .collect();

        Ok(PlansResponse {
            success: true,
            plans,
        })
    }

    pub async fn status(&self, session: &SessionContext) -> UseCaseResult<SubscriptionStatusDto> {
        let subscription = self
            .subscription_repo
            .find_latest_subscription(session.user_id)
            .await
            .map_err(|err| {
                error!(user_id = %session.user_id, db_error = ?err, "subscriptions: failed to load subscription");
                SubscriptionError::Internal(err)
            })?;

        let now = Utc::now();
        let is_active = subscription
            .as_ref()
            .is_some_and(|subscription| subscription.is_active_at(now));

        let plan = match &subscription {
            Some(subscription) => self
                .plan_repo
                .find_by_id(subscription.plan_id)
                .await
                .map_err(SubscriptionError::Internal)?
                .map(PlanDto::from),
            None => None,
        };

        let features = if session.is_admin {
            Feature::ALL.to_vec()
        } else {
            subscription
                .as_ref()
                .filter(|_| is_active)
                .map(|subscription| Feature::granted_to(subscription.tier()))
                .unwrap_or_default()
        };

        Ok(SubscriptionStatusDto {
            success: true,
            is_active,
            subscription: subscription.map(Into::into),
            plan,
            features,
        })
    }

    /// Free plans activate immediately. Paid plans return a payment intent;
    /// the subscription starts when that payment settles.
    pub async fn subscribe(
        &self,
        session: &SessionContext,
        request: SubscribeRequest,
    ) -> UseCaseResult<SubscribeResponse> {
        let plan = self
            .plan_repo
            .find_active_plan_by_id(request.plan_id)
            .await
            .map_err(SubscriptionError::Internal)?
            .ok_or(SubscriptionError::PlanNotFound)?;

        if plan.is_free_for(request.billing_cycle) {
            let now = Utc::now();
            let period_end = request
                .billing_cycle
                .period_end(now)
                .ok_or_else(|| anyhow::anyhow!("billing period overflow"))?;

            let subscription = self
                .subscription_repo
                .activate_subscription(InsertSubscriptionEntity {
                    user_id: session.user_id,
                    plan_id: plan.id,
                    tier: plan.tier.to_string(),
                    billing_cycle: request.billing_cycle.to_string(),
                    status: SubscriptionStatus::Active.to_string(),
                    current_period_start: now,
                    current_period_end: period_end,
                    payment_intent_id: None,
                })
                .await
                .map_err(|err| {
                    error!(user_id = %session.user_id, db_error = ?err, "subscriptions: failed to activate free plan");
                    SubscriptionError::Internal(err)
                })?;

            info!(user_id = %session.user_id, tier = %plan.tier, "subscriptions: free plan activated");

            return Ok(SubscribeResponse {
                success: true,
                is_free: true,
                subscription: Some(subscription.into()),
                payment_intent: None,
            });
        }

        let intent = self
            .checkout
            .open_intent(
                session.user_id,
                PaymentTarget::Subscription {
                    plan_id: plan.id,
                    billing_cycle: request.billing_cycle,
                },
                plan.price_for(request.billing_cycle),
                plan.currency.clone(),
                format!("{} ({})", plan.name, request.billing_cycle),
            )
            .await?;

        Ok(SubscribeResponse {
            success: true,
            is_free: false,
            subscription: None,
            payment_intent: Some(intent.into()),
        })
    }

    /// Cancels immediately; features are withdrawn on the next gate check.
    pub async fn cancel(&self, session: &SessionContext) -> UseCaseResult<CancelSubscriptionResponse> {
        let canceled = self
            .subscription_repo
            .cancel_active_subscription(session.user_id, Utc::now())
            .await
            .map_err(SubscriptionError::Internal)?
            .ok_or(SubscriptionError::SubscriptionNotFound)?;

        info!(user_id = %session.user_id, subscription_id = %canceled.id, "subscriptions: canceled");

        Ok(CancelSubscriptionResponse {
            success: true,
            subscription: canceled.into(),
        })
    }
}
