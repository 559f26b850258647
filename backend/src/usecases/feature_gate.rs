use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use entitlements::domain::{
    entities::subscriptions::SubscriptionEntity,
    repositories::{
        credit_ledger::CreditLedgerRepository, plans::PlanRepository,
        subscriptions::SubscriptionRepository,
    },
    value_objects::{
        entitlements::{EntitlementsResponse, FeatureLimits},
        enums::{
            billing_cycles::BillingCycle, credit_types::CreditType, features::Feature,
            plan_tiers::PlanTier,
        },
        iam::SessionContext,
        plans::{Limit, PlanLimits},
    },
};
use thiserror::Error;
use tracing::{error, info};

/// Whether `session` may use `feature` right now. Admins always may; anyone
/// else needs a subscription that is active at `now` on a tier that grants it.
pub fn has_feature(
    feature: Feature,
    session: &SessionContext,
    subscription: Option<&SubscriptionEntity>,
    now: DateTime<Utc>,
) -> bool {
    if session.is_admin {
        return true;
    }

    active_tier(subscription, now)
        .map(|tier| feature.is_granted_to(tier))
        .unwrap_or(false)
}

/// Numeric entitlement for `feature` given `used` units already spent this period.
pub fn get_limits(
    feature: Feature,
    session: &SessionContext,
    subscription: Option<&SubscriptionEntity>,
    plan_limits: Option<&PlanLimits>,
    used: u32,
    now: DateTime<Utc>,
) -> FeatureLimits {
    if session.is_admin {
        return limits(feature, Limit::Unlimited, used, None);
    }

    if !has_feature(feature, session, subscription, now) {
        return FeatureLimits::denied(feature, used);
    }

    // has_feature already proved there is an active subscription.
    let period = subscription.map(|sub| sub.billing_cycle());
    let limit = match active_tier(subscription, now) {
        Some(PlanTier::Enterprise) | None => Limit::Unlimited,
        Some(_) => plan_limits
            .map(|limits| limits.limit_for(feature))
            .unwrap_or(Limit::Unlimited),
    };

    limits(feature, limit, used, period)
}

fn active_tier(subscription: Option<&SubscriptionEntity>, now: DateTime<Utc>) -> Option<PlanTier> {
    subscription
        .filter(|sub| sub.is_active_at(now))
        .map(|sub| sub.tier())
}

fn limits(
    feature: Feature,
    limit: Limit,
    used: u32,
    period: Option<BillingCycle>,
) -> FeatureLimits {
    FeatureLimits {
        feature,
        allowed: limit.allows(used),
        limit: limit.as_option(),
        unlimited: limit == Limit::Unlimited,
        used,
        remaining: limit.remaining(used),
        period,
    }
}

#[derive(Debug, Error)]
pub enum EntitlementsError {
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EntitlementsError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub type UseCaseResult<T> = std::result::Result<T, EntitlementsError>;

/// Loads what the gate needs for a caller and evaluates every feature.
pub struct EntitlementsUseCase<P, S, L>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
{
    plan_repo: Arc<P>,
    subscription_repo: Arc<S>,
    ledger_repo: Arc<L>,
}

impl<P, S, L> EntitlementsUseCase<P, S, L>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
{
    pub fn new(plan_repo: Arc<P>, subscription_repo: Arc<S>, ledger_repo: Arc<L>) -> Self {
        Self {
            plan_repo,
            subscription_repo,
            ledger_repo,
        }
    }

    pub async fn entitlements(&self, session: &SessionContext) -> UseCaseResult<EntitlementsResponse> {
        let user_id = session.user_id;
        let now = Utc::now();

        let subscription = self
            .subscription_repo
            .find_active_subscription(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "feature_gate: failed to load subscription");
                EntitlementsError::Internal(err)
            })?;

        let plan = match subscription.as_ref() {
            Some(sub) => self.plan_repo.find_by_id(sub.plan_id).await.map_err(|err| {
                error!(%user_id, db_error = ?err, "feature_gate: failed to load plan");
                EntitlementsError::Internal(err)
            })?,
            None => None,
        };

        // Caps are per billing period, so only debits since the period began count.
        let used: HashMap<CreditType, u32> = match subscription.as_ref() {
            Some(sub) => self
                .ledger_repo
                .usage_since(user_id, sub.current_period_start)
                .await
                .map_err(|err| {
                    error!(%user_id, db_error = ?err, "feature_gate: failed to load usage");
                    EntitlementsError::Internal(err)
                })?
                .into_iter()
                .map(|(credit_type, used)| (credit_type, u32::try_from(used).unwrap_or(0)))
                .collect(),
            None => HashMap::new(),
        };

        let features = Feature::ALL
            .into_iter()
            .map(|feature| {
                let used = feature
                    .metered_by()
                    .and_then(|credit_type| used.get(&credit_type).copied())
                    .unwrap_or(0);
                get_limits(
                    feature,
                    session,
                    subscription.as_ref(),
                    plan.as_ref().map(|plan| &plan.limits),
                    used,
                    now,
                )
            })
            .collect::<Vec<_>>();

        let tier = active_tier(subscription.as_ref(), now);
        info!(
            %user_id,
            is_admin = session.is_admin,
            tier = ?tier,
            allowed = features.iter().filter(|f| f.allowed).count(),
            "feature_gate: entitlements evaluated"
        );

        Ok(EntitlementsResponse {
            success: true,
            is_admin: session.is_admin,
            tier,
            features,
        })
    }
}
