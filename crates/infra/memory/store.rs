use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    entities::{
        credit_balances::CreditBalanceEntity,
        credit_packages::CreditPackageEntity,
        credit_transactions::{CreditTransactionEntity, KIND_CREDIT, KIND_DEBIT, KIND_EXPIRE},
        payment_intents::{InsertPaymentIntentEntity, PaymentIntentEntity, UpdatePaymentIntentEntity},
        plans::PlanEntity,
        subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    },
    repositories::{
        credit_ledger::CreditLedgerRepository, credit_packages::CreditPackageRepository,
        payment_intents::PaymentIntentRepository, plans::PlanRepository,
        subscriptions::SubscriptionRepository,
    },
    value_objects::{
        credits::{ConsumeOutcome, CreditOutcome},
        enums::{
            credit_types::CreditType, payment_statuses::PaymentStatus,
            subscription_statuses::SubscriptionStatus,
        },
    },
};

#[derive(Default)]
struct State {
    plans: HashMap<Uuid, PlanEntity>,
    packages: HashMap<Uuid, CreditPackageEntity>,
    balances: HashMap<(Uuid, CreditType), CreditBalanceEntity>,
    transactions: Vec<CreditTransactionEntity>,
    subscriptions: Vec<SubscriptionEntity>,
    intents: HashMap<Uuid, PaymentIntentEntity>,
}

impl State {
    fn reference_applied(&self, user_id: Uuid, kind: &str, reference_id: Option<&str>) -> bool {
        let Some(reference_id) = reference_id else {
            return false;
        };
        self.transactions.iter().any(|tx| {
            tx.user_id == user_id && tx.kind == kind && tx.reference_id.as_deref() == Some(reference_id)
        })
    }

    fn record(
        &mut self,
        user_id: Uuid,
        credit_type: CreditType,
        kind: &str,
        amount: i32,
        balance_after: i32,
        reference_id: Option<String>,
    ) {
        self.transactions.push(CreditTransactionEntity {
            id: Uuid::new_v4(),
            user_id,
            credit_type: credit_type.to_string(),
            kind: kind.to_string(),
            amount,
            balance_after,
            reference_id,
            created_at: Utc::now(),
        });
    }
}

/// Every repository trait over one mutex. Each call holds the lock for its
/// whole read-modify-write, so debits are atomic like the row-locked SQL path.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_plan(&self, plan: PlanEntity) {
        self.state.lock().await.plans.insert(plan.id, plan);
    }

    pub async fn insert_package(&self, package: CreditPackageEntity) {
        self.state.lock().await.packages.insert(package.id, package);
    }
}

#[async_trait]
impl PlanRepository for InMemoryStore {
    async fn find_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        Ok(self.state.lock().await.plans.get(&plan_id).cloned())
    }

    async fn find_active_plan_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        let state = self.state.lock().await;
        Ok(state.plans.get(&plan_id).filter(|plan| plan.is_active).cloned())
    }

    async fn list_active_plans(&self) -> Result<Vec<PlanEntity>> {
        let state = self.state.lock().await;
        let mut plans: Vec<PlanEntity> = state.plans.values().filter(|plan| plan.is_active).cloned().collect();
        plans.sort_by(|a, b| {
            a.price_monthly_minor
                .cmp(&b.price_monthly_minor)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(plans)
    }
}

#[async_trait]
impl CreditPackageRepository for InMemoryStore {
    async fn list_active_packages(&self) -> Result<Vec<CreditPackageEntity>> {
        let state = self.state.lock().await;
        let mut packages: Vec<CreditPackageEntity> =
            state.packages.values().filter(|package| package.is_active).cloned().collect();
        packages.sort_by(|a, b| {
            a.credit_type
                .cmp(&b.credit_type)
                .then_with(|| a.price_minor.cmp(&b.price_minor))
        });
        Ok(packages)
    }

    async fn find_active_package_by_id(&self, package_id: Uuid) -> Result<Option<CreditPackageEntity>> {
        let state = self.state.lock().await;
        Ok(state.packages.get(&package_id).filter(|package| package.is_active).cloned())
    }

    async fn find_by_id(&self, package_id: Uuid) -> Result<Option<CreditPackageEntity>> {
        Ok(self.state.lock().await.packages.get(&package_id).cloned())
    }
}

#[async_trait]
impl CreditLedgerRepository for InMemoryStore {
    async fn list_balances(&self, user_id: Uuid) -> Result<Vec<CreditBalanceEntity>> {
        let state = self.state.lock().await;
        let mut balances: Vec<CreditBalanceEntity> = state
            .balances
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|(_, balance)| balance.clone())
            .collect();
        balances.sort_by(|a, b| a.credit_type.cmp(&b.credit_type));
        Ok(balances)
    }

    async fn find_balance(
        &self,
        user_id: Uuid,
        credit_type: CreditType,
    ) -> Result<Option<CreditBalanceEntity>> {
        Ok(self.state.lock().await.balances.get(&(user_id, credit_type)).cloned())
    }

    async fn consume(
        &self,
        user_id: Uuid,
        credit_type: CreditType,
        amount: i32,
        reference_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        let mut state = self.state.lock().await;

        let Some(row) = state.balances.get(&(user_id, credit_type)).cloned() else {
            return Ok(ConsumeOutcome::Insufficient { available: 0 });
        };

        if state.reference_applied(user_id, KIND_DEBIT, reference_id.as_deref()) {
            return Ok(ConsumeOutcome::AlreadyConsumed {
                balance: row.balance,
            });
        }

        let available = row.available_at(now);
        if available < amount {
            return Ok(ConsumeOutcome::Insufficient { available });
        }

        let used = row
            .used
            .checked_add(amount)
            .ok_or_else(|| anyhow!("{credit_type} usage for user {user_id} would overflow"))?;

        let balance = {
            let row = state
                .balances
                .get_mut(&(user_id, credit_type))
                .ok_or_else(|| anyhow!("balance row vanished"))?;
            row.balance -= amount;
            row.used = used;
            row.updated_at = now;
            row.balance
        };

        state.record(user_id, credit_type, KIND_DEBIT, amount, balance, reference_id);

        Ok(ConsumeOutcome::Consumed { balance })
    }

    async fn credit(
        &self,
        user_id: Uuid,
        credit_type: CreditType,
        amount: i32,
        expires_at: Option<DateTime<Utc>>,
        reference_id: Option<String>,
    ) -> Result<CreditOutcome> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let row = state
            .balances
            .entry((user_id, credit_type))
            .or_insert_with(|| CreditBalanceEntity::empty(user_id, credit_type))
            .clone();

        if state.reference_applied(user_id, KIND_CREDIT, reference_id.as_deref()) {
            return Ok(CreditOutcome::AlreadyCredited {
                balance: row.balance,
            });
        }

        let forfeited = row.forfeited_at(now);
        let (total, balance) = row
            .after_credit(amount, forfeited)
            .ok_or_else(|| anyhow!("{credit_type} balance for user {user_id} would overflow"))?;

        if forfeited > 0 {
            state.record(user_id, credit_type, KIND_EXPIRE, forfeited, 0, None);
        }

        let balance = {
            let current = state
                .balances
                .get_mut(&(user_id, credit_type))
                .ok_or_else(|| anyhow!("balance row vanished"))?;
            current.total = total;
            current.balance = balance;
            current.expires_at = row.merged_expiry(expires_at, now);
            current.updated_at = now;
            current.balance
        };

        state.record(user_id, credit_type, KIND_CREDIT, amount, balance, reference_id);

        Ok(CreditOutcome::Credited { balance })
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CreditTransactionEntity>> {
        let state = self.state.lock().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn usage_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<HashMap<CreditType, i32>> {
        let state = self.state.lock().await;
        let mut usage: HashMap<CreditType, i32> = HashMap::new();
        for tx in state.transactions.iter().filter(|tx| {
            tx.user_id == user_id && tx.kind == KIND_DEBIT && tx.created_at >= since
        }) {
            if let Some(credit_type) = CreditType::from_str(&tx.credit_type) {
                let used = usage.entry(credit_type).or_insert(0);
                *used = used.saturating_add(tx.amount);
            }
        }
        Ok(usage)
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn find_active_subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .iter()
            .rev()
            .find(|sub| sub.user_id == user_id && sub.status() == SubscriptionStatus::Active)
            .cloned())
    }

    async fn find_latest_subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .iter()
            .rev()
            .find(|sub| sub.user_id == user_id && sub.status() != SubscriptionStatus::Inactive)
            .cloned())
    }

    async fn activate_subscription(
        &self,
        subscription: InsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let Some(payment_intent_id) = subscription.payment_intent_id {
            if let Some(existing) = state
                .subscriptions
                .iter()
                .find(|sub| sub.payment_intent_id == Some(payment_intent_id))
            {
                return Ok(existing.clone());
            }
        }

        for current in state.subscriptions.iter_mut().filter(|sub| {
            sub.user_id == subscription.user_id && sub.status() == SubscriptionStatus::Active
        }) {
            current.status = SubscriptionStatus::Inactive.to_string();
            current.updated_at = now;
        }

        let activated = SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: subscription.user_id,
            plan_id: subscription.plan_id,
            tier: subscription.tier,
            billing_cycle: subscription.billing_cycle,
            status: subscription.status,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            canceled_at: None,
            payment_intent_id: subscription.payment_intent_id,
            created_at: now,
            updated_at: now,
        };
        state.subscriptions.push(activated.clone());

        Ok(activated)
    }

    async fn cancel_active_subscription(
        &self,
        user_id: Uuid,
        canceled_at: DateTime<Utc>,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut state = self.state.lock().await;

        let Some(current) = state
            .subscriptions
            .iter_mut()
            .rev()
            .find(|sub| sub.user_id == user_id && sub.status() == SubscriptionStatus::Active)
        else {
            return Ok(None);
        };

        current.status = SubscriptionStatus::Canceled.to_string();
        current.canceled_at = Some(canceled_at);
        current.updated_at = canceled_at;

        Ok(Some(current.clone()))
    }
}

#[async_trait]
impl PaymentIntentRepository for InMemoryStore {
    async fn create_intent(&self, intent: InsertPaymentIntentEntity) -> Result<PaymentIntentEntity> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let created = PaymentIntentEntity {
            id: Uuid::new_v4(),
            user_id: intent.user_id,
            provider_intent_id: intent.provider_intent_id,
            target_kind: intent.target_kind,
            plan_id: intent.plan_id,
            billing_cycle: intent.billing_cycle,
            package_id: intent.package_id,
            amount_minor: intent.amount_minor,
            currency: intent.currency,
            status: intent.status,
            method_kind: None,
            redirect_url: None,
            last_error: None,
            fulfilled_at: None,
            created_at: now,
            updated_at: now,
        };
        state.intents.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, intent_id: Uuid) -> Result<Option<PaymentIntentEntity>> {
        Ok(self.state.lock().await.intents.get(&intent_id).cloned())
    }

    async fn find_by_provider_intent_id(
        &self,
        provider_intent_id: &str,
    ) -> Result<Option<PaymentIntentEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .intents
            .values()
            .find(|intent| intent.provider_intent_id.as_deref() == Some(provider_intent_id))
            .cloned())
    }

    async fn update_intent(
        &self,
        intent_id: Uuid,
        expected: PaymentStatus,
        changes: UpdatePaymentIntentEntity,
    ) -> Result<Option<PaymentIntentEntity>> {
        let mut state = self.state.lock().await;
        let intent = state
            .intents
            .get_mut(&intent_id)
            .ok_or_else(|| anyhow!("payment intent {} not found", intent_id))?;

        if intent.status != expected.as_str() {
            return Ok(None);
        }

        if let Some(status) = changes.status {
            intent.status = status;
        }
        if let Some(provider_intent_id) = changes.provider_intent_id {
            intent.provider_intent_id = Some(provider_intent_id);
        }
        if let Some(method_kind) = changes.method_kind {
            intent.method_kind = Some(method_kind);
        }
        if let Some(redirect_url) = changes.redirect_url {
            intent.redirect_url = Some(redirect_url);
        }
        if let Some(last_error) = changes.last_error {
            intent.last_error = Some(last_error);
        }
        intent.updated_at = changes.updated_at.unwrap_or_else(Utc::now);

        Ok(Some(intent.clone()))
    }

    async fn mark_fulfilled(&self, intent_id: Uuid, fulfilled_at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.intents.get_mut(&intent_id) {
            Some(intent) if intent.fulfilled_at.is_none() => {
                intent.fulfilled_at = Some(fulfilled_at);
                intent.updated_at = fulfilled_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
