use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use entitlements::{
    domain::{
        entities::{
            payment_intents::{
                InsertPaymentIntentEntity, PaymentIntentEntity, UpdatePaymentIntentEntity,
            },
            subscriptions::InsertSubscriptionEntity,
        },
        repositories::{
            credit_ledger::CreditLedgerRepository, credit_packages::CreditPackageRepository,
            payment_intents::PaymentIntentRepository, plans::PlanRepository,
            subscriptions::SubscriptionRepository,
        },
        value_objects::{
            credits::CreditOutcome,
            enums::{payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus},
            iam::SessionContext,
            payments::{
                BillingDetails, CreatePaymentMethodRequest, CreatePaymentMethodResponse,
                PaymentMethodDetails, PaymentStatusResponse, PaymentTarget, ProcessOutcome,
                ProcessPaymentRequest, ProcessPaymentResponse,
            },
        },
    },
    payments::paymongo_client::{
        EVENT_PAYMENT_FAILED, EVENT_PAYMENT_PAID, PayMongoClient, ProviderError, ProviderIntent,
        WebhookEvent,
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Payment provider operations the workflow depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_minor: i32,
        currency: String,
        description: String,
        metadata: HashMap<String, String>,
    ) -> Result<ProviderIntent, ProviderError>;

    async fn create_payment_method(
        &self,
        details: PaymentMethodDetails,
        billing: Option<BillingDetails>,
    ) -> Result<String, ProviderError>;

    async fn attach(
        &self,
        provider_intent_id: String,
        payment_method_id: String,
        return_url: String,
    ) -> Result<ProviderIntent, ProviderError>;

    async fn retrieve(&self, provider_intent_id: String) -> Result<ProviderIntent, ProviderError>;

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent, ProviderError>;
}

#[async_trait]
impl PaymentGateway for PayMongoClient {
    async fn create_intent(
        &self,
        amount_minor: i32,
        currency: String,
        description: String,
        metadata: HashMap<String, String>,
    ) -> Result<ProviderIntent, ProviderError> {
        self.create_payment_intent(amount_minor, &currency, &description, metadata)
            .await
    }

    async fn create_payment_method(
        &self,
        details: PaymentMethodDetails,
        billing: Option<BillingDetails>,
    ) -> Result<String, ProviderError> {
        PayMongoClient::create_payment_method(self, &details, billing.as_ref()).await
    }

    async fn attach(
        &self,
        provider_intent_id: String,
        payment_method_id: String,
        return_url: String,
    ) -> Result<ProviderIntent, ProviderError> {
        self.attach_payment_method(&provider_intent_id, &payment_method_id, &return_url)
            .await
    }

    async fn retrieve(&self, provider_intent_id: String) -> Result<ProviderIntent, ProviderError> {
        self.retrieve_payment_intent(&provider_intent_id).await
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent, ProviderError> {
        self.verify_webhook_signature(payload, signature)
    }
}

/// Opens a payment intent for something a user wants to buy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Checkout: Send + Sync {
    async fn open_intent(
        &self,
        user_id: Uuid,
        target: PaymentTarget,
        amount_minor: i32,
        currency: String,
        description: String,
    ) -> Result<PaymentIntentEntity, PaymentError>;
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment intent not found")]
    IntentNotFound,
    /// Provider rejected the card or wallet details. Message is the provider's.
    #[error("{0}")]
    PaymentMethod(String),
    /// Terminal failure of this intent.
    #[error("{0}")]
    Processing(String),
    #[error("payment intent is {0} and cannot be processed")]
    InvalidState(PaymentStatus),
    #[error("invalid webhook: {0}")]
    InvalidWebhook(String),
    #[error("payment provider unavailable")]
    ProviderUnavailable(#[source] ProviderError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            PaymentError::IntentNotFound => StatusCode::NOT_FOUND,
            PaymentError::PaymentMethod(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::Processing(_) => StatusCode::PAYMENT_REQUIRED,
            PaymentError::InvalidState(_) => StatusCode::CONFLICT,
            PaymentError::InvalidWebhook(_) => StatusCode::BAD_REQUEST,
            PaymentError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PaymentError>;

const TRANSITION_ATTEMPTS: usize = 3;

fn internal(context: &'static str) -> impl Fn(anyhow::Error) -> PaymentError {
    move |err| {
        error!(db_error = ?err, "payments: {}", context);
        PaymentError::Internal(err)
    }
}

fn unavailable(err: ProviderError) -> PaymentError {
    error!(provider_error = %err, "payments: provider call failed");
    PaymentError::ProviderUnavailable(err)
}

pub struct PaymentUseCase<I, P, K, S, L, G>
where
    I: PaymentIntentRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    G: PaymentGateway + 'static,
{
    intent_repo: Arc<I>,
    plan_repo: Arc<P>,
    package_repo: Arc<K>,
    subscription_repo: Arc<S>,
    ledger_repo: Arc<L>,
    gateway: Arc<G>,
    return_url: String,
}

impl<I, P, K, S, L, G> PaymentUseCase<I, P, K, S, L, G>
where
    I: PaymentIntentRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(
        intent_repo: Arc<I>,
        plan_repo: Arc<P>,
        package_repo: Arc<K>,
        subscription_repo: Arc<S>,
        ledger_repo: Arc<L>,
        gateway: Arc<G>,
        return_url: String,
    ) -> Self {
        Self {
            intent_repo,
            plan_repo,
            package_repo,
            subscription_repo,
            ledger_repo,
            gateway,
            return_url,
        }
    }

    pub async fn create_payment_method(
        &self,
        session: &SessionContext,
        request: CreatePaymentMethodRequest,
    ) -> UseCaseResult<CreatePaymentMethodResponse> {
        let kind = request.details.kind();
        let payment_method_id = self
            .gateway
            .create_payment_method(request.details, request.billing)
            .await
            .map_err(|err| match err {
                ProviderError::Rejected { message, .. } => {
                    warn!(user_id = %session.user_id, %kind, %message, "payments: payment method rejected");
                    PaymentError::PaymentMethod(message)
                }
                other => unavailable(other),
            })?;

        info!(user_id = %session.user_id, %kind, %payment_method_id, "payments: payment method created");

        Ok(CreatePaymentMethodResponse {
            success: true,
            payment_method_id,
        })
    }

    pub async fn process(
        &self,
        session: &SessionContext,
        request: ProcessPaymentRequest,
    ) -> UseCaseResult<ProcessPaymentResponse> {
        let intent = self.owned_intent(session, request.payment_intent_id).await?;

        match intent.status() {
            PaymentStatus::Succeeded => {
                self.fulfill(&intent).await?;
                return Ok(ProcessPaymentResponse::from_outcome(
                    intent.id,
                    &ProcessOutcome::Succeeded,
                ));
            }
            PaymentStatus::Created | PaymentStatus::MethodAttached => {}
            other => return Err(PaymentError::InvalidState(other)),
        }

        let provider_intent_id = intent
            .provider_intent_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("payment intent {} has no provider id", intent.id))?;

        let mut attached = UpdatePaymentIntentEntity::status(PaymentStatus::MethodAttached);
        if let Some(method_type) = request.method_type {
            attached = attached.with_method_kind(method_type.as_str());
        }
        let intent = self.transition(&intent, attached).await?;

        let return_url = request.return_url.unwrap_or_else(|| self.return_url.clone());
        let provider = match self
            .gateway
            .attach(provider_intent_id, request.payment_method_id, return_url)
            .await
        {
            Ok(provider) => provider,
            // The intent stays method_attached: the provider may still settle it,
            // and a later status check or webhook will pick that up.
            Err(err) if err.is_transient() => {
                warn!(intent_id = %intent.id, error = %err, "payments: attach outcome unknown");
                return Err(unavailable(err));
            }
            Err(ProviderError::Rejected { message, .. }) => {
                self.transition(
                    &intent,
                    UpdatePaymentIntentEntity::status(PaymentStatus::Failed).with_error(message.clone()),
                )
                .await?;
                warn!(intent_id = %intent.id, %message, "payments: provider rejected the payment");
                return Err(PaymentError::Processing(message));
            }
            Err(other) => return Err(unavailable(other)),
        };

        let outcome = provider.outcome();
        let intent = self.record_outcome(&intent, &outcome).await?;

        info!(
            intent_id = %intent.id,
            user_id = %intent.user_id,
            status = %outcome.status(),
            "payments: payment processed"
        );

        match outcome {
            ProcessOutcome::Succeeded => {
                self.fulfill(&intent).await?;
            }
            ProcessOutcome::Failed { reason } => return Err(PaymentError::Processing(reason)),
            _ => {}
        }

        Ok(ProcessPaymentResponse::from_outcome(intent.id, &outcome))
    }

    /// Reconciles the local intent with the provider. Safe to call any number
    /// of times: fulfilment runs at most once. Failed intents are asked again
    /// too, since a provider may settle a payment after reporting an error.
    pub async fn check_status(
        &self,
        session: &SessionContext,
        payment_intent_id: Uuid,
    ) -> UseCaseResult<PaymentStatusResponse> {
        let intent = self.owned_intent(session, payment_intent_id).await?;

        if intent.is_fulfilled() {
            return Ok(status_response(&intent, PaymentStatus::Succeeded, true));
        }

        let intent = match (intent.status(), intent.provider_intent_id.clone()) {
            (status, Some(provider_intent_id)) if status != PaymentStatus::Succeeded => {
                let provider = self
                    .gateway
                    .retrieve(provider_intent_id)
                    .await
                    .map_err(unavailable)?;
                self.record_outcome(&intent, &provider.outcome()).await?
            }
            _ => intent,
        };

        let status = intent.status();
        let already_processed = if status == PaymentStatus::Succeeded {
            !self.fulfill(&intent).await?
        } else {
            false
        };

        Ok(status_response(&intent, status, already_processed))
    }

    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> UseCaseResult<()> {
        let event = self.gateway.verify_webhook(payload, signature).map_err(|err| {
            warn!(error = %err, "payments: webhook rejected");
            PaymentError::InvalidWebhook(err.to_string())
        })?;

        let event_type = event.event_type().to_string();
        let outcome = match event_type.as_str() {
            EVENT_PAYMENT_PAID => ProcessOutcome::Succeeded,
            EVENT_PAYMENT_FAILED => ProcessOutcome::Failed {
                reason: "payment failed".to_string(),
            },
            other => {
                info!(event_type = %other, event_id = %event.data.id, "payments: ignoring webhook event");
                return Ok(());
            }
        };

        let Some(provider_intent_id) = event.payment_intent_id() else {
            return Err(PaymentError::InvalidWebhook(
                "event has no payment_intent_id".to_string(),
            ));
        };

        let Some(intent) = self
            .intent_repo
            .find_by_provider_intent_id(&provider_intent_id)
            .await
            .map_err(internal("failed to load payment intent"))?
        else {
            warn!(%provider_intent_id, %event_type, "payments: webhook for unknown intent");
            return Ok(());
        };

        let intent = if intent.status() == PaymentStatus::Succeeded {
            intent
        } else {
            self.record_outcome(&intent, &outcome).await?
        };

        if intent.status() == PaymentStatus::Succeeded {
            let first = self.fulfill(&intent).await?;
            info!(intent_id = %intent.id, first, "payments: webhook settled payment");
        }

        Ok(())
    }

    /// Applies what was paid for. Returns `true` when this call claimed the
    /// fulfilment, `false` when it had already happened.
    async fn fulfill(&self, intent: &PaymentIntentEntity) -> UseCaseResult<bool> {
        if intent.is_fulfilled() {
            return Ok(false);
        }

        let now = Utc::now();
        match intent.target() {
            Some(PaymentTarget::CreditPackage { package_id }) => {
                let package = self
                    .package_repo
                    .find_by_id(package_id)
                    .await
                    .map_err(internal("failed to load credit package"))?
                    .ok_or_else(|| anyhow::anyhow!("credit package {} not found", package_id))?;
                let credit_type = package
                    .credit_type()
                    .ok_or_else(|| anyhow::anyhow!("credit package {} has unknown type", package_id))?;

                let outcome = self
                    .ledger_repo
                    .credit(
                        intent.user_id,
                        credit_type,
                        package.granted_credits(),
                        package.expiry_from(now),
                        Some(intent.id.to_string()),
                    )
                    .await
                    .map_err(internal("failed to credit purchased package"))?;

                info!(
                    intent_id = %intent.id,
                    user_id = %intent.user_id,
                    %credit_type,
                    granted = package.granted_credits(),
                    balance = outcome.balance(),
                    deduped = matches!(outcome, CreditOutcome::AlreadyCredited { .. }),
                    "payments: credit package fulfilled"
                );
            }
            Some(PaymentTarget::Subscription {
                plan_id,
                billing_cycle,
            }) => {
                let plan = self
                    .plan_repo
                    .find_by_id(plan_id)
                    .await
                    .map_err(internal("failed to load plan"))?
                    .ok_or_else(|| anyhow::anyhow!("plan {} not found", plan_id))?;
                let period_end = billing_cycle
                    .period_end(now)
                    .ok_or_else(|| anyhow::anyhow!("billing period overflow"))?;

                let subscription = self
                    .subscription_repo
                    .activate_subscription(InsertSubscriptionEntity {
                        user_id: intent.user_id,
                        plan_id,
                        tier: plan.tier.to_string(),
                        billing_cycle: billing_cycle.to_string(),
                        status: SubscriptionStatus::Active.to_string(),
                        current_period_start: now,
                        current_period_end: period_end,
                        payment_intent_id: Some(intent.id),
                    })
                    .await
                    .map_err(internal("failed to activate subscription"))?;

                info!(
                    intent_id = %intent.id,
                    user_id = %intent.user_id,
                    subscription_id = %subscription.id,
                    tier = %plan.tier,
                    "payments: subscription fulfilled"
                );
            }
            None => {
                return Err(PaymentError::Internal(anyhow::anyhow!(
                    "payment intent {} has an unreadable target",
                    intent.id
                )));
            }
        }

        self.intent_repo
            .mark_fulfilled(intent.id, now)
            .await
            .map_err(internal("failed to mark intent fulfilled"))
    }

    async fn owned_intent(
        &self,
        session: &SessionContext,
        payment_intent_id: Uuid,
    ) -> UseCaseResult<PaymentIntentEntity> {
        let intent = self
            .intent_repo
            .find_by_id(payment_intent_id)
            .await
            .map_err(internal("failed to load payment intent"))?;

        match intent {
            Some(intent) if intent.user_id == session.user_id || session.is_admin => Ok(intent),
            _ => Err(PaymentError::IntentNotFound),
        }
    }

    async fn record_outcome(
        &self,
        intent: &PaymentIntentEntity,
        outcome: &ProcessOutcome,
    ) -> UseCaseResult<PaymentIntentEntity> {
        let mut changes = UpdatePaymentIntentEntity::status(outcome.status());
        match outcome {
            ProcessOutcome::RequiresAction { redirect_url } => {
                changes = changes.with_redirect_url(redirect_url.clone());
            }
            ProcessOutcome::Failed { reason } => {
                changes = changes.with_error(reason.clone());
            }
            _ => {}
        }
        self.transition(intent, changes).await
    }

    /// Writes a status change if the state machine allows it. Disallowed
    /// changes leave the intent as it is. The write is conditional on the
    /// status it was checked against; when a concurrent writer got there
    /// first, the intent is reloaded and the check runs again.
    async fn transition(
        &self,
        intent: &PaymentIntentEntity,
        changes: UpdatePaymentIntentEntity,
    ) -> UseCaseResult<PaymentIntentEntity> {
        let requested = changes.status.as_deref().and_then(PaymentStatus::from_str);
        let mut intent = intent.clone();

        for _ in 0..TRANSITION_ATTEMPTS {
            let current = intent.status();
            let next = requested.unwrap_or(current);

            if current == next && current.is_terminal() {
                return Ok(intent);
            }
            if !current.can_transition_to(next) {
                warn!(intent_id = %intent.id, %current, %next, "payments: ignoring invalid status change");
                return Ok(intent);
            }

            match self
                .intent_repo
                .update_intent(intent.id, current, changes.clone())
                .await
                .map_err(internal("failed to update payment intent"))?
            {
                Some(updated) => return Ok(updated),
                None => {
                    warn!(intent_id = %intent.id, expected = %current, %next, "payments: intent changed concurrently, re-checking");
                    intent = self
                        .intent_repo
                        .find_by_id(intent.id)
                        .await
                        .map_err(internal("failed to reload payment intent"))?
                        .ok_or(PaymentError::IntentNotFound)?;
                }
            }
        }

        Err(PaymentError::Internal(anyhow::anyhow!(
            "payment intent {} kept changing during a status update",
            intent.id
        )))
    }
}

fn status_response(
    intent: &PaymentIntentEntity,
    status: PaymentStatus,
    already_processed: bool,
) -> PaymentStatusResponse {
    PaymentStatusResponse {
        success: status != PaymentStatus::Failed,
        payment_intent_id: intent.id,
        status,
        already_processed,
        processed: status == PaymentStatus::Succeeded,
        redirect_url: intent
            .redirect_url
            .clone()
            .filter(|_| status == PaymentStatus::RequiresAction),
        error: intent.last_error.clone().filter(|_| status == PaymentStatus::Failed),
    }
}

#[async_trait]
impl<I, P, K, S, L, G> Checkout for PaymentUseCase<I, P, K, S, L, G>
where
    I: PaymentIntentRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    G: PaymentGateway + 'static,
{
    async fn open_intent(
        &self,
        user_id: Uuid,
        target: PaymentTarget,
        amount_minor: i32,
        currency: String,
        description: String,
    ) -> Result<PaymentIntentEntity, PaymentError> {
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        match target {
            PaymentTarget::Subscription { plan_id, .. } => {
                metadata.insert("plan_id".to_string(), plan_id.to_string());
            }
            PaymentTarget::CreditPackage { package_id } => {
                metadata.insert("package_id".to_string(), package_id.to_string());
            }
        }

        let provider = self
            .gateway
            .create_intent(amount_minor, currency.clone(), description, metadata)
            .await
            .map_err(unavailable)?;

        let intent = self
            .intent_repo
            .create_intent(InsertPaymentIntentEntity::new(
                user_id,
                &target,
                amount_minor,
                &currency,
                Some(provider.id.clone()),
            ))
            .await
            .map_err(internal("failed to store payment intent"))?;

        info!(
            intent_id = %intent.id,
            provider_intent_id = %provider.id,
            %user_id,
            amount_minor,
            %currency,
            "payments: payment intent created"
        );

        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitlements::{
        domain::{
            entities::{credit_packages::CreditPackageEntity, plans::PlanEntity},
            repositories::{
                credit_ledger::MockCreditLedgerRepository,
                credit_packages::MockCreditPackageRepository,
                plans::MockPlanRepository, subscriptions::MockSubscriptionRepository,
            },
            value_objects::{
                enums::{
                    billing_cycles::BillingCycle, credit_types::CreditType,
                    payment_methods::PaymentMethodKind, plan_tiers::PlanTier,
                    user_roles::UserRole,
                },
                iam::AdminAllowlist,
                payments::CardDetails,
                plans::PlanLimits,
            },
        },
        infra::memory::InMemoryStore,
    };

    type UseCase = PaymentUseCase<
        InMemoryStore,
        InMemoryStore,
        InMemoryStore,
        InMemoryStore,
        InMemoryStore,
        MockPaymentGateway,
    >;

    fn session() -> SessionContext {
        SessionContext::new(
            Uuid::new_v4(),
            Some("hr@acme.ph".to_string()),
            UserRole::EmployerAdmin,
            &AdminAllowlist::default(),
        )
    }

    fn usecase(store: &InMemoryStore, gateway: MockPaymentGateway) -> UseCase {
        let store = Arc::new(store.clone());
        PaymentUseCase::new(
            Arc::clone(&store),
            Arc::clone(&store),
            Arc::clone(&store),
            Arc::clone(&store),
            Arc::clone(&store),
            Arc::new(gateway),
            "https://jobs.example/payment/return".to_string(),
        )
    }

    fn provider(status: &str, redirect_url: Option<&str>, last_error: Option<&str>) -> ProviderIntent {
        ProviderIntent {
            id: "pi_test".to_string(),
            status: status.to_string(),
            redirect_url: redirect_url.map(str::to_string),
            last_error: last_error.map(str::to_string),
        }
    }

    fn package() -> CreditPackageEntity {
        CreditPackageEntity {
            id: Uuid::new_v4(),
            name: "10 resume views".to_string(),
            credit_type: CreditType::ResumeView.to_string(),
            credit_amount: 10,
            bonus_credits: 2,
            price_minor: 49900,
            currency: "PHP".to_string(),
            validity_days: Some(30),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn premium_plan() -> PlanEntity {
        PlanEntity {
            id: Uuid::new_v4(),
            name: "Premium".to_string(),
            tier: PlanTier::Premium,
            price_monthly_minor: 149900,
            price_yearly_minor: 1499000,
            currency: "PHP".to_string(),
            limits: PlanLimits::default(),
            is_active: true,
        }
    }

    async fn open_package_intent(
        store: &InMemoryStore,
        session: &SessionContext,
        package: &CreditPackageEntity,
    ) -> PaymentIntentEntity {
        store.insert_package(package.clone()).await;
        store
            .create_intent(InsertPaymentIntentEntity::new(
                session.user_id,
                &PaymentTarget::CreditPackage {
                    package_id: package.id,
                },
                package.price_minor,
                "PHP",
                Some("pi_test".to_string()),
            ))
            .await
            .unwrap()
    }

    fn card() -> PaymentMethodDetails {
        PaymentMethodDetails::Card(CardDetails {
            card_number: "4343434343434345".to_string(),
            exp_month: 12,
            exp_year: 2030,
            cvc: "123".to_string(),
        })
    }

    #[tokio::test]
    async fn test_card_success_fulfils_package_immediately() {
        let store = InMemoryStore::new();
        let session = session();
        let package = package();
        let intent = open_package_intent(&store, &session, &package).await;

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_attach()
            .withf(|intent_id, method_id, return_url| {
                intent_id == "pi_test"
                    && method_id == "pm_card"
                    && return_url == "https://jobs.example/payment/return"
            })
            .times(1)
            .returning(|_, _, _| Ok(provider("succeeded", None, None)));

        let response = usecase(&store, gateway)
            .process(
                &session,
                ProcessPaymentRequest {
                    payment_intent_id: intent.id,
                    payment_method_id: "pm_card".to_string(),
                    method_type: None,
                    return_url: None,
                },
            )
            .await
            .unwrap();

        assert!(response.processed);
        assert_eq!(response.status, PaymentStatus::Succeeded);

        let balance = store
            .find_balance(session.user_id, CreditType::ResumeView)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.balance, 12);
        assert!(balance.expires_at.is_some());
        assert!(
            PaymentIntentRepository::find_by_id(&store, intent.id)
                .await
                .unwrap()
                .unwrap()
                .is_fulfilled()
        );
    }

    #[tokio::test]
    async fn test_gcash_requires_action_then_settles_once_on_repeated_checks() {
        let store = InMemoryStore::new();
        let session = session();
        let package = package();
        let intent = open_package_intent(&store, &session, &package).await;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_attach().times(1).returning(|_, _, _| {
            Ok(provider(
                "awaiting_next_action",
                Some("https://pm.link/gcash/auth"),
                None,
            ))
        });
        gateway
            .expect_retrieve()
            .times(1)
            .returning(|_| Ok(provider("succeeded", None, None)));

        let usecase = usecase(&store, gateway);
        let processed = usecase
            .process(
                &session,
                ProcessPaymentRequest {
                    payment_intent_id: intent.id,
                    payment_method_id: "pm_gcash".to_string(),
                    method_type: Some(PaymentMethodKind::GCash),
                    return_url: Some("https://jobs.example/return".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(processed.requires_action);
        assert_eq!(
            PaymentIntentRepository::find_by_id(&store, intent.id)
                .await
                .unwrap()
                .unwrap()
                .method_kind
                .as_deref(),
            Some("gcash")
        );
        assert_eq!(processed.redirect_url.as_deref(), Some("https://pm.link/gcash/auth"));
        assert!(store
            .find_balance(session.user_id, CreditType::ResumeView)
            .await
            .unwrap()
            .is_none());

        let first = usecase.check_status(&session, intent.id).await.unwrap();
        let second = usecase.check_status(&session, intent.id).await.unwrap();
        let third = usecase.check_status(&session, intent.id).await.unwrap();

        assert_eq!(first.status, PaymentStatus::Succeeded);
        assert!(!first.already_processed);
        assert!(second.already_processed);
        assert_eq!(second, third);

        let balance = store
            .find_balance(session.user_id, CreditType::ResumeView)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.total, 12);
        assert_eq!(
            store.list_transactions(session.user_id, 10).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_declined_payment_is_terminal() {
        let store = InMemoryStore::new();
        let session = session();
        let intent = open_package_intent(&store, &session, &package()).await;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_attach().times(1).returning(|_, _, _| {
            Ok(provider(
                "awaiting_payment_method",
                None,
                Some("Card was declined."),
            ))
        });

        let usecase = usecase(&store, gateway);
        let result = usecase
            .process(
                &session,
                ProcessPaymentRequest {
                    payment_intent_id: intent.id,
                    payment_method_id: "pm_card".to_string(),
                    method_type: None,
                    return_url: None,
                },
            )
            .await;

        assert!(matches!(result, Err(PaymentError::Processing(ref reason)) if reason == "Card was declined."));

        let retried = usecase
            .process(
                &session,
                ProcessPaymentRequest {
                    payment_intent_id: intent.id,
                    payment_method_id: "pm_other".to_string(),
                    method_type: None,
                    return_url: None,
                },
            )
            .await;
        assert!(matches!(
            retried,
            Err(PaymentError::InvalidState(PaymentStatus::Failed))
        ));
    }

    #[tokio::test]
    async fn test_rejected_card_details_surface_provider_message() {
        let store = InMemoryStore::new();
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_payment_method().times(1).returning(|_, _| {
            Err(ProviderError::Rejected {
                status: 400,
                code: Some("parameter_invalid".to_string()),
                message: "details.card_number format is invalid.".to_string(),
            })
        });

        let result = usecase(&store, gateway)
            .create_payment_method(
                &session(),
                CreatePaymentMethodRequest {
                    details: card(),
                    billing: None,
                },
            )
            .await;

        match result {
            Err(err @ PaymentError::PaymentMethod(_)) => {
                assert_eq!(err.to_string(), "details.card_number format is invalid.");
                assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_users_cannot_see_an_intent() {
        let store = InMemoryStore::new();
        let owner = session();
        let intent = open_package_intent(&store, &owner, &package()).await;

        let result = usecase(&store, MockPaymentGateway::new())
            .check_status(&session(), intent.id)
            .await;

        assert!(matches!(result, Err(PaymentError::IntentNotFound)));
    }

    #[tokio::test]
    async fn test_webhook_activates_subscription_once() {
        let store = InMemoryStore::new();
        let session = session();
        let plan = premium_plan();
        store.insert_plan(plan.clone()).await;
        let intent = store
            .create_intent(InsertPaymentIntentEntity::new(
                session.user_id,
                &PaymentTarget::Subscription {
                    plan_id: plan.id,
                    billing_cycle: BillingCycle::Monthly,
                },
                plan.price_monthly_minor,
                "PHP",
                Some("pi_sub".to_string()),
            ))
            .await
            .unwrap();
        store
            .update_intent(
                intent.id,
                PaymentStatus::Created,
                UpdatePaymentIntentEntity::status(PaymentStatus::RequiresAction)
                    .with_redirect_url("https://pm.link/gcash/auth"),
            )
            .await
            .unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_webhook().times(2).returning(|payload, _| {
            Ok(serde_json::from_slice(payload).unwrap())
        });

        let payload = serde_json::to_vec(&serde_json::json!({
            "data": {
                "id": "evt_1",
                "attributes": {
                    "type": "payment.paid",
                    "livemode": false,
                    "data": { "id": "pay_1", "attributes": { "payment_intent_id": "pi_sub" } }
                }
            }
        }))
        .unwrap();

        let usecase = usecase(&store, gateway);
        usecase.handle_webhook(&payload, "t=1,te=abc,li=").await.unwrap();
        usecase.handle_webhook(&payload, "t=1,te=abc,li=").await.unwrap();

        let active = store
            .find_active_subscription(session.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.tier(), PlanTier::Premium);
        assert_eq!(active.payment_intent_id, Some(intent.id));

        let status = usecase.check_status(&session, intent.id).await.unwrap();
        assert!(status.already_processed);
    }

    fn webhook_payload(event_type: &str, provider_intent_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "data": {
                "id": "evt_late",
                "attributes": {
                    "type": event_type,
                    "livemode": false,
                    "data": { "id": "pay_late", "attributes": { "payment_intent_id": provider_intent_id } }
                }
            }
        }))
        .unwrap()
    }

    fn passthrough_webhooks(gateway: &mut MockPaymentGateway) {
        gateway
            .expect_verify_webhook()
            .returning(|payload, _| Ok(serde_json::from_slice(payload).unwrap()));
    }

    fn card_request(intent_id: Uuid) -> ProcessPaymentRequest {
        ProcessPaymentRequest {
            payment_intent_id: intent_id,
            payment_method_id: "pm_card".to_string(),
            method_type: None,
            return_url: None,
        }
    }

    #[tokio::test]
    async fn test_provider_outage_during_attach_keeps_intent_open_for_paid_webhook() {
        let store = InMemoryStore::new();
        let session = session();
        let intent = open_package_intent(&store, &session, &package()).await;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_attach().times(1).returning(|_, _, _| {
            Err(ProviderError::Unavailable {
                status: 504,
                message: "attach payment method failed with status 504 Gateway Timeout".to_string(),
            })
        });
        passthrough_webhooks(&mut gateway);

        let usecase = usecase(&store, gateway);
        let result = usecase.process(&session, card_request(intent.id)).await;

        assert!(matches!(result, Err(PaymentError::ProviderUnavailable(_))));
        let stored = PaymentIntentRepository::find_by_id(&store, intent.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), PaymentStatus::MethodAttached);

        usecase
            .handle_webhook(&webhook_payload("payment.paid", "pi_test"), "t=1,te=abc,li=")
            .await
            .unwrap();

        let status = usecase.check_status(&session, intent.id).await.unwrap();
        assert_eq!(status.status, PaymentStatus::Succeeded);
        assert!(status.already_processed);
        let balance = store
            .find_balance(session.user_id, CreditType::ResumeView)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.balance, 12);
    }

    #[tokio::test]
    async fn test_paid_webhook_after_local_failure_still_fulfils() {
        let store = InMemoryStore::new();
        let session = session();
        let intent = open_package_intent(&store, &session, &package()).await;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_attach().times(1).returning(|_, _, _| {
            Err(ProviderError::Rejected {
                status: 400,
                code: Some("resource_failed_state".to_string()),
                message: "The payment could not be processed.".to_string(),
            })
        });
        passthrough_webhooks(&mut gateway);

        let usecase = usecase(&store, gateway);
        let result = usecase.process(&session, card_request(intent.id)).await;
        assert!(matches!(result, Err(PaymentError::Processing(_))));

        for _ in 0..2 {
            usecase
                .handle_webhook(&webhook_payload("payment.paid", "pi_test"), "t=1,te=abc,li=")
                .await
                .unwrap();
        }

        let stored = PaymentIntentRepository::find_by_id(&store, intent.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), PaymentStatus::Succeeded);
        assert!(stored.is_fulfilled());
        assert_eq!(
            store.list_transactions(session.user_id, 10).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_status_check_recovers_failed_intent_the_provider_settled() {
        let store = InMemoryStore::new();
        let session = session();
        let intent = open_package_intent(&store, &session, &package()).await;
        store
            .update_intent(
                intent.id,
                PaymentStatus::Created,
                UpdatePaymentIntentEntity::status(PaymentStatus::Failed).with_error("timeout"),
            )
            .await
            .unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_retrieve()
            .times(1)
            .returning(|_| Ok(provider("succeeded", None, None)));

        let status = usecase(&store, gateway)
            .check_status(&session, intent.id)
            .await
            .unwrap();

        assert_eq!(status.status, PaymentStatus::Succeeded);
        assert!(!status.already_processed);
        assert!(store
            .find_balance(session.user_id, CreditType::ResumeView)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_webhook_losing_race_to_success_does_not_overwrite_it() {
        let user_id = Uuid::new_v4();
        let intent_id = Uuid::new_v4();
        let intent_in = move |status: PaymentStatus, fulfilled: bool| PaymentIntentEntity {
            id: intent_id,
            user_id,
            provider_intent_id: Some("pi_race".to_string()),
            target_kind: "credit_package".to_string(),
            plan_id: None,
            billing_cycle: None,
            package_id: Some(Uuid::new_v4()),
            amount_minor: 100,
            currency: "PHP".to_string(),
            status: status.to_string(),
            method_kind: None,
            redirect_url: None,
            last_error: None,
            fulfilled_at: fulfilled.then(Utc::now),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut intents = entitlements::domain::repositories::payment_intents::MockPaymentIntentRepository::new();
        intents
            .expect_find_by_provider_intent_id()
            .returning(move |_| Ok(Some(intent_in(PaymentStatus::Processing, false))));
        intents
            .expect_update_intent()
            .withf(|_, expected, _| *expected == PaymentStatus::Processing)
            .times(1)
            .returning(|_, _, _| Ok(None));
        intents
            .expect_find_by_id()
            .times(1)
            .returning(move |_| Ok(Some(intent_in(PaymentStatus::Succeeded, true))));

        let mut gateway = MockPaymentGateway::new();
        passthrough_webhooks(&mut gateway);

        let usecase = PaymentUseCase::new(
            Arc::new(intents),
            Arc::new(MockPlanRepository::new()),
            Arc::new(MockCreditPackageRepository::new()),
            Arc::new(MockSubscriptionRepository::new()),
            Arc::new(MockCreditLedgerRepository::new()),
            Arc::new(gateway),
            "https://jobs.example/return".to_string(),
        );

        usecase
            .handle_webhook(&webhook_payload("payment.failed", "pi_race"), "t=1,te=abc,li=")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_webhook_with_bad_signature_is_rejected() {
        let store = InMemoryStore::new();
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_verify_webhook()
            .returning(|_, _| Err(ProviderError::Signature("signature mismatch".to_string())));

        let result = usecase(&store, gateway).handle_webhook(b"{}", "t=1,te=00").await;

        assert!(matches!(result, Err(PaymentError::InvalidWebhook(_))));
    }

    #[tokio::test]
    async fn test_open_intent_records_provider_id() {
        let store = InMemoryStore::new();
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_intent()
            .withf(|amount, currency, _, metadata| {
                *amount == 49900 && currency == "PHP" && metadata.contains_key("package_id")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(provider("awaiting_payment_method", None, None)));

        let user_id = Uuid::new_v4();
        let intent = usecase(&store, gateway)
            .open_intent(
                user_id,
                PaymentTarget::CreditPackage {
                    package_id: Uuid::new_v4(),
                },
                49900,
                "PHP".to_string(),
                "10 resume views".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(intent.status(), PaymentStatus::Created);
        assert_eq!(intent.provider_intent_id.as_deref(), Some("pi_test"));
        assert_eq!(intent.user_id, user_id);
    }

    #[tokio::test]
    async fn test_mocked_repositories_are_used_for_fulfilment_failures() {
        let mut intents = entitlements::domain::repositories::payment_intents::MockPaymentIntentRepository::new();
        let user = session();
        let user_id = user.user_id;
        let package_id = Uuid::new_v4();
        intents.expect_find_by_id().returning(move |id| {
            Ok(Some(PaymentIntentEntity {
                id,
                user_id,
                provider_intent_id: Some("pi_test".to_string()),
                target_kind: "credit_package".to_string(),
                plan_id: None,
                billing_cycle: None,
                package_id: Some(package_id),
                amount_minor: 100,
                currency: "PHP".to_string(),
                status: PaymentStatus::Succeeded.to_string(),
                method_kind: None,
                redirect_url: None,
                last_error: None,
                fulfilled_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        let mut packages = MockCreditPackageRepository::new();
        packages.expect_find_by_id().returning(|_| Ok(None));

        let usecase = PaymentUseCase::new(
            Arc::new(intents),
            Arc::new(MockPlanRepository::new()),
            Arc::new(packages),
            Arc::new(MockSubscriptionRepository::new()),
            Arc::new(MockCreditLedgerRepository::new()),
            Arc::new(MockPaymentGateway::new()),
            "https://jobs.example/return".to_string(),
        );

        let result = usecase.check_status(&user, Uuid::new_v4()).await;

        assert!(matches!(result, Err(PaymentError::Internal(_))));
    }
}
