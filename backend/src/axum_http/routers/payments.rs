use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use entitlements::domain::{
    repositories::{
        credit_ledger::CreditLedgerRepository, credit_packages::CreditPackageRepository,
        payment_intents::PaymentIntentRepository, plans::PlanRepository,
        subscriptions::SubscriptionRepository,
    },
    value_objects::payments::{
        CreatePaymentMethodRequest, PaymentStatusQuery, ProcessPaymentRequest,
    },
};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    auth::AuthUser,
    axum_http::error_responses::AppError,
    usecases::payments::{PaymentGateway, PaymentUseCase},
};

pub const SIGNATURE_HEADER: &str = "paymongo-signature";

pub fn routes<I, P, K, S, L, G>(usecase: Arc<PaymentUseCase<I, P, K, S, L, G>>) -> Router
where
    I: PaymentIntentRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    G: PaymentGateway + 'static,
{
    Router::new()
        .route("/method", post(create_payment_method))
        .route("/process", post(process_payment).get(payment_status))
        .route("/webhook", post(webhook))
        .with_state(usecase)
}

pub async fn create_payment_method<I, P, K, S, L, G>(
    State(usecase): State<Arc<PaymentUseCase<I, P, K, S, L, G>>>,
    auth: AuthUser,
    Json(request): Json<CreatePaymentMethodRequest>,
) -> impl IntoResponse
where
    I: PaymentIntentRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    G: PaymentGateway + 'static,
{
    match usecase.create_payment_method(auth.session(), request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn process_payment<I, P, K, S, L, G>(
    State(usecase): State<Arc<PaymentUseCase<I, P, K, S, L, G>>>,
    auth: AuthUser,
    Json(request): Json<ProcessPaymentRequest>,
) -> impl IntoResponse
where
    I: PaymentIntentRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    G: PaymentGateway + 'static,
{
    info!(
        user_id = %auth.session().user_id,
        payment_intent_id = %request.payment_intent_id,
        "payments: process request received"
    );

    match usecase.process(auth.session(), request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn payment_status<I, P, K, S, L, G>(
    State(usecase): State<Arc<PaymentUseCase<I, P, K, S, L, G>>>,
    auth: AuthUser,
    Query(query): Query<PaymentStatusQuery>,
) -> impl IntoResponse
where
    I: PaymentIntentRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    G: PaymentGateway + 'static,
{
    match usecase
        .check_status(auth.session(), query.payment_intent_id)
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

/// Provider callback. Authenticated by signature, not by session.
pub async fn webhook<I, P, K, S, L, G>(
    State(usecase): State<Arc<PaymentUseCase<I, P, K, S, L, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
where
    I: PaymentIntentRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    G: PaymentGateway + 'static,
{
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        warn!("payments: webhook without signature header");
        return AppError::BadRequest("missing signature header".to_string()).into_response();
    };

    match usecase.handle_webhook(&body, signature).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
