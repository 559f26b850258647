use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use entitlements::{
    domain::{
        repositories::{plans::PlanRepository, subscriptions::SubscriptionRepository},
        value_objects::subscriptions::SubscribeRequest,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{plans::PlanPostgres, subscriptions::SubscriptionPostgres},
    },
};
use tracing::info;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::AppError,
    usecases::{payments::Checkout, subscriptions::SubscriptionUseCase},
};

pub fn routes<C>(db_pool: Arc<PgPoolSquad>, checkout: Arc<C>) -> Router
where
    C: Checkout + 'static,
{
    let plan_repository = PlanPostgres::new(Arc::clone(&db_pool));
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let subscriptions_usecase = SubscriptionUseCase::new(
        Arc::new(plan_repository),
        Arc::new(subscription_repository),
        checkout,
    );

    router(Arc::new(subscriptions_usecase))
}

pub fn router<P, S, C>(usecase: Arc<SubscriptionUseCase<P, S, C>>) -> Router
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    Router::new()
        .route("/plans", get(list_plans))
        .route("/status", get(status))
        .route("/subscribe", post(subscribe))
        .route("/cancel", post(cancel_subscription))
        .with_state(usecase)
}

pub async fn list_plans<P, S, C>(
    State(usecase): State<Arc<SubscriptionUseCase<P, S, C>>>,
    _auth: AuthUser,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    match usecase.plans().await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn status<P, S, C>(
    State(usecase): State<Arc<SubscriptionUseCase<P, S, C>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    match usecase.status(auth.session()).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn subscribe<P, S, C>(
    State(usecase): State<Arc<SubscriptionUseCase<P, S, C>>>,
    auth: AuthUser,
    Json(request): Json<SubscribeRequest>,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    info!(
        user_id = %auth.session().user_id,
        plan_id = %request.plan_id,
        billing_cycle = %request.billing_cycle,
        "subscriptions: subscribe request received"
    );

    match usecase.subscribe(auth.session(), request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn cancel_subscription<P, S, C>(
    State(usecase): State<Arc<SubscriptionUseCase<P, S, C>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    match usecase.cancel(auth.session()).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
