use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use entitlements::{
    domain::repositories::{
        credit_ledger::CreditLedgerRepository, plans::PlanRepository,
        subscriptions::SubscriptionRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            credit_ledger::CreditLedgerPostgres, plans::PlanPostgres,
            subscriptions::SubscriptionPostgres,
        },
    },
};

use crate::{
    auth::AuthUser, axum_http::error_responses::AppError,
    usecases::feature_gate::EntitlementsUseCase,
};

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let plan_repository = PlanPostgres::new(Arc::clone(&db_pool));
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let ledger_repository = CreditLedgerPostgres::new(Arc::clone(&db_pool));
    let entitlements_usecase = EntitlementsUseCase::new(
        Arc::new(plan_repository),
        Arc::new(subscription_repository),
        Arc::new(ledger_repository),
    );

    router(Arc::new(entitlements_usecase))
}

pub fn router<P, S, L>(usecase: Arc<EntitlementsUseCase<P, S, L>>) -> Router
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(list_entitlements))
        .with_state(usecase)
}

pub async fn list_entitlements<P, S, L>(
    State(usecase): State<Arc<EntitlementsUseCase<P, S, L>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
{
    match usecase.entitlements(auth.session()).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
