use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use entitlements::{
    domain::{
        repositories::{
            credit_ledger::CreditLedgerRepository, credit_packages::CreditPackageRepository,
        },
        value_objects::credits::{
            BalanceQuery, ConsumeCreditsRequest, GrantCreditsRequest, PurchaseCreditsRequest,
            TransactionsQuery,
        },
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{credit_ledger::CreditLedgerPostgres, credit_packages::CreditPackagePostgres},
    },
};
use tracing::info;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::AppError,
    usecases::{credits::CreditUseCase, payments::Checkout},
};

pub fn routes<C>(db_pool: Arc<PgPoolSquad>, checkout: Arc<C>, transactions_limit: i64) -> Router
where
    C: Checkout + 'static,
{
    let ledger_repository = CreditLedgerPostgres::new(Arc::clone(&db_pool));
    let package_repository = CreditPackagePostgres::new(Arc::clone(&db_pool));
    let credits_usecase = CreditUseCase::new(
        Arc::new(ledger_repository),
        Arc::new(package_repository),
        checkout,
        transactions_limit,
    );

    router(Arc::new(credits_usecase))
}

pub fn router<L, K, C>(usecase: Arc<CreditUseCase<L, K, C>>) -> Router
where
    L: CreditLedgerRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    Router::new()
        .route("/balance", get(balance))
        .route("/consume", post(consume))
        .route("/packages", get(packages))
        .route("/purchase", post(purchase))
        .route("/transactions", get(transactions))
        .route("/grant", post(grant))
        .with_state(usecase)
}

pub async fn balance<L, K, C>(
    State(usecase): State<Arc<CreditUseCase<L, K, C>>>,
    auth: AuthUser,
    Query(query): Query<BalanceQuery>,
) -> impl IntoResponse
where
    L: CreditLedgerRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    match usecase.get_balances(auth.session(), query.credit_type).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn consume<L, K, C>(
    State(usecase): State<Arc<CreditUseCase<L, K, C>>>,
    auth: AuthUser,
    Json(request): Json<ConsumeCreditsRequest>,
) -> impl IntoResponse
where
    L: CreditLedgerRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    match usecase.consume(auth.session(), request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn packages<L, K, C>(
    State(usecase): State<Arc<CreditUseCase<L, K, C>>>,
    _auth: AuthUser,
) -> impl IntoResponse
where
    L: CreditLedgerRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    match usecase.list_packages().await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn purchase<L, K, C>(
    State(usecase): State<Arc<CreditUseCase<L, K, C>>>,
    auth: AuthUser,
    Json(request): Json<PurchaseCreditsRequest>,
) -> impl IntoResponse
where
    L: CreditLedgerRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    info!(user_id = %auth.session().user_id, package_id = %request.package_id, "credits: purchase request received");

    match usecase.purchase(auth.session(), request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn transactions<L, K, C>(
    State(usecase): State<Arc<CreditUseCase<L, K, C>>>,
    auth: AuthUser,
    Query(query): Query<TransactionsQuery>,
) -> impl IntoResponse
where
    L: CreditLedgerRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    match usecase.transactions(auth.session(), query.limit).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn grant<L, K, C>(
    State(usecase): State<Arc<CreditUseCase<L, K, C>>>,
    auth: AuthUser,
    Json(request): Json<GrantCreditsRequest>,
) -> impl IntoResponse
where
    L: CreditLedgerRepository + Send + Sync + 'static,
    K: CreditPackageRepository + Send + Sync + 'static,
    C: Checkout + 'static,
{
    match usecase.grant(auth.session(), request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        axum_http::routers::test_support::{bearer, with_auth},
        usecases::payments::MockCheckout,
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE},
    };
    use entitlements::{
        domain::value_objects::enums::credit_types::CreditType, infra::memory::InMemoryStore,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app(store: &InMemoryStore) -> Router {
        let store = Arc::new(store.clone());
        let usecase = CreditUseCase::new(
            Arc::clone(&store),
            store,
            Arc::new(MockCheckout::new()),
            50,
        );
        with_auth(Router::new().nest("/api/credits", router(Arc::new(usecase))))
    }

    fn consume_request(user_id: Uuid) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/credits/consume")
            .header(AUTHORIZATION, bearer(user_id, None))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"creditType":"ai_credit","amount":1}"#))
            .unwrap()
    }

    #[tokio::test]
    async fn test_consume_then_insufficient_over_http() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .credit(user_id, CreditType::AiCredit, 1, None, None)
            .await
            .unwrap();
        let app = app(&store);

        let ok = app.clone().oneshot(consume_request(user_id)).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(ok.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["balance"], 0);

        let rejected = app.oneshot(consume_request(user_id)).await.unwrap();
        assert_eq!(rejected.status(), StatusCode::PAYMENT_REQUIRED);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(rejected.into_body(), usize::MAX).await.unwrap())
                .unwrap();
        assert_eq!(body["code"], "INSUFFICIENT_CREDITS");
        assert_eq!(body["available"], 0);
    }

    #[tokio::test]
    async fn test_balance_filter_by_type() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .credit(user_id, CreditType::ResumeView, 7, None, None)
            .await
            .unwrap();

        let response = app(&store)
            .oneshot(
                Request::builder()
                    .uri("/api/credits/balance?creditType=resume_view")
                    .header(AUTHORIZATION, bearer(user_id, None))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
                .unwrap();
        assert_eq!(body["balances"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["balances"][0]["balance"], 7);
    }

    #[tokio::test]
    async fn test_grant_requires_admin() {
        let store = InMemoryStore::new();
        let target = Uuid::new_v4();
        let grant = |email: Option<&str>| {
            Request::builder()
                .method("POST")
                .uri("/api/credits/grant")
                .header(AUTHORIZATION, bearer(Uuid::new_v4(), email))
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(format!(
                    r#"{{"userId":"{target}","creditType":"job_posting","amount":3}}"#
                )))
                .unwrap()
        };

        let denied = app(&store).oneshot(grant(Some("hr@acme.ph"))).await.unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let granted = app(&store)
            .oneshot(grant(Some("ops@staff.jobs.ph")))
            .await
            .unwrap();
        assert_eq!(granted.status(), StatusCode::OK);
        assert_eq!(
            store
                .find_balance(target, CreditType::JobPosting)
                .await
                .unwrap()
                .map(|row| row.balance),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_requests_without_token_are_unauthorized() {
        let response = app(&InMemoryStore::new())
            .oneshot(
                Request::builder()
                    .uri("/api/credits/balance")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
