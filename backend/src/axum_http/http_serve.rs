use crate::{
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
    usecases::payments::PaymentUseCase,
};
use anyhow::Result;
use axum::{
    Extension, Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use entitlements::{
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            credit_ledger::CreditLedgerPostgres, credit_packages::CreditPackagePostgres,
            payment_intents::PaymentIntentPostgres, plans::PlanPostgres,
            subscriptions::SubscriptionPostgres,
        },
    },
    payments::paymongo_client::PayMongoClient,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

pub fn app(config: &DotEnvyConfig, db_pool: Arc<PgPoolSquad>, gateway: Arc<PayMongoClient>) -> Result<Router> {
    let payments_usecase = Arc::new(PaymentUseCase::new(
        Arc::new(PaymentIntentPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PlanPostgres::new(Arc::clone(&db_pool))),
        Arc::new(CreditPackagePostgres::new(Arc::clone(&db_pool))),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(CreditLedgerPostgres::new(Arc::clone(&db_pool))),
        gateway,
        config.paymongo.return_url.clone(),
    ));

    let router = Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/api/credits",
            routers::credits::routes(
                Arc::clone(&db_pool),
                Arc::clone(&payments_usecase),
                config.billing.transactions_page_limit,
            ),
        )
        .nest(
            "/api/subscription",
            routers::subscriptions::routes(Arc::clone(&db_pool), Arc::clone(&payments_usecase)),
        )
        .nest("/api/payment", routers::payments::routes(payments_usecase))
        .nest("/api/entitlements", routers::entitlements::routes(Arc::clone(&db_pool)))
        .route("/api/health-check", get(default_routers::health_check))
        .layer(Extension(Arc::new(config.auth.clone())))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.backend_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

pub async fn start(
    config: Arc<DotEnvyConfig>,
    db_pool: Arc<PgPoolSquad>,
    gateway: Arc<PayMongoClient>,
) -> Result<()> {
    let app = app(&config, db_pool, gateway)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = config.backend_server.port, stage = %config.stage, "http: server is running");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "http: failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "http: failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("http: received ctrl+C signal"),
        _ = terminate => info!("http: received terminate signal"),
    }
}
