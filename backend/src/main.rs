use anyhow::Result;
use backend::axum_http::http_serve;
use backend::config::config_loader;
use entitlements::{
    infra::db::postgres::postgres_connection, payments::paymongo_client::PayMongoClient,
};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Backend exited with error: {:?}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    entitlements::observability::init_observability("backend")?;

    let dotenvy_env = config_loader::load()?;
    info!(stage = %dotenvy_env.stage, "ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.max_connections,
    )?;
    info!("Postgres connection has been established");

    let paymongo = PayMongoClient::with_base_url(
        &dotenvy_env.paymongo.base_url,
        dotenvy_env.paymongo.secret_key.clone(),
        dotenvy_env.paymongo.webhook_secret.clone(),
    )?
    .with_webhook_tolerance(dotenvy_env.paymongo.webhook_tolerance_secs);

    http_serve::start(
        Arc::new(dotenvy_env),
        Arc::new(postgres_pool),
        Arc::new(paymongo),
    )
    .await?;

    Ok(())
}
