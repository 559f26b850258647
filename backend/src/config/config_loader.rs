use anyhow::{Context, Result};
use entitlements::domain::value_objects::iam::AdminAllowlist;

use crate::config::{
    config_model::{AuthSettings, BackendServer, Billing, Database, DotEnvyConfig, PayMongo},
    stage::Stage,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = BackendServer {
        port: required("SERVER_PORT")?
            .parse()
            .context("SERVER_PORT is invalid")?,
        body_limit: optional("SERVER_BODY_LIMIT")
            .unwrap_or_else(|| "1".to_string())
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: optional("SERVER_TIMEOUT")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: optional("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS is invalid")?,
    };

    let auth = AuthSettings {
        jwt_secret: required("AUTH_JWT_SECRET")?,
        admins: AdminAllowlist::from_csv(
            &optional("ADMIN_EMAILS").unwrap_or_default(),
            &optional("ADMIN_DOMAINS").unwrap_or_default(),
        ),
    };

    let paymongo = PayMongo {
        secret_key: required("PAYMONGO_SECRET_KEY")?,
        webhook_secret: required("PAYMONGO_WEBHOOK_SECRET")?,
        base_url: optional("PAYMONGO_BASE_URL").unwrap_or_else(|| {
            entitlements::payments::paymongo_client::DEFAULT_BASE_URL.to_string()
        }),
        return_url: required("PAYMENT_RETURN_URL")?,
        webhook_tolerance_secs: match optional("PAYMONGO_WEBHOOK_TOLERANCE_SECS") {
            Some(value) => value
                .parse()
                .context("PAYMONGO_WEBHOOK_TOLERANCE_SECS is invalid")?,
            None => entitlements::payments::paymongo_client::DEFAULT_WEBHOOK_TOLERANCE_SECS,
        },
    };

    let billing = Billing {
        transactions_page_limit: optional("CREDIT_TRANSACTIONS_LIMIT")
            .unwrap_or_else(|| "50".to_string())
            .parse()
            .context("CREDIT_TRANSACTIONS_LIMIT is invalid")?,
    };

    Ok(DotEnvyConfig {
        stage: get_stage(),
        backend_server,
        database,
        auth,
        paymongo,
        billing,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(&stage_str).unwrap_or_default()
}

fn required(key: &str) -> Result<String> {
    optional(key).with_context(|| format!("{key} is not set"))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
