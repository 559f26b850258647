use entitlements::domain::value_objects::iam::AdminAllowlist;

use crate::config::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub backend_server: BackendServer,
    pub database: Database,
    pub auth: AuthSettings,
    pub paymongo: PayMongo,
    pub billing: Billing,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

/// Everything the session extractor needs. Shared with handlers through a
/// request extension.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub admins: AdminAllowlist,
}

#[derive(Clone)]
pub struct PayMongo {
    pub secret_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub return_url: String,
    pub webhook_tolerance_secs: i64,
}

// Keys stay out of logs.
impl std::fmt::Debug for PayMongo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayMongo")
            .field("base_url", &self.base_url)
            .field("return_url", &self.return_url)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Billing {
    pub transactions_page_limit: i64,
}
