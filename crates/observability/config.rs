use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    pub(crate) format: LogFormat,
    /// Collected while parsing and logged once the subscriber is installed.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        let component = component.trim().to_string();
        let mut warnings = Vec::new();

        let service_name = env_string("SERVICE_NAME").unwrap_or_else(|| component.clone());
        let environment = env_string("STAGE").unwrap_or_else(|| "unknown".to_string());

        let format = match env_string("LOG_FORMAT") {
            Some(raw) => parse_format(&raw).unwrap_or_else(|| {
                warnings.push(format!(
                    "LOG_FORMAT is invalid (value: {raw}); defaulting to pretty"
                ));
                LogFormat::Pretty
            }),
            None => LogFormat::Pretty,
        };

        Self {
            service_context: ServiceContext {
                service_name,
                environment,
                component,
            },
            format,
            warnings,
        }
    }
}

fn parse_format(input: &str) -> Option<LogFormat> {
    match input.trim().to_ascii_lowercase().as_str() {
        "pretty" | "text" | "plain" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
