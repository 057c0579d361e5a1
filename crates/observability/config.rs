use std::env;

#[derive(Clone)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    pub(crate) log_format: LogFormat,
    /// Warnings captured during config parsing so they can be logged after tracing is initialized.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        let component = component.trim().to_string();

        let service_name = env_string("SERVICE_NAME")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| component.clone());

        let environment = env_string("STAGE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let mut warnings = Vec::new();
        let log_format = match env_string("LOG_FORMAT") {
            Some(raw) if !raw.trim().is_empty() => parse_log_format(&raw).unwrap_or_else(|| {
                warnings.push(format!(
                    "LOG_FORMAT is invalid (value: {raw}); defaulting to text"
                ));
                LogFormat::Text
            }),
            _ => LogFormat::Text,
        };

        Self {
            service_context: ServiceContext {
                service_name,
                environment,
                component,
            },
            log_format,
            warnings,
        }
    }
}

pub(crate) fn parse_log_format(input: &str) -> Option<LogFormat> {
    match input.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "text" | "pretty" | "plain" => Some(LogFormat::Text),
        _ => None,
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_formats() {
        assert_eq!(parse_log_format("JSON"), Some(LogFormat::Json));
        assert_eq!(parse_log_format(" text "), Some(LogFormat::Text));
        assert_eq!(parse_log_format("yaml"), None);
    }
}
