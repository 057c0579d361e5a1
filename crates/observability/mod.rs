mod config;

use anyhow::Result;
use config::{LogFormat, ObservabilityConfig};
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global tracing subscriber. `RUST_LOG` overrides the `info` default and
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_observability(component: &str) -> Result<()> {
    let config = ObservabilityConfig::from_env(component);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Local time so `TZ=...` shows the offset in logs.
    let (text_layer, json_layer) = match config.log_format {
        LogFormat::Text => (
            Some(tracing_subscriber::fmt::layer().with_timer(ChronoLocal::rfc_3339())),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_timer(ChronoLocal::rfc_3339()),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(env_filter)
        .try_init()?;

    for warning in &config.warnings {
        warn!(
            service = %config.service_context.service_name,
            environment = %config.service_context.environment,
            component = %config.service_context.component,
            warning = %warning,
            "Observability config warning"
        );
    }

    info!(
        service = %config.service_context.service_name,
        environment = %config.service_context.environment,
        component = %config.service_context.component,
        log_format = ?config.log_format,
        "Observability initialized"
    );

    Ok(())
}
