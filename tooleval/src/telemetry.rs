//! Logging initialization

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize console logging for an evaluation run
///
/// The filter comes from `RUST_LOG`, falling back to `info`. Calling this
/// more than once is harmless; later calls return the first call's outcome.
///
/// # Example
/// ```
/// use tooleval::init_telemetry;
/// init_telemetry("tool-eval").expect("Failed to initialize telemetry");
/// ```
pub fn init_telemetry(service_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init()
            .map_err(|e| e.to_string())?;

        tracing::info!(service.name = service_name, "Telemetry initialized");
        Ok(())
    });

    outcome.clone().map_err(Into::into)
}
