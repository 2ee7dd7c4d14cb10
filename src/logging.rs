use tracing_subscriber::EnvFilter;

/// Directives applied when `RUST_LOG` is unset. Networking crates are noisy at info.
const DEFAULT_FILTER: &str = "info,rustls=warn,electrum_client=warn,lwk_wollet=warn";

/// Install the global fmt subscriber. `log` records from the SDK are captured
/// through tracing-log.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
