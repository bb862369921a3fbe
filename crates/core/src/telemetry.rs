use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Filtering is controlled with
/// RUST_LOG; the default level is info.
pub fn setup_logging() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	// try_init so tests that race to install a subscriber do not panic
	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.try_init();
}
