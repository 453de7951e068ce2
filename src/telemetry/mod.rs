use once_cell::sync::OnceCell;
use std::io::{self, IsTerminal};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

#[derive(Debug, Error)]
pub enum TelemetryError {
	#[error("invalid log filter: {0}")]
	Filter(String),
	#[error("failed to install log subscriber: {0}")]
	Subscriber(String),
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Only the first successful call installs anything; later calls return
/// `Ok(())` and leave the installed filter as it is.
pub fn initialise(default_filter: &str) -> Result<(), TelemetryError> {
	TELEMETRY_GUARD.get_or_try_init(|| install_subscriber(default_filter)).map(|_| ())
}

fn install_subscriber(default_filter: &str) -> Result<(), TelemetryError> {
	let filter = match EnvFilter::try_from_default_env() {
		Ok(filter) => filter,
		Err(_) => EnvFilter::try_new(default_filter).map_err(|error| TelemetryError::Filter(error.to_string()))?,
	};

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(io::stderr)
		.with_ansi(io::stderr().is_terminal())
		.try_init()
		.map_err(|error| TelemetryError::Subscriber(error.to_string()))
}
