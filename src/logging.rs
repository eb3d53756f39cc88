//! Process-wide tracing setup. `RUST_LOG` wins over the passed default.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Call once, early in main.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
