use crate::error::InjectorResult;
pub use tracing::instrument;
pub use tracing::{debug, error, info, trace, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/* 📖 # Why log to stderr?
The CLI prints listings and resolved URLs on stdout so they can be piped into
other tools. Diagnostics go to stderr to keep that output clean.
*/

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() -> InjectorResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| crate::err!("Failed to initialize tracing: {}", e))?;
    Ok(())
}
