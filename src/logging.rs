//! Tracing subscriber setup for the `tutor` binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives (e.g. `debug`,
/// `subtitle_tutor_core=debug,info`).
pub const LOG_ENV: &str = "TUTOR_LOG";

/// Initialize logging to stderr.
///
/// Defaults to `warn` unless overridden by `TUTOR_LOG`. With `json`, each
/// event is written as one JSON object per line. Calling this twice is a
/// no-op.
pub fn init(json: bool) {
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV)
        .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}
