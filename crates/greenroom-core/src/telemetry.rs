//! Tracing initialisation shared by the `greenroom` and `greenroomd` binaries.
//!
//! Logs go to stderr so that stdout stays free for command output (results,
//! streamed progress). Subsequent calls are ignored; the global subscriber can
//! only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "GREENROOM_LOG";

/// Default directives: `level` for our crates, transport crates kept at warn.
fn default_directives(level: Level) -> String {
    format!("{level},hyper=warn,hyper_util=warn,reqwest=warn,h2=warn,tower_http=warn")
        .to_lowercase()
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Initialise the global tracing subscriber.
///
/// * `json`: newline-delimited JSON instead of human-readable lines.
/// * `level`: default verbosity when neither `GREENROOM_LOG` nor `RUST_LOG`
///   is set.
pub fn init_tracing(json: bool, level: Level) {
    let filter = env_filter(level);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_transport() {
        let d = default_directives(Level::DEBUG);
        assert!(d.starts_with("debug,"));
        assert!(d.contains("hyper=warn"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
