use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Maps a configured level name onto a filter directive, defaulting to `warn`.
pub fn level_directive(level: Option<&str>) -> &'static str {
    match level.map(|l| l.to_lowercase()).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("error") => "error",
        _ => "warn",
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over the configured
/// level unless `--verbose` was given. Fails if a global subscriber is
/// already installed.
pub fn init_logging(level: Option<&str>, verbose: bool) -> Result<()> {
    let directive = level_directive(level);
    let filter = if verbose {
        EnvFilter::new(directive)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive(Some("DEBUG")), "debug");
        assert_eq!(level_directive(Some("loud")), "warn");
        assert_eq!(level_directive(None), "warn");
    }

    #[test]
    fn test_second_init_reports_failure() {
        // The first call may lose to another test in this binary
        let _ = init_logging(Some("info"), false);
        assert!(init_logging(Some("info"), false).is_err());
    }
}
