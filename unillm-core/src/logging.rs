//! Tracing subscriber bootstrap

use crate::config::LoggingSettings;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over the configured level; disabled logging
/// installs an `off` filter. Returns `false` when a global subscriber was
/// already set, leaving it in place.
pub fn init_tracing(settings: &LoggingSettings) -> bool {
    let filter = if settings.enabled {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("off")
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %settings.level, "Tracing initialized");
    }

    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        let settings = LoggingSettings::default();
        // The first call may lose to another test; the second always fails
        let _ = init_tracing(&settings);
        assert!(!init_tracing(&settings));
    }
}
