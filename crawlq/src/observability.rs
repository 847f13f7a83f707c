use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global tracing subscriber. The filter comes from `RUST_LOG` and
/// falls back to `info`.
///
/// Fails if a global subscriber is already set.
pub fn try_init_tracing() -> anyhow::Result<()> {
    let formatting_layer = fmt::layer().with_target(true).compact();
    let subscriber = Registry::default().with(env_filter()).with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Like [`try_init_tracing`], but a second call is a no-op.
pub fn init_tracing() {
    if try_init_tracing().is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_error() {
        init_tracing();
        assert!(try_init_tracing().is_err());
        // and does not panic
        init_tracing();
    }
}
