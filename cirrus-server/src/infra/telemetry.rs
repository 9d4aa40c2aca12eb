use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Install the global subscriber. `RUST_LOG` wins; otherwise the configured
/// level applies with HTTP tracing kept at warn.
pub fn init_tracing(level: &str) {
    let fallback = format!("{level},tower_http=warn");
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&fallback))
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
