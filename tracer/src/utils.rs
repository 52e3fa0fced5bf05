use tracing_forest::ForestLayer;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// The default `Level` is `INFO`. It can be overridden with `RUST_LOG`.
/// Calling it again once a subscriber is installed is a no-op.
pub fn init_logger() {
    if cfg!(feature = "tracing-profile") || cfg!(feature = "perfetto") {
        use tracing_profile::init_tracing;
        match init_tracing() {
            // The guard flushes the profile when dropped; keep it for the
            // rest of the process.
            Ok(guard) => std::mem::forget(guard),
            Err(err) => eprintln!("failed to initialize tracing: {err:?}"),
        }
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(ForestLayer::default())
            .try_init();
    }
}
