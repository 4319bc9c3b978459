//! Process-wide tracing setup. Installed once at startup from `main`.

use tracing_appender::non_blocking::WorkerGuard;

/// Initializes the global `tracing` subscriber with a rolling file writer
/// under the platform config directory, filtered by `RUST_LOG` (default
/// `info`). The returned guard must be kept alive for the duration of the
/// process; dropping it stops the background flush thread.
pub fn init() -> WorkerGuard {
    let log_dir = crate::config::config_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "post-lens.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();

    if let Err(e) = result {
        eprintln!("tracing subscriber already initialized: {e}");
    }

    guard
}
