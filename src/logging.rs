use tracing_subscriber::EnvFilter;

/// Filter directives: `RUST_LOG` wins, then `JOTTY_HUB_LOG`, then the
/// configured level.
pub fn log_filter(configured: &str) -> EnvFilter {
    let level = if let Ok(v) = std::env::var("RUST_LOG") {
        v
    } else if let Ok(v) = std::env::var("JOTTY_HUB_LOG") {
        match v.as_str() {
            "silent" => "off".to_string(),
            other => other.to_string(),
        }
    } else if configured.trim().is_empty() {
        "info".to_string()
    } else {
        configured.trim().to_string()
    };

    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the stderr subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init(configured: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(configured))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
