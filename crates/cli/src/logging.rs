// Console logging for the runner: level from CONSOLE_LOG_LEVEL, JSON lines when LOG_FORMAT=json
use std::env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init_logging() {
    let console_log_level = env::var("CONSOLE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    // Everything else at warn, our own crates at the requested level
    let env_filter = EnvFilter::try_new(format!(
        "warn,nordnet_holdings_core={console_log_level},nordnet_holdings={console_log_level}"
    ))
    .unwrap_or_else(|_| EnvFilter::new("warn,nordnet_holdings_core=info,nordnet_holdings=info"));

    let console_layer = if json {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer().pretty().with_filter(env_filter).boxed()
    };

    tracing_subscriber::registry().with(console_layer).init();
}
