use tracing_subscriber::{
    fmt::{format, time::ChronoLocal},
    EnvFilter,
};

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_log() {
    let format = format::format()
        .with_level(true)
        .with_target(false)
        .with_timer(ChronoLocal::new("[%m-%d %H:%M:%S%.3f]".to_string()))
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a second call (tests, embedding hosts) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).event_format(format).try_init();
}
