//! Tracing setup.
//!
//! `LOG_LEVEL` holds `EnvFilter` directives (falls back to `DEFAULT_DIRECTIVES`),
//! `LOG_FORMAT` picks `json` or `pretty` output. Targets used across the crate:
//! `socratic_tutor` (server), `dialogue` (controller), `oracle` (adapters).

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,socratic_tutor=debug,dialogue=debug,oracle=info,tower_http=info,axum=info";

#[derive(Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // The two builders have different types, so each arm initializes its own.
    match LogFormat::parse(std::env::var("LOG_FORMAT").ok().as_deref()) {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
