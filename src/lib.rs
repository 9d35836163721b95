//! A landing page with a mailing list signup.
//! Signups are checked against a proof token service and rate limited by IP and email
//! before they get appended to a Google spreadsheet.

pub mod app;
pub mod config;
mod error;
pub mod model;
pub mod recaptcha_client;
pub mod sheets;
pub mod templ_manager;
pub mod utils;
pub mod web;

// re-exports
pub use app::{serve, App, AppState};
pub use error::{Error, Result};
pub use recaptcha_client::RecaptchaClient;
pub use sheets::SheetsClient;

use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Human readable, compact logs for development. `RUST_LOG` overrides the default `debug` level.
pub fn init_dbg_tracing() {
    tracing_subscriber::fmt()
        .without_time()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(default_env_filter("debug"))
        .compact()
        .init();
}

/// Plain logs for production. `RUST_LOG` overrides the default `info` level.
pub fn init_production_tracing() {
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(default_env_filter("info"))
        .init();
}

fn default_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
