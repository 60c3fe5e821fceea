//! Tracing setup for the worker binary.
//!
//! `RUST_LOG` controls the filter; without it the crate logs at `info`.
//! Set `VOCABFORGE_LOG_JSON=1` for machine-readable output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vocabforge=info,warn"));

    let json = std::env::var("VOCABFORGE_LOG_JSON").is_ok_and(|v| v == "1");
    let layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
}
