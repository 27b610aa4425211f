// src/logging.rs
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "donor_harvest=info,warn";

/// Filter used when `RUST_LOG` is unset: `-v` raises the crate to debug, `-vv` to trace.
pub fn default_filter(verbosity: u8) -> String {
    match verbosity {
        0 => DEFAULT_FILTER.to_string(),
        1 => "donor_harvest=debug,info".to_string(),
        _ => "donor_harvest=trace,debug".to_string(),
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbosity`.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_tracing(verbosity: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_crate_level() {
        assert_eq!(default_filter(0), "donor_harvest=info,warn");
        assert!(default_filter(1).starts_with("donor_harvest=debug"));
        assert!(default_filter(5).starts_with("donor_harvest=trace"));
    }
}
