//! Tracing subscriber for the PescaLead binaries.
//!
//! The lambda writes flattened JSON events so CloudWatch can index the
//! request fields; the local server prints the pretty format.

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Directives used when neither `RUST_LOG` nor the settings provide any.
pub const DEFAULT_DIRECTIVES: &str = "info,pescalead_handler=debug";

/// Dependencies that log every connection at debug level. They stay at
/// `warn` unless a directive names them.
const QUIET_TARGETS: [&str; 4] = ["hyper", "reqwest", "sqlx", "warp::filters"];

/// Output format of the log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi line human readable events.
    Pretty,
}

impl From<bool> for LogFormat {
    fn from(pretty: bool) -> Self {
        if pretty {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `directives`.
pub fn setup_logging(directives: &str, format: impl Into<LogFormat>) {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) if !env.trim().is_empty() => EnvFilter::new(filter_directives(&env)),
        _ => EnvFilter::new(filter_directives(directives)),
    };
    let registry = tracing_subscriber::registry().with(filter);

    match format.into() {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(UtcTime::rfc_3339()),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_timer(UtcTime::rfc_3339()),
            )
            .init(),
    }
}

/// Full directive list: the given one, or the default when blank, with the
/// noisy dependencies capped at `warn` unless already named.
pub fn filter_directives(directives: &str) -> String {
    let directives = match directives.trim() {
        "" => DEFAULT_DIRECTIVES,
        given => given,
    };
    let named: Vec<&str> = directives
        .split(',')
        .filter_map(|directive| directive.split('=').next())
        .map(str::trim)
        .collect();

    let mut filter = directives.to_string();
    for target in QUIET_TARGETS {
        if !named.contains(&target) {
            filter.push_str(&format!(",{target}=warn"));
        }
    }
    filter
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("", "info,pescalead_handler=debug,hyper=warn,reqwest=warn,sqlx=warn,warp::filters=warn"; "blank uses the default")]
    #[test_case("debug", "debug,hyper=warn,reqwest=warn,sqlx=warn,warp::filters=warn"; "level only")]
    #[test_case("info,sqlx=debug", "info,sqlx=debug,hyper=warn,reqwest=warn,warp::filters=warn"; "named targets are kept")]
    fn directives(given: &str, expected: &str) {
        assert_eq!(filter_directives(given), expected);
    }

    #[test]
    fn every_directive_parses() {
        for given in ["", "warn", DEFAULT_DIRECTIVES, "pescalead_handler::pipeline=trace"] {
            assert!(filter_directives(given)
                .split(',')
                .all(|directive| directive.parse::<tracing_subscriber::filter::Directive>().is_ok()));
        }
    }
}
