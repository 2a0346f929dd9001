//! An HTTP service that fetches one upstream resource within a caller-given
//! time budget, hedging slow requests with backup attempts.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hedged_fetch::{HedgeConfig, HttpUpstream, Outcome, SmartFetch, UpstreamConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let upstream = HttpUpstream::new(&UpstreamConfig::default())?;
//! let service = SmartFetch::new(HedgeConfig::default(), Arc::new(upstream));
//!
//! match service.handle(1000).await {
//!     Outcome::Success(payload) => println!("got {payload}"),
//!     Outcome::RejectedBudget(reason) => println!("rejected: {reason}"),
//!     Outcome::NoAttemptSucceeded => println!("nothing arrived in time"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Hedging Strategy
//!
//! 1. The budget is scaled by `safety_coefficient` into a deadline; budgets
//!    under `minimal_safe_timeout_ms` are rejected
//! 2. One initial attempt runs alone for `first_request_timeout`
//! 3. If it has not succeeded by then, `backup_attempts` backups are fired,
//!    each allowed whatever remains of the deadline
//! 4. The first success wins (ties go to the initial attempt, then backups
//!    in launch order) and everything else is cancelled

pub mod attempt;
pub mod budget;
pub mod config;
pub mod env;
pub mod errors;
pub mod metrics;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod upstream;

use std::{fs::OpenOptions, path::Path, sync::Mutex};

use tracing::Subscriber;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

pub use attempt::{AttemptLabel, AttemptState, Upstream};
pub use budget::{Deadline, TimeoutNormalizer};
pub use config::{HedgeConfig, ServerConfig, Settings, UpstreamConfig};
pub use errors::{AttemptError, BudgetError, ConfigError, HedgedError};
pub use metrics::Metrics;
pub use scheduler::{AttemptStatsSnapshot, HedgedScheduler};
pub use service::{Outcome, SmartFetch};
pub use upstream::HttpUpstream;

/// Initialise the global tracing subscriber.
///
/// `LOG_FORMAT=json` selects structured JSON output, anything else the
/// human-readable format. The filter comes from `RUST_LOG`, defaulting to
/// `info`. When `LOG_FILE` is set, events are also appended to that file
/// without ANSI colours.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), ConfigError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout = match format.as_str() {
        "json" => fmt::layer().json().with_current_span(true).boxed(),
        _ => fmt::layer().with_file(true).with_line_number(true).boxed(),
    };
    let file = match std::env::var("LOG_FILE") {
        Ok(path) if !path.is_empty() => Some(file_layer(Path::new(&path))?),
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .try_init()
        .map_err(|e| ConfigError::Tracing(e.to_string()))
}

/// Plain-text layer appending to `path`, creating the file if needed.
pub fn file_layer<S>(path: &Path) -> Result<impl Layer<S>, ConfigError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ConfigError::LogFile {
            path: path.display().to_string(),
            source,
        })?;

    Ok(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_tracing_init_is_an_error() {
        let _ = init_tracing();
        assert!(matches!(init_tracing(), Err(ConfigError::Tracing(_))));
    }

    #[test]
    fn file_layer_appends_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.log");

        let subscriber = tracing_subscriber::registry().with(file_layer(&path).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(budget_ms = 1000, "received request on /api/smart");
        });

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("received request on /api/smart"), "{written}");
        assert!(written.contains("budget_ms=1000"), "{written}");
        assert!(!written.contains('\x1b'), "{written}");
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("api.log");

        let err = file_layer::<tracing_subscriber::Registry>(&path).err().unwrap();
        assert!(matches!(err, ConfigError::LogFile { .. }));
    }
}
