use std::time::Duration;

/// Why a single attempt produced no payload.
///
/// Every kind is equivalent to the scheduler: the attempt simply drops out of
/// the race. The kind is kept for logs and metrics.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Upstream answered with a status other than 200/201.
    #[error("upstream returned status {0}")]
    BadStatus(u16),

    /// The connection could not be established in time.
    #[error("timed out while connecting to the upstream")]
    ConnectTimeout,

    /// The response did not arrive within the attempt's timeout.
    #[error("timed out waiting for the upstream response")]
    ReadTimeout,

    /// No connection could be taken from the shared pool in time.
    #[error("timed out waiting to acquire a connection from the pool")]
    PoolTimeout,

    /// Connection-level failure that was not a timeout.
    #[error("connection to upstream failed: {0}")]
    Connect(String),

    /// The upstream body was not valid JSON.
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

impl AttemptError {
    /// Stable short name used as a log field and metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::BadStatus(_) => "bad_status",
            AttemptError::ConnectTimeout => "connect_timeout",
            AttemptError::ReadTimeout => "read_timeout",
            AttemptError::PoolTimeout => "pool_timeout",
            AttemptError::Connect(_) => "connect",
            AttemptError::Decode(_) => "decode",
        }
    }
}

/// A caller budget that cannot be turned into a usable deadline.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    #[error("timeout below minimum: {budget_ms}ms requested, at least {minimum_ms}ms required")]
    BelowMinimum { budget_ms: i64, minimum_ms: u64 },

    /// The safety coefficient turned the budget into an unusable deadline.
    #[error("safety coefficient {coefficient} gives no usable deadline for {budget_ms}ms")]
    DeadlineOutOfRange { budget_ms: i64, coefficient: String },
}

/// Errors that can end a hedged race.
#[derive(thiserror::Error, Debug)]
pub enum HedgedError {
    /// No attempt succeeded before the deadline ran out.
    #[error("no attempt succeeded within {0:?}")]
    Exhausted(Duration),
}

/// Invalid or unreadable process configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("tracing init failed: {0}")]
    Tracing(String),

    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
