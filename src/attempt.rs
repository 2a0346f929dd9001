use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AttemptError;

/// Identifies an attempt within one race.
///
/// The derived ordering is the tie-break priority: `Initial` first, then
/// backups in launch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttemptLabel {
    Initial,
    Backup(usize),
}

impl AttemptLabel {
    /// The stage the attempt was launched in.
    pub fn stage(&self) -> Stage {
        match self {
            AttemptLabel::Initial => Stage::Initial,
            AttemptLabel::Backup(_) => Stage::Backup,
        }
    }
}

impl fmt::Display for AttemptLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptLabel::Initial => f.write_str("initial"),
            AttemptLabel::Backup(n) => write!(f, "backup-{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initial,
    Backup,
}

/// Lifecycle of one attempt. Every state but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl AttemptState {
    pub fn is_pending(&self) -> bool {
        matches!(self, AttemptState::Pending)
    }

    /// Moves out of `Pending`. Returns `false`, leaving the state untouched,
    /// when the attempt was already resolved.
    pub fn transition(&mut self, next: AttemptState) -> bool {
        if !self.is_pending() || next.is_pending() {
            return false;
        }
        *self = next;
        true
    }
}

/// The outbound capability a race draws attempts from.
///
/// Implementations must honour `timeout` themselves and must tolerate being
/// dropped at any await point.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, timeout: Duration) -> Result<Value, AttemptError>;
}
