//! Expiry policies

use chrono::{DateTime, Duration, Utc};

/// When a stored entry becomes stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    #[default]
    Never,
    At(DateTime<Utc>),
    In(Duration),
}

impl Expiry {
    /// Resolve to an absolute instant relative to `now`.
    ///
    /// Relative expiries are resolved once, at insertion. `None` means the
    /// entry never expires; a duration that overflows the calendar does too.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Expiry::Never => None,
            Expiry::At(at) => Some(*at),
            Expiry::In(duration) => now.checked_add_signed(*duration),
        }
    }

    /// Relative expiry in seconds; out-of-range values never expire
    pub fn seconds(secs: i64) -> Self {
        Duration::try_seconds(secs).map_or(Expiry::Never, Expiry::In)
    }
}

/// True when `expires_at` is at or before `now`
pub fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_some_and(|at| at <= now)
}
