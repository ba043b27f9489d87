//! Backend-independent store settings.

use std::time::Duration;

use opsview_types::TokenPolicy;

/// Default coordination lock lease.
///
/// Comfortably longer than one poll cycle (5 s by default) so a healthy
/// holder never loses the lock mid-cycle, yet short enough that a crashed
/// holder blocks updates for at most half a minute.
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(30);

/// Default lifetime of an issued screen token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Settings shared by every store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// Lease duration of the coordination lock.
    pub lock_lease: Duration,
    /// Redemption policy for screen tokens.
    pub token_policy: TokenPolicy,
    /// How long an issued screen token stays redeemable.
    pub token_ttl: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            lock_lease: DEFAULT_LOCK_LEASE,
            token_policy: TokenPolicy::SingleUse,
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }
}
