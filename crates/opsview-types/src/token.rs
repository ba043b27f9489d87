//! Lock holder tokens and screen access token records.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a coordination lock holder.
///
/// Returned by a successful acquire and required to renew or release the
/// lock. A stale token (the lease expired and someone else took the lock)
/// is ignored by both operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(pub String);

impl LockToken {
    /// Generate a fresh, unique holder identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for LockToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored for an issued screen token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenTokenRecord {
    /// When the token was issued.
    pub created_at: DateTime<Utc>,
    /// Address the token was first redeemed from, if any.
    #[serde(default)]
    pub bound_to: Option<String>,
}

impl ScreenTokenRecord {
    /// A fresh, unredeemed record.
    pub fn issued_now() -> Self {
        Self {
            created_at: Utc::now(),
            bound_to: None,
        }
    }
}

/// What happens to a screen token after its first redemption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPolicy {
    /// The first redemption consumes the token; every later attempt fails.
    #[default]
    SingleUse,
    /// The first redemption binds the token to the requesting address;
    /// later redemptions succeed only from that same address.
    BindOnce,
}

impl TokenPolicy {
    /// Whether a token already bound to `bound_to` may be redeemed again
    /// from `address`.
    pub fn allows_rebind(self, bound_to: &str, address: &str) -> bool {
        match self {
            Self::SingleUse => false,
            Self::BindOnce => bound_to == address,
        }
    }
}

impl FromStr for TokenPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_use" | "single-use" => Ok(Self::SingleUse),
            "bind_once" | "bind-once" => Ok(Self::BindOnce),
            other => Err(format!("unknown token policy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_tokens_are_unique() {
        assert_ne!(LockToken::generate(), LockToken::generate());
    }

    #[test]
    fn single_use_never_rebinds() {
        assert!(!TokenPolicy::SingleUse.allows_rebind("10.0.0.1", "10.0.0.1"));
    }

    #[test]
    fn bind_once_rebinds_same_address_only() {
        assert!(TokenPolicy::BindOnce.allows_rebind("10.0.0.1", "10.0.0.1"));
        assert!(!TokenPolicy::BindOnce.allows_rebind("10.0.0.1", "10.0.0.2"));
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("single_use".parse(), Ok(TokenPolicy::SingleUse));
        assert_eq!("Bind-Once".parse(), Ok(TokenPolicy::BindOnce));
        assert!("forever".parse::<TokenPolicy>().is_err());
    }
}
