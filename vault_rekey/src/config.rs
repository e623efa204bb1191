// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rekey attempt configuration and service settings.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RekeyError, Result};

/// Re-init policy environment variable (`replace` or `reject`).
pub const ENV_REINIT_POLICY: &str = "VAULT_REKEY_REINIT_POLICY";
/// Attempt lifetime environment variable, in seconds.
pub const ENV_ATTEMPT_TTL_SECS: &str = "VAULT_REKEY_ATTEMPT_TTL_SECS";

/// The share scheme requested for a rekey attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyConfig {
    /// Number of shares to produce (`n`).
    pub secret_shares: u8,
    /// Shares needed to reconstruct (`t`).
    pub secret_threshold: u8,
    /// Recipient public keys, one per share, or empty.
    pub pgp_keys: Vec<String>,
    /// Retain a copy of the result in the backup store.
    pub backup: bool,
    /// Human labels, one per share, or empty.
    pub share_names: Vec<String>,
}

impl RekeyConfig {
    pub fn new(secret_shares: u8, secret_threshold: u8) -> Self {
        Self {
            secret_shares,
            secret_threshold,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_pgp_keys(mut self, keys: Vec<String>) -> Self {
        self.pgp_keys = keys;
        self
    }

    #[must_use]
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    #[must_use]
    pub fn with_share_names(mut self, names: Vec<String>) -> Self {
        self.share_names = names;
        self
    }

    /// Structural validation; returns the config unchanged on success.
    pub fn validate(self) -> Result<Self> {
        let n = usize::from(self.secret_shares);

        if self.secret_shares < 1 {
            return Err(RekeyError::Config(
                "secret shares must be at least 1".to_string(),
            ));
        }
        if self.secret_threshold < 1 {
            return Err(RekeyError::Config(
                "secret threshold must be at least 1".to_string(),
            ));
        }
        if self.secret_threshold > self.secret_shares {
            return Err(RekeyError::Config(format!(
                "secret threshold ({}) cannot exceed secret shares ({})",
                self.secret_threshold, self.secret_shares
            )));
        }
        if !self.pgp_keys.is_empty() && self.pgp_keys.len() != n {
            return Err(RekeyError::Config(format!(
                "count mismatch between number of provided PGP keys ({}) and number of shares ({n})",
                self.pgp_keys.len()
            )));
        }

        if self.backup && self.pgp_keys.is_empty() {
            return Err(RekeyError::Config(
                "cannot request a backup of the new keys without providing PGP keys for encryption"
                    .to_string(),
            ));
        }

        if !self.share_names.is_empty() {
            if self.share_names.len() != n {
                return Err(RekeyError::Config(format!(
                    "count mismatch between number of share names ({}) and number of shares ({n})",
                    self.share_names.len()
                )));
            }
            let mut seen = HashSet::with_capacity(n);
            for name in &self.share_names {
                if name.is_empty() {
                    return Err(RekeyError::Config("share names cannot be empty".to_string()));
                }
                if !seen.insert(name.as_str()) {
                    return Err(RekeyError::Config(format!("duplicate share name: {name}")));
                }
            }
        }

        Ok(self)
    }
}

/// What `init` does when an attempt is already in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReinitPolicy {
    /// Discard the running attempt and start a new one.
    #[default]
    Replace,
    /// Refuse with `AlreadyStarted`.
    Reject,
}

impl std::str::FromStr for ReinitPolicy {
    type Err = RekeyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            other => Err(RekeyError::Config(format!(
                "invalid {ENV_REINIT_POLICY}: {other} (expected replace or reject)"
            ))),
        }
    }
}

/// Service-level settings for a [`crate::RekeyManager`].
#[derive(Debug, Clone, Default)]
pub struct RekeySettings {
    pub reinit_policy: ReinitPolicy,
    /// Lifetime of an attempt; `None` keeps attempts until completed or cancelled.
    pub attempt_ttl: Option<Duration>,
}

impl RekeySettings {
    #[must_use]
    pub fn with_reinit_policy(mut self, policy: ReinitPolicy) -> Self {
        self.reinit_policy = policy;
        self
    }

    #[must_use]
    pub fn with_attempt_ttl(mut self, ttl: Duration) -> Self {
        self.attempt_ttl = Some(ttl);
        self
    }

    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(val) = lookup(ENV_REINIT_POLICY) {
            settings.reinit_policy = val.parse()?;
        }
        if let Some(val) = lookup(ENV_ATTEMPT_TTL_SECS) {
            let secs: u64 = val
                .trim()
                .parse()
                .map_err(|e| RekeyError::Config(format!("invalid {ENV_ATTEMPT_TTL_SECS}: {e}")))?;
            if secs == 0 {
                return Err(RekeyError::Config(format!(
                    "invalid {ENV_ATTEMPT_TTL_SECS}: must be greater than zero"
                )));
            }
            settings.attempt_ttl = Some(Duration::from_secs(secs));
        }

        Ok(settings)
    }
}
