// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for rekey operations.

use thiserror::Error;

/// Errors raised while coordinating a rekey attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RekeyError {
    /// The proposed share scheme or service settings are malformed.
    #[error("invalid rekey configuration: {0}")]
    Config(String),

    /// An update arrived while no attempt is in progress.
    #[error("no rekey in progress")]
    NotStarted,

    /// An attempt is already running and the policy forbids replacing it.
    #[error("rekey already in progress")]
    AlreadyStarted,

    /// The update's nonce does not belong to the current attempt.
    #[error("incorrect nonce supplied; nonce for this rekey operation is unknown or stale")]
    NonceMismatch,

    /// The submitted key could not be decoded or has the wrong length.
    #[error("malformed key: {0}")]
    KeyFormat(String),

    /// A well-formed key that is not a current unseal share.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The store is sealed; rekeying requires an unsealed store.
    #[error("vault is sealed")]
    Sealed,

    /// Splitting or encrypting the new shares failed.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// Writing the rekey backup failed.
    #[error("backup error: {0}")]
    Backup(String),

    /// No rekey backup is stored.
    #[error("no rekey backup found")]
    BackupNotFound,
}

impl RekeyError {
    /// Whether the caller is at fault (4xx-class) rather than the service.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Transport status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_)
            | Self::NotStarted
            | Self::NonceMismatch
            | Self::KeyFormat(_)
            | Self::InvalidKey(_) => 400,
            Self::BackupNotFound => 404,
            Self::AlreadyStarted => 409,
            Self::Crypto(_) | Self::Backup(_) => 500,
            Self::Sealed => 503,
        }
    }
}

pub type Result<T> = std::result::Result<T, RekeyError>;
