// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vault Rekey: live re-splitting of a master key under threshold sharing.
//!
//! An operator proposes a new `(shares, threshold)` scheme, a quorum of key
//! holders each submit one current unseal share, and the submission that
//! reaches the threshold atomically re-splits the master key and returns the
//! new shares exactly once.
//!
//! Components:
//! - Shamir secret sharing over GF(256)
//! - Nonce-scoped attempts serialized behind a single lock
//! - Keyed share fingerprints for verifying submissions without storing shares
//! - Optional sealing of new shares for named recipients (X25519 + AES-256-GCM)
//! - Optional backup of the produced shares
//! - A transport-agnostic JSON handler for the rekey endpoints

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod api;
mod backup;
mod config;
mod error;
mod key;
mod metadata;
mod nonce;
mod recipient;
mod rekey;
mod seal;
pub mod shamir;

pub use api::{
    ApiResponse, ErrorResponse, RekeyBackupResponse, RekeyCompleteResponse, RekeyHandler,
    RekeyInitRequest, RekeyStatusResponse, RekeyUpdateRequest, RekeyUpdateResponse,
};
pub use backup::{BackupKey, BackupStore, MemoryBackupStore, RekeyBackup};
pub use config::{
    ReinitPolicy, RekeyConfig, RekeySettings, ENV_ATTEMPT_TTL_SECS, ENV_REINIT_POLICY,
};
pub use error::{RekeyError, Result};
pub use key::{MasterKey, KEY_SIZE};
pub use metadata::ShareMetadataEntry;
pub use nonce::NonceManager;
pub use recipient::{EncryptedShare, RecipientKey, SealedBoxEncryptor, ShareEncryptor};
pub use rekey::{RekeyManager, RekeyResult, RekeyStatus, RekeyUpdate};
pub use seal::{
    combine_master_key, split_master_key, SealKeeper, UnsealVerifier, MAX_KEY_LEN, MIN_KEY_LEN,
};
pub use shamir::KeyShare;
