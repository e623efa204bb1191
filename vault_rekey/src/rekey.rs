// SPDX-License-Identifier: MIT OR Apache-2.0
//! The rekey state machine.
//!
//! An attempt moves `NotStarted -> Started -> NotStarted`. `init` starts it,
//! each `update` contributes one current unseal share, and the update that
//! supplies the last required share re-splits the master key, installs the
//! new scheme and clears the attempt inside the same critical section.
//! `cancel` clears it unconditionally.
//!
//! An attempt completes after `t` shares. When `t` is below the current
//! unseal threshold it waits for that threshold instead, and it never waits
//! for more shares than the current scheme has.

use std::sync::Arc;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    backup::{BackupKey, BackupStore, MemoryBackupStore, RekeyBackup},
    config::{ReinitPolicy, RekeyConfig, RekeySettings},
    metadata::{self, ShareMetadataEntry},
    nonce::NonceManager,
    recipient::{SealedBoxEncryptor, ShareEncryptor},
    seal::{split_master_key, UnsealVerifier},
    RekeyError, Result,
};

/// Public view of the current attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyStatus {
    pub started: bool,
    pub nonce: String,
    /// Threshold of the new scheme.
    pub t: u8,
    /// Share count of the new scheme.
    pub n: u8,
    /// Shares accepted so far.
    pub progress: u8,
    /// Shares the current unseal scheme requires.
    pub required: u8,
    pub pgp_fingerprints: Option<Vec<String>>,
    pub backup: bool,
}

impl RekeyStatus {
    fn not_started(required: u8) -> Self {
        Self {
            started: false,
            nonce: String::new(),
            t: 0,
            n: 0,
            progress: 0,
            required,
            pgp_fingerprints: None,
            backup: false,
        }
    }
}

/// The new share set, handed once to the completing caller.
pub struct RekeyResult {
    /// Nonce of the attempt that completed.
    pub nonce: String,
    /// New shares; sealed ciphertexts when recipient keys were configured.
    pub keys: Vec<Zeroizing<Vec<u8>>>,
    /// Base64 encodings of `keys`.
    pub keys_encoded: Vec<String>,
    pub pgp_fingerprints: Option<Vec<String>>,
    pub share_metadata: Vec<ShareMetadataEntry>,
    pub backup: bool,
}

impl std::fmt::Debug for RekeyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RekeyResult")
            .field("nonce", &self.nonce)
            .field("keys", &format_args!("[{} REDACTED]", self.keys.len()))
            .field("pgp_fingerprints", &self.pgp_fingerprints)
            .field("share_metadata", &self.share_metadata)
            .field("backup", &self.backup)
            .finish_non_exhaustive()
    }
}

/// Outcome of a successful `update`.
#[derive(Debug)]
pub enum RekeyUpdate {
    /// Share accepted; more are needed.
    Progress(RekeyStatus),
    /// Threshold reached; the attempt is finished.
    Complete(RekeyResult),
}

struct RekeyAttempt {
    config: RekeyConfig,
    pgp_fingerprints: Option<Vec<String>>,
    /// Shares that complete the attempt: the new threshold, raised to the
    /// unseal threshold and capped at the current share count.
    target: u8,
    shares: Vec<Zeroizing<Vec<u8>>>,
    started_at: Instant,
}

impl RekeyAttempt {
    fn progress(&self) -> u8 {
        u8::try_from(self.shares.len()).unwrap_or(u8::MAX)
    }
}

#[derive(Default)]
struct RekeyState {
    nonces: NonceManager,
    attempt: Option<RekeyAttempt>,
}

impl RekeyState {
    fn clear(&mut self) -> bool {
        self.nonces.clear();
        self.attempt.take().is_some()
    }
}

/// Coordinates rekey attempts for one store.
///
/// Each manager owns its attempt state; independent managers never share it.
pub struct RekeyManager {
    state: Mutex<RekeyState>,
    verifier: Arc<dyn UnsealVerifier>,
    encryptor: Arc<dyn ShareEncryptor>,
    backups: Arc<dyn BackupStore>,
    settings: RekeySettings,
}

impl RekeyManager {
    pub fn new(verifier: Arc<dyn UnsealVerifier>) -> Self {
        Self {
            state: Mutex::new(RekeyState::default()),
            verifier,
            encryptor: Arc::new(SealedBoxEncryptor),
            backups: Arc::new(MemoryBackupStore::new()),
            settings: RekeySettings::default(),
        }
    }

    #[must_use]
    pub fn with_encryptor(mut self, encryptor: Arc<dyn ShareEncryptor>) -> Self {
        self.encryptor = encryptor;
        self
    }

    #[must_use]
    pub fn with_backup_store(mut self, backups: Arc<dyn BackupStore>) -> Self {
        self.backups = backups;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: RekeySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RekeySettings {
        &self.settings
    }

    /// Start a rekey attempt with the given share scheme.
    pub fn init(&self, config: RekeyConfig) -> Result<RekeyStatus> {
        let config = config.validate()?;
        if self.verifier.is_sealed() {
            return Err(RekeyError::Sealed);
        }

        let pgp_fingerprints = if config.pgp_keys.is_empty() {
            None
        } else {
            Some(
                config
                    .pgp_keys
                    .iter()
                    .map(|key| self.encryptor.fingerprint(key))
                    .collect::<Result<Vec<_>>>()?,
            )
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.expire_stale(state);

        if state.attempt.is_some() {
            match self.settings.reinit_policy {
                ReinitPolicy::Reject => {
                    tracing::warn!("rekey init refused: attempt already in progress");
                    return Err(RekeyError::AlreadyStarted);
                },
                ReinitPolicy::Replace => {
                    tracing::warn!("replacing in-progress rekey attempt");
                    state.clear();
                },
            }
        }

        let required = self.verifier.required();
        let target = config
            .secret_threshold
            .max(required)
            .min(self.verifier.total().max(required));

        state.nonces.issue();
        tracing::info!(
            n = config.secret_shares,
            t = config.secret_threshold,
            pgp = pgp_fingerprints.is_some(),
            backup = config.backup,
            target,
            "rekey attempt initialized"
        );
        state.attempt = Some(RekeyAttempt {
            config,
            pgp_fingerprints,
            target,
            shares: Vec::new(),
            started_at: Instant::now(),
        });

        Ok(self.view(state))
    }

    /// Current attempt view; never mutates state.
    pub fn status(&self) -> RekeyStatus {
        let state = self.state.lock();
        self.view(&state)
    }

    /// Abandon any attempt in progress. Always succeeds.
    pub fn cancel(&self) {
        if self.state.lock().clear() {
            tracing::info!("rekey attempt cancelled");
        }
    }

    /// Submit one current unseal share for the attempt identified by `nonce`.
    pub fn update(&self, nonce: &str, key: &[u8]) -> Result<RekeyUpdate> {
        let span = tracing::info_span!("rekey.update");
        let _enter = span.enter();

        if self.verifier.is_sealed() {
            return Err(RekeyError::Sealed);
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.expire_stale(state);

        let Some(attempt) = state.attempt.as_mut() else {
            tracing::warn!("rekey update rejected: no attempt in progress");
            return Err(RekeyError::NotStarted);
        };
        if !state.nonces.matches(nonce) {
            tracing::warn!("rekey update rejected: nonce mismatch");
            return Err(RekeyError::NonceMismatch);
        }
        if let Err(e) = self.verifier.check_format(key) {
            tracing::warn!(error = %e, "rekey update rejected: malformed key");
            return Err(e);
        }
        if attempt.shares.iter().any(|s| s.as_slice() == key) {
            tracing::warn!("rekey update rejected: duplicate share");
            return Err(RekeyError::InvalidKey(
                "given key has already been provided during this rekey attempt".to_string(),
            ));
        }
        if !self.verifier.verify_share(key) {
            tracing::warn!("rekey update rejected: not a current unseal share");
            return Err(RekeyError::InvalidKey(
                "key is not a current unseal share".to_string(),
            ));
        }

        attempt.shares.push(Zeroizing::new(key.to_vec()));
        tracing::debug!(
            progress = attempt.progress(),
            target = attempt.target,
            "rekey share accepted"
        );

        if attempt.progress() < attempt.target {
            return Ok(RekeyUpdate::Progress(self.view(state)));
        }

        let nonce = state.nonces.current().to_string();
        let Some(attempt) = state.attempt.take() else {
            return Err(RekeyError::NotStarted);
        };
        state.nonces.clear();

        match self.complete(&attempt, nonce) {
            Ok(result) => {
                tracing::info!(
                    n = attempt.config.secret_shares,
                    t = attempt.config.secret_threshold,
                    pgp = result.pgp_fingerprints.is_some(),
                    backup = result.backup,
                    "rekey completed"
                );
                Ok(RekeyUpdate::Complete(result))
            },
            Err(e) => {
                tracing::error!(error = %e, "rekey completion failed; attempt cleared");
                Err(e)
            },
        }
    }

    /// The retained copy of the last backed-up rekey.
    pub fn retrieve_backup(&self) -> Result<RekeyBackup> {
        self.backups.load()?.ok_or(RekeyError::BackupNotFound)
    }

    /// Drop the retained backup. Succeeds when none exists.
    pub fn delete_backup(&self) -> Result<()> {
        self.backups.delete()?;
        tracing::info!("rekey backup deleted");
        Ok(())
    }

    fn complete(&self, attempt: &RekeyAttempt, nonce: String) -> Result<RekeyResult> {
        let config = &attempt.config;

        let master_key = self
            .verifier
            .reconstruct(&attempt.shares)
            .map_err(|e| RekeyError::Crypto(format!("failed to reconstruct master key: {e}")))?;

        let shares = split_master_key(&master_key, config.secret_shares, config.secret_threshold)
            .map_err(|e| RekeyError::Crypto(format!("failed to split master key: {e}")))?;
        drop(master_key);

        let share_metadata = metadata::generate(shares.len(), &config.share_names)?;

        let (keys, pgp_fingerprints) = if config.pgp_keys.is_empty() {
            (shares.clone(), None)
        } else {
            let mut keys = Vec::with_capacity(shares.len());
            let mut fingerprints = Vec::with_capacity(shares.len());
            for (recipient, share) in config.pgp_keys.iter().zip(&shares) {
                let sealed = self
                    .encryptor
                    .encrypt(recipient, share)
                    .map_err(|e| RekeyError::Crypto(format!("failed to encrypt share: {e}")))?;
                fingerprints.push(sealed.fingerprint);
                keys.push(Zeroizing::new(sealed.ciphertext));
            }
            (keys, Some(fingerprints))
        };

        let keys_encoded: Vec<String> = keys.iter().map(|k| STANDARD.encode(k.as_slice())).collect();

        let previous_backup = if config.backup {
            let previous = self
                .backups
                .load()
                .map_err(|e| RekeyError::Backup(e.to_string()))?;
            let entries = keys
                .iter()
                .enumerate()
                .map(|(i, key)| BackupKey {
                    fingerprint: pgp_fingerprints.as_ref().map(|fps| fps[i].clone()),
                    key: hex::encode(key.as_slice()),
                })
                .collect();
            self.backups
                .store(RekeyBackup {
                    nonce: nonce.clone(),
                    keys: entries,
                })
                .map_err(|e| RekeyError::Backup(e.to_string()))?;
            Some(previous)
        } else {
            None
        };

        if let Err(e) = self
            .verifier
            .install_shares(&shares, config.secret_threshold)
        {
            if let Some(previous) = previous_backup {
                let restored = match previous {
                    Some(backup) => self.backups.store(backup),
                    None => self.backups.delete(),
                };
                if let Err(cleanup) = restored {
                    tracing::warn!(error = %cleanup, "failed to restore previous rekey backup");
                }
            }
            return Err(RekeyError::Crypto(format!("failed to install new shares: {e}")));
        }

        Ok(RekeyResult {
            nonce,
            keys,
            keys_encoded,
            pgp_fingerprints,
            share_metadata,
            backup: config.backup,
        })
    }

    fn is_expired(&self, attempt: &RekeyAttempt) -> bool {
        self.settings
            .attempt_ttl
            .is_some_and(|ttl| attempt.started_at.elapsed() >= ttl)
    }

    fn expire_stale(&self, state: &mut RekeyState) {
        if state.attempt.as_ref().is_some_and(|a| self.is_expired(a)) {
            state.clear();
            tracing::info!("rekey attempt expired");
        }
    }

    fn view(&self, state: &RekeyState) -> RekeyStatus {
        let required = self.verifier.required();
        match state.attempt.as_ref().filter(|a| !self.is_expired(a)) {
            Some(attempt) => RekeyStatus {
                started: true,
                nonce: state.nonces.current().to_string(),
                t: attempt.config.secret_threshold,
                n: attempt.config.secret_shares,
                progress: attempt.progress(),
                required,
                pgp_fingerprints: attempt.pgp_fingerprints.clone(),
                backup: attempt.config.backup,
            },
            None => RekeyStatus::not_started(required),
        }
    }
}
