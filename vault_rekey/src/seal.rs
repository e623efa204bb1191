// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unseal share verification and the live share scheme.
//!
//! The rekey state machine never holds the master key between calls. It asks
//! an [`UnsealVerifier`] whether a submitted key is a current unseal share,
//! and once enough shares are collected asks it to reconstruct the key.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use blake2::{digest::Mac, Blake2bMac512};
use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::{
    key::{MasterKey, KEY_SIZE},
    shamir::{self, KeyShare},
    RekeyError, Result,
};

/// Shortest key accepted by [`UnsealVerifier::check_format`].
pub const MIN_KEY_LEN: usize = 16;
/// Longest key accepted: a 32-byte key share plus its x-coordinate.
pub const MAX_KEY_LEN: usize = KEY_SIZE + 1;

const FINGERPRINT_INFO: &[u8] = b"vault-rekey:share-fingerprint:v1";

/// Collaborator that knows the current unseal share scheme.
pub trait UnsealVerifier: Send + Sync {
    /// Number of shares the current scheme needs to reconstruct the key.
    fn required(&self) -> u8;

    /// Number of shares in the current scheme.
    fn total(&self) -> u8;

    fn is_sealed(&self) -> bool;

    /// Structural check on a decoded key.
    fn check_format(&self, key: &[u8]) -> Result<()> {
        if key.len() < MIN_KEY_LEN || key.len() > MAX_KEY_LEN {
            return Err(RekeyError::KeyFormat(format!(
                "key is {} bytes; expected between {MIN_KEY_LEN} and {MAX_KEY_LEN}",
                key.len()
            )));
        }
        Ok(())
    }

    /// Whether `key` is one of the currently installed unseal shares.
    fn verify_share(&self, key: &[u8]) -> bool;

    /// Reconstruct the master key from accepted shares.
    ///
    /// Fails with [`RekeyError::InvalidKey`] if the shares do not recover the
    /// live master key.
    fn reconstruct(&self, shares: &[Zeroizing<Vec<u8>>]) -> Result<MasterKey>;

    /// Replace the current share scheme with freshly split shares.
    fn install_shares(&self, shares: &[Zeroizing<Vec<u8>>], threshold: u8) -> Result<()>;
}

/// Split the master key into `total` raw shares with the given threshold.
///
/// A single-share scheme hands out the key itself, unsplit.
pub fn split_master_key(
    key: &MasterKey,
    total: u8,
    threshold: u8,
) -> Result<Vec<Zeroizing<Vec<u8>>>> {
    if total == 1 && threshold == 1 {
        return Ok(vec![Zeroizing::new(key.as_bytes().to_vec())]);
    }
    Ok(shamir::split(key.as_bytes(), total, threshold)?
        .iter()
        .map(|share| Zeroizing::new(share.as_bytes().to_vec()))
        .collect())
}

/// Recover a master key from raw shares, accepting an unsplit key as-is.
pub fn combine_master_key(shares: &[Zeroizing<Vec<u8>>]) -> Result<MasterKey> {
    if let [only] = shares {
        if only.len() == KEY_SIZE {
            return MasterKey::from_slice(only);
        }
    }
    let parsed = shares
        .iter()
        .map(|raw| KeyShare::from_bytes(raw))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| RekeyError::InvalidKey(e.to_string()))?;
    let secret = shamir::combine(&parsed).map_err(|e| RekeyError::InvalidKey(e.to_string()))?;
    MasterKey::from_slice(&secret)
}

struct KeeperState {
    master_key: MasterKey,
    /// Keyed once from a master-key subkey; cloned per fingerprint.
    mac: Blake2bMac512,
    total: u8,
    threshold: u8,
    fingerprints: HashSet<[u8; 32]>,
}

impl KeeperState {
    fn fingerprint(&self, share: &[u8]) -> [u8; 32] {
        fingerprint_with(&self.mac, share)
    }
}

fn share_mac(master_key: &MasterKey) -> Result<Blake2bMac512> {
    let mac_key = master_key.derive_subkey(FINGERPRINT_INFO)?;
    <Blake2bMac512 as Mac>::new_from_slice(&mac_key[..])
        .map_err(|e| RekeyError::Crypto(format!("invalid fingerprint key: {e}")))
}

fn fingerprint_with(mac: &Blake2bMac512, share: &[u8]) -> [u8; 32] {
    let mut mac = mac.clone();
    mac.update(share);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes()[..32]);
    out
}

/// In-process unseal verifier that owns the master key.
///
/// Only keyed fingerprints of the issued shares are kept, never the shares.
pub struct SealKeeper {
    sealed: AtomicBool,
    state: RwLock<KeeperState>,
}

impl SealKeeper {
    /// Generate a master key, split it, and return the keeper with the shares.
    pub fn initialize(total: u8, threshold: u8) -> Result<(Self, Vec<Zeroizing<Vec<u8>>>)> {
        Self::with_master_key(MasterKey::generate(), total, threshold)
    }

    /// Split an existing master key under a new keeper.
    pub fn with_master_key(
        master_key: MasterKey,
        total: u8,
        threshold: u8,
    ) -> Result<(Self, Vec<Zeroizing<Vec<u8>>>)> {
        if total == 0 || threshold == 0 || threshold > total {
            return Err(RekeyError::Config(format!(
                "invalid seal scheme: {threshold} of {total}"
            )));
        }
        let shares = split_master_key(&master_key, total, threshold)?;
        let mac = share_mac(&master_key)?;
        let fingerprints = shares.iter().map(|s| fingerprint_with(&mac, s)).collect();

        let keeper = Self {
            sealed: AtomicBool::new(false),
            state: RwLock::new(KeeperState {
                master_key,
                mac,
                total,
                threshold,
                fingerprints,
            }),
        };
        tracing::info!(total, threshold, "seal keeper initialized");
        Ok((keeper, shares))
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Unseal with a threshold of current shares.
    pub fn unseal(&self, shares: &[Zeroizing<Vec<u8>>]) -> Result<()> {
        if shares.len() < usize::from(self.required()) {
            return Err(RekeyError::InvalidKey(format!(
                "{} shares supplied; {} required",
                shares.len(),
                self.required()
            )));
        }
        self.reconstruct(shares)?;
        self.sealed.store(false, Ordering::Release);
        Ok(())
    }
}

impl UnsealVerifier for SealKeeper {
    fn required(&self) -> u8 {
        self.state.read().threshold
    }

    fn total(&self) -> u8 {
        self.state.read().total
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn verify_share(&self, key: &[u8]) -> bool {
        let state = self.state.read();
        state.fingerprints.contains(&state.fingerprint(key))
    }

    fn reconstruct(&self, shares: &[Zeroizing<Vec<u8>>]) -> Result<MasterKey> {
        let state = self.state.read();
        if shares.iter().any(|s| !state.fingerprints.contains(&state.fingerprint(s))) {
            return Err(RekeyError::InvalidKey(
                "share is not part of the current scheme".to_string(),
            ));
        }
        let recovered = combine_master_key(shares)?;
        if recovered != state.master_key {
            return Err(RekeyError::InvalidKey(
                "shares do not reconstruct the master key".to_string(),
            ));
        }
        Ok(recovered)
    }

    fn install_shares(&self, shares: &[Zeroizing<Vec<u8>>], threshold: u8) -> Result<()> {
        let total = u8::try_from(shares.len())
            .map_err(|_| RekeyError::Crypto(format!("{} shares exceed 255", shares.len())))?;
        if total == 0 || threshold == 0 || threshold > total {
            return Err(RekeyError::Crypto(format!(
                "invalid share scheme: {threshold} of {total}"
            )));
        }

        let mut state = self.state.write();
        let fingerprints = shares.iter().map(|s| state.fingerprint(s)).collect();
        state.fingerprints = fingerprints;
        state.total = total;
        state.threshold = threshold;
        tracing::info!(total, threshold, "installed new unseal shares");
        Ok(())
    }
}
