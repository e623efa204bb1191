// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retention of rekey results for recovery.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One retained share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupKey {
    /// Recipient fingerprint when the share was sealed for a recipient.
    pub fingerprint: Option<String>,
    /// Hex encoding of the share as returned to the caller.
    pub key: String,
}

/// The retained copy of a completed rekey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyBackup {
    /// Nonce of the attempt that produced the shares.
    pub nonce: String,
    pub keys: Vec<BackupKey>,
}

/// Durable store for rekey backups. At most one backup is retained.
pub trait BackupStore: Send + Sync {
    /// Store a backup, replacing any previous one.
    fn store(&self, backup: RekeyBackup) -> Result<()>;

    fn load(&self) -> Result<Option<RekeyBackup>>;

    fn delete(&self) -> Result<()>;
}

/// Process-local backup store.
#[derive(Debug, Default)]
pub struct MemoryBackupStore {
    backup: RwLock<Option<RekeyBackup>>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackupStore for MemoryBackupStore {
    fn store(&self, backup: RekeyBackup) -> Result<()> {
        *self.backup.write() = Some(backup);
        Ok(())
    }

    fn load(&self) -> Result<Option<RekeyBackup>> {
        Ok(self.backup.read().clone())
    }

    fn delete(&self) -> Result<()> {
        self.backup.write().take();
        Ok(())
    }
}
