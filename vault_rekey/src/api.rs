// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON request and response shapes for the rekey endpoints, plus a
//! transport-agnostic handler that maps them onto a [`RekeyManager`].
//!
//! Routing and authentication belong to the embedding server; the handler
//! only turns request bodies into responses with a status code.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    backup::RekeyBackup,
    config::RekeyConfig,
    metadata::ShareMetadataEntry,
    rekey::{RekeyManager, RekeyResult, RekeyStatus, RekeyUpdate},
    RekeyError, Result,
};

/// Body of a rekey init request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyInitRequest {
    pub secret_shares: i64,
    pub secret_threshold: i64,
    #[serde(default)]
    pub pgp_keys: Vec<String>,
    #[serde(default)]
    pub backup: bool,
    /// Comma-separated share labels.
    #[serde(default)]
    pub key_shares_identifier_names: String,
}

impl RekeyInitRequest {
    /// Convert into a per-attempt config. Does not run full validation.
    pub fn into_config(self) -> Result<RekeyConfig> {
        let secret_shares = u8::try_from(self.secret_shares).map_err(|_| {
            RekeyError::Config(format!(
                "secret shares must be between 1 and 255, got {}",
                self.secret_shares
            ))
        })?;
        let secret_threshold = u8::try_from(self.secret_threshold).map_err(|_| {
            RekeyError::Config(format!(
                "secret threshold must be between 1 and 255, got {}",
                self.secret_threshold
            ))
        })?;

        Ok(RekeyConfig::new(secret_shares, secret_threshold)
            .with_pgp_keys(self.pgp_keys)
            .with_backup(self.backup)
            .with_share_names(split_names(&self.key_shares_identifier_names)))
    }
}

fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Body of a share submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyUpdateRequest {
    pub nonce: String,
    pub key: String,
}

/// Decode a submitted key: hex first, then standard base64.
pub fn decode_key(encoded: &str) -> Result<Vec<u8>> {
    let encoded = encoded.trim();
    if let Ok(bytes) = hex::decode(encoded) {
        return Ok(bytes);
    }
    STANDARD.decode(encoded).map_err(|_| {
        RekeyError::KeyFormat("key must be hex or base64 encoded".to_string())
    })
}

/// Status view, also returned by init and intermediate submissions.
pub type RekeyStatusResponse = RekeyStatus;

/// Body returned to the caller whose submission completes the rekey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyCompleteResponse {
    pub complete: bool,
    pub nonce: String,
    /// Hex-encoded new shares.
    pub keys: Vec<String>,
    pub keys_base64: Vec<String>,
    #[serde(default)]
    pub pgp_fingerprints: Option<Vec<String>>,
    pub backup: bool,
    pub key_shares_metadata: Vec<ShareMetadataEntry>,
}

impl From<RekeyResult> for RekeyCompleteResponse {
    fn from(result: RekeyResult) -> Self {
        Self {
            complete: true,
            keys: result.keys.iter().map(|k| hex::encode(k.as_slice())).collect(),
            nonce: result.nonce,
            keys_base64: result.keys_encoded,
            pgp_fingerprints: result.pgp_fingerprints,
            backup: result.backup,
            key_shares_metadata: result.share_metadata,
        }
    }
}

/// Either shape a submission may answer with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RekeyUpdateResponse {
    Complete(RekeyCompleteResponse),
    Progress(RekeyStatusResponse),
}

impl From<RekeyUpdate> for RekeyUpdateResponse {
    fn from(update: RekeyUpdate) -> Self {
        match update {
            RekeyUpdate::Progress(status) => Self::Progress(status),
            RekeyUpdate::Complete(result) => Self::Complete(result.into()),
        }
    }
}

/// Retained backup, keyed by recipient fingerprint when shares were sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyBackupResponse {
    pub nonce: String,
    pub keys: Vec<BackupEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub key: String,
}

impl From<RekeyBackup> for RekeyBackupResponse {
    fn from(backup: RekeyBackup) -> Self {
        Self {
            nonce: backup.nonce,
            keys: backup
                .keys
                .into_iter()
                .map(|k| BackupEntry {
                    fingerprint: k.fingerprint,
                    key: k.key,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<String>,
}

/// Status code and optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => Self {
                status: 200,
                body: Some(value),
            },
            Err(e) => Self::failure(500, format!("failed to encode response: {e}")),
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    fn error(err: &RekeyError) -> Self {
        Self::failure(err.status_code(), err.to_string())
    }

    fn failure(status: u16, message: String) -> Self {
        Self {
            status,
            body: Some(serde_json::json!({ "errors": [message] })),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body into a typed response.
    pub fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        self.body
            .as_ref()
            .and_then(|body| serde_json::from_value(body.clone()).ok())
    }
}

fn respond<T: Serialize>(result: Result<T>) -> ApiResponse {
    match result {
        Ok(body) => ApiResponse::ok(&body),
        Err(e) => ApiResponse::error(&e),
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| RekeyError::Config(format!("failed to parse JSON input: {e}")))
}

/// Maps rekey endpoint requests onto a [`RekeyManager`].
pub struct RekeyHandler {
    manager: RekeyManager,
}

impl RekeyHandler {
    pub fn new(manager: RekeyManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &RekeyManager {
        &self.manager
    }

    pub fn read_status(&self) -> ApiResponse {
        ApiResponse::ok(&self.manager.status())
    }

    pub fn initialize(&self, body: &[u8]) -> ApiResponse {
        respond(
            parse_body::<RekeyInitRequest>(body)
                .and_then(RekeyInitRequest::into_config)
                .and_then(|config| self.manager.init(config)),
        )
    }

    pub fn cancel(&self) -> ApiResponse {
        self.manager.cancel();
        ApiResponse::no_content()
    }

    pub fn submit(&self, body: &[u8]) -> ApiResponse {
        respond(parse_body::<RekeyUpdateRequest>(body).and_then(|req| {
            let key = decode_key(&req.key)?;
            self.manager
                .update(&req.nonce, &key)
                .map(RekeyUpdateResponse::from)
        }))
    }

    pub fn read_backup(&self) -> ApiResponse {
        respond(self.manager.retrieve_backup().map(RekeyBackupResponse::from))
    }

    pub fn delete_backup(&self) -> ApiResponse {
        match self.manager.delete_backup() {
            Ok(()) => ApiResponse::no_content(),
            Err(e) => ApiResponse::error(&e),
        }
    }
}
