// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifiers and optional labels for newly produced shares.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{RekeyError, Result};

/// Metadata returned alongside each new share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareMetadataEntry {
    /// Random identifier, never reused across attempts.
    pub id: String,
    /// Operator-supplied label, if names were configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Produce one entry per share, pairing each configured name with one share.
pub fn generate(count: usize, names: &[String]) -> Result<Vec<ShareMetadataEntry>> {
    if !names.is_empty() && names.len() != count {
        return Err(RekeyError::Config(format!(
            "{} share names supplied for {count} shares",
            names.len()
        )));
    }

    Ok((0..count)
        .map(|i| ShareMetadataEntry {
            id: Uuid::new_v4().to_string(),
            name: names.get(i).cloned(),
        })
        .collect())
}
