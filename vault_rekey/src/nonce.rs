// SPDX-License-Identifier: MIT OR Apache-2.0
//! One-time tokens scoping submissions to a single rekey attempt.

use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Holds the nonce of the current attempt, if any.
#[derive(Debug, Default)]
pub struct NonceManager {
    current: Option<String>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh token, replacing any current one.
    pub fn issue(&mut self) -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let token = Uuid::from_bytes(bytes).to_string();
        self.current = Some(token.clone());
        token
    }

    /// Invalidate the current token.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// The current token, or `""` when no attempt is active.
    pub fn current(&self) -> &str {
        self.current.as_deref().unwrap_or("")
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match &self.current {
            Some(token) => token.as_bytes().ct_eq(candidate.as_bytes()).into(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_empty_by_default() {
        let nonces = NonceManager::new();
        assert_eq!(nonces.current(), "");
        assert!(!nonces.matches(""));
        assert!(!nonces.matches("anything"));
    }

    #[test]
    fn test_issue_sets_current() {
        let mut nonces = NonceManager::new();
        let token = nonces.issue();
        assert!(!token.is_empty());
        assert_eq!(nonces.current(), token);
        assert!(nonces.matches(&token));
        assert!(!nonces.matches(""));
    }

    #[test]
    fn test_issue_replaces_previous() {
        let mut nonces = NonceManager::new();
        let first = nonces.issue();
        let second = nonces.issue();
        assert_ne!(first, second);
        assert!(!nonces.matches(&first));
        assert!(nonces.matches(&second));
    }

    #[test]
    fn test_clear_invalidates() {
        let mut nonces = NonceManager::new();
        let token = nonces.issue();
        nonces.clear();
        assert!(!nonces.matches(&token));
        assert_eq!(nonces.current(), "");
    }

    #[test]
    fn test_tokens_are_unique() {
        let mut nonces = NonceManager::new();
        let issued: HashSet<String> = (0..1000).map(|_| nonces.issue()).collect();
        assert_eq!(issued.len(), 1000);
    }

    #[test]
    fn test_prefix_does_not_match() {
        let mut nonces = NonceManager::new();
        let token = nonces.issue();
        assert!(!nonces.matches(&token[..8]));
    }
}
