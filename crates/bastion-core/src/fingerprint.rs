//! Content fingerprints
//!
//! A fingerprint is the SHA-256 digest of an artifact's rendered content,
//! formatted as `sha256:<hex>`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest of a rendered artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint the given content
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self(format!("sha256:{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines
    pub fn short(&self) -> &str {
        let hex = self.0.strip_prefix("sha256:").unwrap_or(&self.0);
        &hex[..hex.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_format() {
        let fp = Fingerprint::of("PublicKey = ABC\n");
        assert!(fp.as_str().starts_with("sha256:"));
        assert_eq!(fp.as_str().len(), "sha256:".len() + 64);
        assert_eq!(fp.short().len(), 12);
    }

    #[test]
    fn fingerprint_tracks_content() {
        assert_eq!(Fingerprint::of("a"), Fingerprint::of("a"));
        assert_ne!(
            Fingerprint::of("MYSQL_PASSWORD: \"one\""),
            Fingerprint::of("MYSQL_PASSWORD: \"two\"")
        );
    }
}
