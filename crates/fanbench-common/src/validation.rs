//! Pre-run compatibility check between master and slaves
//!
//! Master and slaves must run the same build of the same tool: the task is
//! compiled into the binary, so a version or binary mismatch means the two
//! sides would execute different code. Each side describes itself with a
//! `ValidationInfo` and the master refuses to assign work to a slave whose
//! info differs from its own.

use std::io;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of a running build, exchanged before work assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationInfo {
    /// Crate version baked in at compile time
    pub app_version: String,
    /// SHA-256 of the executable, hex encoded
    pub task_definition_hash: String,
}

impl ValidationInfo {
    /// Describe the currently running executable
    pub fn for_current_exe(app_version: impl Into<String>) -> io::Result<Self> {
        let exe = std::env::current_exe()?;
        let bytes = std::fs::read(exe)?;
        Ok(Self {
            app_version: app_version.into(),
            task_definition_hash: sha256_hex(&bytes),
        })
    }

    /// Whether both sides run the same build
    pub fn matches(&self, other: &ValidationInfo) -> bool {
        self == other
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_is_stable() {
        let hash = sha256_hex(b"hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_for_current_exe() {
        let info = ValidationInfo::for_current_exe("1.2.3").unwrap();
        assert_eq!(info.app_version, "1.2.3");
        assert_eq!(info.task_definition_hash.len(), 64);
        assert!(info.task_definition_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_matches() {
        let a = ValidationInfo {
            app_version: "0.2.0".into(),
            task_definition_hash: "abc".into(),
        };
        let mut b = a.clone();
        assert!(a.matches(&b));
        b.app_version = "0.3.0".into();
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_serialization() {
        let info = ValidationInfo {
            app_version: "0.2.0".into(),
            task_definition_hash: "deadbeef".into(),
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"appVersion\":\"0.2.0\""));
        assert!(json.contains("\"taskDefinitionHash\":\"deadbeef\""));

        let parsed: ValidationInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, info);
    }
}
