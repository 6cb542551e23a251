//! Process identity types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of a [`ProcessIdentity`] on the wire.
pub const IDENTITY_LEN: usize = 16;

/// Identifies one node for the lifetime of its process.
///
/// Wraps a time-based UUID (v7). Two announcements carrying the same
/// identity come from the same node, regardless of which endpoint address
/// they advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessIdentity(Uuid);

impl ProcessIdentity {
    /// Generate a fresh identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Rebuild an identity from its 16 wire bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The 16 bytes written to the wire.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        self.0.as_bytes()
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique() {
        let a = ProcessIdentity::generate();
        let b = ProcessIdentity::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn identity_is_time_based() {
        let id = ProcessIdentity::generate();
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn identity_bytes_roundtrip() {
        let id = ProcessIdentity::generate();
        assert_eq!(ProcessIdentity::from_bytes(*id.as_bytes()), id);
    }

    #[test]
    fn identity_display() {
        let s = ProcessIdentity::generate().to_string();
        // 8-4-4-4-12
        assert_eq!(s.len(), 36);
    }

    #[test]
    fn identity_serde_roundtrip() {
        let id = ProcessIdentity::generate();
        let json = serde_json::to_string(&id).unwrap();
        let decoded: ProcessIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(id, decoded);
    }
}
