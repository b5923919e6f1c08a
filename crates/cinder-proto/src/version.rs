//! Protocol versioning.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version of the client/cluster wire protocol.
///
/// Two peers can talk to each other when their major versions match; minor
/// and patch numbers only add optional capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Major version. Incompatible changes bump this.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
    /// Patch version.
    pub patch: u16,
}

impl ProtocolVersion {
    /// The version spoken by this build.
    pub const CURRENT: Self = Self::new(3, 0, 0);

    /// Creates a protocol version.
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns true if a peer speaking `other` can be served.
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_follows_major() {
        let current = ProtocolVersion::CURRENT;
        assert!(current.is_compatible_with(&ProtocolVersion::new(3, 7, 1)));
        assert!(!current.is_compatible_with(&ProtocolVersion::new(2, 0, 0)));
        assert!(!current.is_compatible_with(&ProtocolVersion::new(4, 0, 0)));
    }

    #[test]
    fn test_display() {
        assert_eq!(ProtocolVersion::new(3, 1, 4).to_string(), "3.1.4");
    }
}
