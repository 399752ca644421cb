use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash of a `CalculationParameters` value (BLAKE3 hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamsHash(pub String);

impl ParamsHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for display.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ParamsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic dataset hash (content hash of all bars in a snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, time-ordered snapshot identifier.
///
/// Lexicographic order equals creation order; ids are also used as directory names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids are path components: reject separators and relative segments.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SnapshotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_hash_deterministic() {
        assert_eq!(ParamsHash::from_bytes(b"abc"), ParamsHash::from_bytes(b"abc"));
        assert_ne!(ParamsHash::from_bytes(b"abc"), ParamsHash::from_bytes(b"abd"));
        assert_eq!(ParamsHash::from_bytes(b"abc").short().len(), 12);
    }

    #[test]
    fn snapshot_ids_sort_chronologically() {
        let mut ids = vec![
            SnapshotId::new("20240301T120000.000001Z-0000"),
            SnapshotId::new("20240102T090000.000000Z-0000"),
            SnapshotId::new("20240301T120000.000001Z-0001"),
        ];
        ids.sort();
        assert_eq!(ids[0].as_str(), "20240102T090000.000000Z-0000");
        assert_eq!(ids[2].as_str(), "20240301T120000.000001Z-0001");
    }

    #[test]
    fn snapshot_id_rejects_path_segments() {
        assert!(SnapshotId::new("20240102T090000.000000Z-0000").is_well_formed());
        assert!(!SnapshotId::new("../etc").is_well_formed());
        assert!(!SnapshotId::new("a/b").is_well_formed());
        assert!(!SnapshotId::new("").is_well_formed());
    }
}
