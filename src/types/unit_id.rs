use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Stable key for a unit in any layer or table.
/// Keeps the original id text (with leading zeros) but avoids repeated owned Strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(Arc<str>);

impl UnitId {
    pub fn new(id: &str) -> Self { Self(Arc::from(id)) }

    #[inline] pub fn as_str(&self) -> &str { &self.0 }

    /// Returns the id truncated to its first `len` characters, e.g. a block id
    /// truncated to 12 characters is its block group id.
    /// If the id is shorter than `len`, the full id is returned.
    pub fn prefix(&self, len: usize) -> &str {
        match self.0.char_indices().nth(len) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl Borrow<str> for UnitId {
    fn borrow(&self) -> &str { &self.0 }
}

impl AsRef<str> for UnitId {
    fn as_ref(&self) -> &str { &self.0 }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self { Self::new(id) }
}

impl From<String> for UnitId {
    fn from(id: String) -> Self { Self(Arc::from(id)) }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[cfg(test)]
mod tests {
    use ahash::AHashMap;

    use super::UnitId;

    #[test]
    fn prefix_truncates_and_saturates() {
        let block = UnitId::from("310010001001001");
        assert_eq!(block.prefix(12), "310010001001");
        assert_eq!(block.prefix(2), "31");
        assert_eq!(block.prefix(40), "310010001001001");
    }

    #[test]
    fn lookup_by_str() {
        let mut index = AHashMap::new();
        index.insert(UnitId::from("P1"), 7usize);
        assert_eq!(index.get("P1"), Some(&7));
        assert_eq!(index.get("P2"), None);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = UnitId::from("06075");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"06075\"");
        let back: UnitId = serde_json::from_str("\"06075\"").unwrap();
        assert_eq!(back, id);
    }
}
