//! StreamId - Cheap-to-clone stream identifier
//!
//! Uses Arc<str> internally for O(1) clone operations.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Name of a registered data stream (collection).
///
/// Internally uses `Arc<str>` so cloning only increments a reference count.
/// Stream names are fixed during registration and cloned on every trigger,
/// every output collection and every dependency edge.
///
/// # Examples
/// ```
/// use contracts::StreamId;
///
/// let id: StreamId = "EcalHits".into();
/// let id2 = id.clone();
/// assert_eq!(id, id2);
/// assert_eq!(id.as_str(), "EcalHits");
/// ```
#[derive(Clone, Default)]
pub struct StreamId(Arc<str>);

impl StreamId {
    /// Create a new StreamId from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for StreamId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for StreamId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StreamId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for StreamId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&String> for StreamId {
    #[inline]
    fn from(s: &String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

impl From<&StreamId> for StreamId {
    #[inline]
    fn from(s: &StreamId) -> Self {
        s.clone()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({:?})", self.0)
    }
}

impl PartialEq for StreamId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for StreamId {}

impl PartialEq<str> for StreamId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for StreamId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialEq<String> for StreamId {
    #[inline]
    fn eq(&self, other: &String) -> bool {
        self.0.as_ref() == other
    }
}

// Ordering must agree with `str` so that `BTreeMap<StreamId, _>` can be queried by `&str`.
impl Ord for StreamId {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for StreamId {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Hash - same as str hash for HashMap compatibility
impl Hash for StreamId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for StreamId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_clone_is_cheap() {
        let id1: StreamId = "EcalHits".into();
        let id2 = id1.clone();

        assert_eq!(id1.as_str().as_ptr(), id2.as_str().as_ptr());
    }

    #[test]
    fn test_equality() {
        let id: StreamId = "Clusters".into();
        assert_eq!(id, "Clusters");
        assert_eq!(id, String::from("Clusters"));
        assert_eq!(id, StreamId::from("Clusters"));
    }

    #[test]
    fn test_hashmap_key() {
        let mut map: HashMap<StreamId, i32> = HashMap::new();
        map.insert("Hits".into(), 1);
        map.insert("Clusters".into(), 2);

        assert_eq!(map.get("Hits"), Some(&1));
        assert_eq!(map.get("Clusters"), Some(&2));
    }

    #[test]
    fn test_btreemap_lookup_by_str() {
        let mut map: BTreeMap<StreamId, i32> = BTreeMap::new();
        map.insert("b".into(), 2);
        map.insert("a".into(), 1);

        assert_eq!(map.get("a"), Some(&1));
        let keys: Vec<&str> = map.keys().map(StreamId::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_serde() {
        let id: StreamId = "McParticles".into();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"McParticles\"");

        let parsed: StreamId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
