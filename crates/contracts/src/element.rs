//! Element types carried by readout streams.
//!
//! Streams are typed in Rust wherever the caller knows the type statically.
//! At the registry boundary the type travels as an [`ElementType`] tag.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

/// Anything that can be stored in a stream and written to an output event.
pub trait Element: Any + Clone + fmt::Debug + Serialize {}

impl<T> Element for T where T: Any + Clone + fmt::Debug + Serialize {}

/// Runtime tag of a stream's element type.
#[derive(Clone, Copy)]
pub struct ElementType {
    id: TypeId,
    name: &'static str,
}

impl ElementType {
    /// Tag for `T`.
    pub fn of<T: Element>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Whether this tag denotes `T`.
    #[inline]
    pub fn is<T: Element>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path (`Vec<u8>` rather than `alloc::vec::Vec<u8>`).
    pub fn short_name(&self) -> &'static str {
        let head_end = self.name.find('<').unwrap_or(self.name.len());
        let start = self.name[..head_end].rfind("::").map_or(0, |i| i + 2);
        &self.name[start..]
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ElementType {}

impl Hash for ElementType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementType({})", self.short_name())
    }
}

impl Serialize for ElementType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Hit {
        energy: f64,
    }

    #[test]
    fn test_tag_equality() {
        assert_eq!(ElementType::of::<Hit>(), ElementType::of::<Hit>());
        assert_ne!(ElementType::of::<Hit>(), ElementType::of::<u32>());
        assert!(ElementType::of::<Hit>().is::<Hit>());
        assert!(!ElementType::of::<Hit>().is::<f64>());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(ElementType::of::<Hit>().short_name(), "Hit");
        assert_eq!(ElementType::of::<u32>().short_name(), "u32");
        assert!(ElementType::of::<Vec<u8>>().short_name().starts_with("Vec<"));
    }

    #[test]
    fn test_display() {
        assert_eq!(ElementType::of::<Hit>().to_string(), "Hit");
    }
}
