use std::fmt;

/// Identifies a registered type in the type registry. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// Identifies a live entity in the entity repository.
///
/// Entity identifiers are assigned by the repository and survive save/load;
/// they are written to the wire as plain integers in `g` reference markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

/// Per-type sequence number assigned to a reference value within one graph.
///
/// The first full emission of a reference value gets the next sequence number
/// for its type; later sightings are written as `i` back-references carrying
/// this number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_id_equality() {
        let a = TypeId(0);
        let b = TypeId(0);
        let c = TypeId(1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn entity_id_display_is_bare_integer() {
        assert_eq!(EntityId(7).to_string(), "7");
        assert_eq!(SeqId(12).to_string(), "12");
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(EntityId(1), "scout");
        map.insert(EntityId(2), "colony ship");
        assert_eq!(map[&EntityId(1)], "scout");
    }
}
