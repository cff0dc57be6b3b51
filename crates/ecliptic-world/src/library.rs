//! The definition library: immutable, string-keyed definition objects.
//!
//! Definitions (hulls, designs, ability templates) are shared across a
//! ruleset and never serialized in full inside a save; the engine writes
//! only their keys in `m` markers and resolves them here on load. The
//! library is frozen after [`DefinitionLibraryBuilder::build`], so sharing
//! it is safe.

use std::collections::BTreeMap;

use ecliptic_save::context::DefinitionLookup;
use ecliptic_save::value::ObjRef;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("duplicate definition key: {0}")]
    DuplicateKey(String),
}

/// Accumulates definitions before the library is frozen.
#[derive(Default)]
pub struct DefinitionLibraryBuilder {
    entries: BTreeMap<String, ObjRef>,
}

impl DefinitionLibraryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under its stable key, stamping the key onto
    /// the instance so reference members can be encoded from it.
    pub fn register(&mut self, key: &str, obj: &ObjRef) -> Result<(), LibraryError> {
        if self.entries.contains_key(key) {
            return Err(LibraryError::DuplicateKey(key.to_string()));
        }
        obj.borrow_mut().definition_key = Some(key.to_string());
        self.entries.insert(key.to_string(), obj.clone());
        Ok(())
    }

    /// A definition registered earlier in this builder, for wiring
    /// definitions that reference each other.
    pub fn get(&self, key: &str) -> Option<ObjRef> {
        self.entries.get(key).cloned()
    }

    pub fn build(self) -> DefinitionLibrary {
        DefinitionLibrary {
            entries: self.entries,
        }
    }
}

/// Immutable after build. Thread-safe to share by reference.
pub struct DefinitionLibrary {
    entries: BTreeMap<String, ObjRef>,
}

impl DefinitionLibrary {
    pub fn get(&self, key: &str) -> Option<ObjRef> {
        self.entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl DefinitionLookup for DefinitionLibrary {
    fn definition(&self, key: &str) -> Option<ObjRef> {
        self.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecliptic_save::id::TypeId;
    use ecliptic_save::value::Instance;

    fn obj() -> ObjRef {
        ObjRef::new(Instance::new(TypeId(0)))
    }

    #[test]
    fn register_stamps_the_key() {
        let mut builder = DefinitionLibraryBuilder::new();
        let hull = obj();
        builder.register("hull_frigate", &hull).unwrap();
        assert_eq!(
            hull.borrow().definition_key.as_deref(),
            Some("hull_frigate")
        );

        let lib = builder.build();
        assert_eq!(lib.len(), 1);
        assert!(lib.get("hull_frigate").unwrap().ptr_eq(&hull));
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut builder = DefinitionLibraryBuilder::new();
        builder.register("hull_frigate", &obj()).unwrap();
        let result = builder.register("hull_frigate", &obj());
        assert!(matches!(result, Err(LibraryError::DuplicateKey(_))));
    }

    #[test]
    fn lookup_of_missing_key_is_none() {
        let lib = DefinitionLibraryBuilder::new().build();
        assert!(lib.get("nothing").is_none());
        assert!(lib.is_empty());
    }

    #[test]
    fn keys_iterate_in_sorted_order() {
        let mut builder = DefinitionLibraryBuilder::new();
        builder.register("b", &obj()).unwrap();
        builder.register("a", &obj()).unwrap();
        let lib = builder.build();
        let keys: Vec<&str> = lib.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
