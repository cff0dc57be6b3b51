//! The type registry: canonical signatures to runtime descriptors.
//!
//! Process-lifetime and read-mostly. Registration is idempotent (the first
//! descriptor for a signature wins; re-registering is a no-op) and builtin
//! generic instantiations (`Seq<...>`, `Mapping<...>`, `Grid<...>`) are
//! materialized lazily on first resolution. Both paths go through one narrow
//! write lock, so sharing a registry across threads is safe; everything else
//! is plain reads.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::aliases::normalize;
use crate::descriptor::{Shape, TypeDescriptor};
use crate::error::DecodeError;
use crate::id::TypeId;
use crate::sig::TypeSig;
use crate::value::{Instance, Value};

/// Canonical names of the builtin types and generic constructors.
pub mod builtin {
    pub const BOOL: &str = "Bool";
    pub const INT: &str = "Int";
    pub const FLOAT: &str = "Float";
    pub const TEXT: &str = "Text";
    pub const SEQ: &str = "Seq";
    pub const MAPPING: &str = "Mapping";
    pub const GRID: &str = "Grid";
}

/// Errors raised while registering a type.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("base type '{0}' is not registered")]
    UnknownBase(String),
}

struct TypeRecord {
    desc: Arc<TypeDescriptor>,
    base: Option<TypeId>,
}

#[derive(Default)]
struct RegistryInner {
    records: Vec<TypeRecord>,
    by_name: HashMap<String, TypeId>,
}

/// Maps between canonical textual type signatures and runtime descriptors,
/// resolving legacy signatures through the alias table.
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl TypeRegistry {
    /// A registry with the builtin scalar and text types pre-registered.
    pub fn new() -> Self {
        let registry = Self {
            inner: RwLock::new(RegistryInner::default()),
        };
        for (name, shape) in [
            (builtin::BOOL, Shape::Bool),
            (builtin::INT, Shape::Int),
            (builtin::FLOAT, Shape::Float),
            (builtin::TEXT, Shape::Text),
        ] {
            registry.insert(TypeDescriptor {
                name: TypeSig::named(name),
                shape,
                base: None,
            }, None);
        }
        registry
    }

    /// Register a type. Idempotent: if the signature is already known the
    /// existing id is returned and the new descriptor is discarded.
    pub fn register(&self, desc: TypeDescriptor) -> Result<TypeId, RegistryError> {
        let key = desc.name.to_string();
        if let Some(id) = self.lookup(&key) {
            return Ok(id);
        }
        let base = match &desc.base {
            Some(b) => Some(
                self.lookup(&b.to_string())
                    .ok_or_else(|| RegistryError::UnknownBase(b.to_string()))?,
            ),
            None => None,
        };
        Ok(self.insert(desc, base))
    }

    /// Resolve a parsed signature to a type id, materializing builtin
    /// generic instantiations on first sight.
    pub fn resolve(&self, sig: &TypeSig) -> Result<TypeId, DecodeError> {
        let key = sig.to_string();
        if let Some(id) = self.lookup(&key) {
            return Ok(id);
        }
        let shape = match (sig.name.as_str(), sig.args.len()) {
            (builtin::SEQ, 1) => Shape::Sequence {
                elem: sig.args[0].clone(),
            },
            (builtin::MAPPING, 2) => Shape::Mapping {
                key: sig.args[0].clone(),
                value: sig.args[1].clone(),
            },
            (builtin::GRID, 1) => Shape::Grid {
                elem: sig.args[0].clone(),
            },
            _ => return Err(DecodeError::UnknownType { signature: key }),
        };
        for arg in &sig.args {
            self.resolve(arg)?;
        }
        Ok(self.insert(
            TypeDescriptor {
                name: sig.clone(),
                shape,
                base: None,
            },
            None,
        ))
    }

    /// Resolve a signature string, falling back to alias normalization and
    /// retrying exactly once.
    pub fn resolve_text(&self, text: &str) -> Result<TypeId, DecodeError> {
        let unknown = || DecodeError::UnknownType {
            signature: text.to_string(),
        };
        let sig = TypeSig::parse(text).map_err(|_| unknown())?;
        match self.resolve(&sig) {
            Ok(id) => Ok(id),
            Err(DecodeError::UnknownType { .. }) => {
                let rewritten = normalize(text);
                if rewritten == text {
                    return Err(unknown());
                }
                let sig = TypeSig::parse(&rewritten).map_err(|_| unknown())?;
                let id = self.resolve(&sig).map_err(|_| unknown())?;
                debug!(legacy = text, canonical = %sig, "resolved legacy type signature");
                Ok(id)
            }
            Err(other) => Err(other),
        }
    }

    /// The canonical signature for a type id. Exact inverse of [`resolve`]
    /// for every type the encoder emits.
    ///
    /// [`resolve`]: TypeRegistry::resolve
    pub fn canonical(&self, id: TypeId) -> TypeSig {
        self.record(id).desc.name.clone()
    }

    pub fn descriptor(&self, id: TypeId) -> Arc<TypeDescriptor> {
        self.record(id).desc.clone()
    }

    pub fn base_of(&self, id: TypeId) -> Option<TypeId> {
        self.record(id).base
    }

    /// Is `sub` the same type as `sup`, or derived from it?
    pub fn is_assignable(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut cur = Some(sub);
        while let Some(id) = cur {
            if id == sup {
                return true;
            }
            cur = self.base_of(id);
        }
        false
    }

    /// The value an unwritten member of this type decodes to, and the value
    /// an equal member compares against when deciding whether to emit.
    pub fn default_value(&self, id: TypeId) -> Value {
        match &self.record(id).desc.shape {
            Shape::Bool => Value::Bool(false),
            Shape::Int => Value::Int(0),
            Shape::Float => Value::Float(0.0),
            Shape::Enum { variants } => variants
                .first()
                .map(|v| Value::Enum(v.clone()))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// A zero-initialized instance of a composite type: every member starts
    /// at its default. This is exactly the instance the decoder constructs
    /// before reading a `p` payload, so domain code that builds instances
    /// this way compares equal after a round trip.
    pub fn instantiate(&self, id: TypeId) -> Result<Instance, DecodeError> {
        let desc = self.descriptor(id);
        let mut instance = Instance::new(id);
        for member in desc.members() {
            let member_type = self.resolve(&member.sig)?;
            instance.set_field(&member.name, self.default_value(member_type));
        }
        Ok(instance)
    }

    pub fn type_count(&self) -> usize {
        self.inner.read().expect("type registry lock poisoned").records.len()
    }

    fn lookup(&self, key: &str) -> Option<TypeId> {
        self.inner
            .read()
            .expect("type registry lock poisoned")
            .by_name
            .get(key)
            .copied()
    }

    fn record(&self, id: TypeId) -> TypeRecord {
        let inner = self.inner.read().expect("type registry lock poisoned");
        let record = &inner.records[id.0 as usize];
        TypeRecord {
            desc: record.desc.clone(),
            base: record.base,
        }
    }

    fn insert(&self, desc: TypeDescriptor, base: Option<TypeId>) -> TypeId {
        let mut inner = self.inner.write().expect("type registry lock poisoned");
        let key = desc.name.to_string();
        // A concurrent registration may have won the race; first one in wins.
        if let Some(id) = inner.by_name.get(&key) {
            return *id;
        }
        let id = TypeId(inner.records.len() as u32);
        inner.records.push(TypeRecord {
            desc: Arc::new(desc),
            base,
        });
        inner.by_name.insert(key, id);
        id
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
