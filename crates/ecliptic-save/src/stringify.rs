//! Pluggable single-token converters.
//!
//! A stringifier claims a registered type and turns its values into one
//! opaque text token and back, instead of the full composite payload. The
//! two directions must be pure and mutually inverse. Tokens are escaped on
//! the wire, so a stringifier may produce any text.

use crate::catalog::TypeRegistry;
use crate::error::EncodeError;
use crate::id::TypeId;
use crate::sig::TypeSig;
use crate::value::{Instance, Value};

/// A bidirectional value <-> token converter for one registered type.
pub trait Stringifier {
    /// The canonical signature of the type this converter claims.
    fn signature(&self) -> &TypeSig;

    fn stringify(&self, value: &Value) -> Result<String, EncodeError>;

    /// Rebuild a value from its token. The error is a plain reason; the
    /// decoder attaches stream position and context.
    fn destringify(&self, text: &str) -> Result<Value, String>;
}

/// Registry of stringifiers, matched by walking a type's base-type ancestry:
/// the most-derived claiming converter wins.
#[derive(Default)]
pub struct StringifierRegistry {
    entries: Vec<Box<dyn Stringifier>>,
}

impl StringifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter. Idempotent: a second converter for an
    /// already-claimed signature is discarded.
    pub fn register(&mut self, stringifier: Box<dyn Stringifier>) {
        let sig = stringifier.signature().to_string();
        if self.entries.iter().any(|e| e.signature().to_string() == sig) {
            return;
        }
        self.entries.push(stringifier);
    }

    /// The converter claiming `type_id` or the nearest of its base types.
    pub fn find_for(&self, type_id: TypeId, types: &TypeRegistry) -> Option<&dyn Stringifier> {
        let mut cur = Some(type_id);
        while let Some(id) = cur {
            let name = types.canonical(id);
            if let Some(found) = self.entries.iter().find(|e| *e.signature() == name) {
                return Some(found.as_ref());
            }
            cur = types.base_of(id);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// ARGB color converter: `a,r,g,b` byte quadruple.
///
/// Colors appear everywhere in empire data; writing them as one token keeps
/// saves compact and independent of the composite member order.
pub struct ColorStringifier {
    sig: TypeSig,
    type_id: TypeId,
}

impl ColorStringifier {
    const CHANNELS: [&'static str; 4] = ["A", "R", "G", "B"];

    pub fn new(types: &TypeRegistry, type_id: TypeId) -> Self {
        Self {
            sig: types.canonical(type_id),
            type_id,
        }
    }
}

impl Stringifier for ColorStringifier {
    fn signature(&self) -> &TypeSig {
        &self.sig
    }

    fn stringify(&self, value: &Value) -> Result<String, EncodeError> {
        let Value::Object(obj) = value else {
            return Err(EncodeError::TypeMismatch {
                expected: self.sig.to_string(),
                found: value.shape_name().to_string(),
            });
        };
        let instance = obj.borrow();
        let mut channels = [0i64; 4];
        for (slot, name) in channels.iter_mut().zip(Self::CHANNELS) {
            match instance.field(name) {
                Some(Value::Int(v)) => *slot = *v,
                None => *slot = 0,
                Some(other) => {
                    return Err(EncodeError::TypeMismatch {
                        expected: "Int channel".to_string(),
                        found: other.shape_name().to_string(),
                    });
                }
            }
        }
        Ok(format!(
            "{},{},{},{}",
            channels[0], channels[1], channels[2], channels[3]
        ))
    }

    fn destringify(&self, text: &str) -> Result<Value, String> {
        let parts: Vec<&str> = text.split(',').collect();
        if parts.len() != 4 {
            return Err(format!("colors must have 4 ARGB values, got {}", parts.len()));
        }
        let mut instance = Instance::new(self.type_id);
        for (part, name) in parts.iter().zip(Self::CHANNELS) {
            let channel: u8 = part
                .trim()
                .parse()
                .map_err(|_| format!("could not parse ARGB channel '{part}'"))?;
            instance.set_field(name, Value::Int(channel as i64));
        }
        Ok(Value::object(instance))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
