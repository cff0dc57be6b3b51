//! The encoder: one value, recursively, into the text grammar.
//!
//! Identity is assigned through the [`GraphContext`] the moment a reference
//! value's full payload begins, so any later sighting -- including a cycle
//! back through a member -- emits an `i` back-reference instead of recursing
//! forever. Entity- and definition-reference members never emit the referred
//! object at all, only a `g`/`m` marker carrying its identifier.
//!
//! Tabs and newlines are written for readability only; the decoder ignores
//! them.

use std::fmt::Write;

use crate::catalog::TypeRegistry;
use crate::context::{GraphContext, Identity};
use crate::descriptor::{EmitPolicy, MemberDescriptor, RefKind, Shape};
use crate::error::EncodeError;
use crate::id::TypeId;
use crate::scan::escape;
use crate::sig::TypeSig;
use crate::stringify::StringifierRegistry;
use crate::value::{Bounds, ObjRef, Value};

/// How the value currently being written is referenced from its slot.
/// Threaded down into collection elements and mapping keys, mirroring the
/// reference-kind table of the member that owns the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefMode {
    Plain,
    Entity,
    Definition,
}

pub struct Encoder<'a> {
    types: &'a TypeRegistry,
    stringifiers: &'a StringifierRegistry,
    ctx: &'a mut GraphContext,
    out: String,
}

impl<'a> Encoder<'a> {
    /// Serialize `value` under the declared signature into grammar text.
    pub fn run(
        types: &'a TypeRegistry,
        stringifiers: &'a StringifierRegistry,
        ctx: &'a mut GraphContext,
        value: &Value,
        declared: &TypeSig,
    ) -> Result<String, EncodeError> {
        let mut encoder = Encoder {
            types,
            stringifiers,
            ctx,
            out: String::new(),
        };
        encoder.write_value(value, declared, 0, RefMode::Plain, "root")?;
        Ok(encoder.out)
    }

    fn resolve(&self, sig: &TypeSig) -> Result<TypeId, EncodeError> {
        self.types
            .resolve(sig)
            .map_err(|_| EncodeError::UnknownType {
                signature: sig.to_string(),
            })
    }

    fn tabs(&mut self, level: usize) {
        for _ in 0..level {
            self.out.push('\t');
        }
    }

    /// `[signature] ':'` -- the signature is omitted when the runtime type
    /// matches the declared one, and the decoder falls back accordingly.
    fn prefix(&mut self, level: usize, runtime: TypeId, declared: TypeId) {
        self.tabs(level);
        if runtime != declared {
            let name = self.types.canonical(runtime).to_string();
            self.out.push_str(&name);
        }
        self.out.push(':');
    }

    fn write_value(
        &mut self,
        value: &Value,
        declared: &TypeSig,
        level: usize,
        mode: RefMode,
        slot: &str,
    ) -> Result<(), EncodeError> {
        let declared_id = self.resolve(declared)?;

        if value.is_null() {
            self.tabs(level);
            let name = self.types.canonical(declared_id).to_string();
            let _ = write!(self.out, "{name}:n;\n");
            return Ok(());
        }

        // Reference-kind slots write an identifier marker, never the payload.
        if let Value::Object(obj) = value {
            match mode {
                RefMode::Entity => return self.write_entity_marker(obj, level, slot),
                RefMode::Definition => return self.write_definition_marker(obj, level, slot),
                RefMode::Plain => {}
            }
        }

        let runtime_id = match value {
            Value::Object(obj) => {
                let runtime = obj.type_id();
                if !self.types.is_assignable(runtime, declared_id) {
                    return Err(EncodeError::TypeMismatch {
                        expected: self.types.canonical(declared_id).to_string(),
                        found: self.types.canonical(runtime).to_string(),
                    });
                }
                runtime
            }
            _ => declared_id,
        };

        if let Some(stringifier) = self.stringifiers.find_for(runtime_id, self.types) {
            let token = stringifier.stringify(value)?;
            self.prefix(level, runtime_id, declared_id);
            let _ = write!(self.out, "s:{};\n", escape(&token));
            return Ok(());
        }

        // Cycle/sharing detection for reference-shaped values.
        let addr = match value {
            Value::Seq(v) => Some(v.addr()),
            Value::Map(v) => Some(v.addr()),
            Value::Grid(v) => Some(v.addr()),
            Value::Object(v) => Some(v.addr()),
            _ => None,
        };
        if let Some(addr) = addr {
            if let Identity::Seen(seq) = self.ctx.id_for(runtime_id, addr, value) {
                self.prefix(level, runtime_id, declared_id);
                let _ = write!(self.out, "i{seq};\n");
                return Ok(());
            }
        }

        let desc = self.types.descriptor(runtime_id);
        let mismatch = |expected: &str| EncodeError::TypeMismatch {
            expected: expected.to_string(),
            found: value.shape_name().to_string(),
        };

        match (&desc.shape, value) {
            (Shape::Bool, Value::Bool(b)) => {
                self.prefix(level, runtime_id, declared_id);
                let _ = write!(self.out, "{b};\n");
            }
            (Shape::Int, Value::Int(i)) => {
                self.prefix(level, runtime_id, declared_id);
                let _ = write!(self.out, "{i};\n");
            }
            (Shape::Float, Value::Float(f)) => {
                self.prefix(level, runtime_id, declared_id);
                let _ = write!(self.out, "{f};\n");
            }
            (Shape::Text, Value::Text(s)) => {
                self.prefix(level, runtime_id, declared_id);
                let _ = write!(self.out, "\"{}\";\n", escape(s));
            }
            (Shape::Enum { variants }, Value::Enum(variant)) => {
                if !variants.contains(variant) {
                    return Err(EncodeError::UnknownVariant {
                        signature: desc.name.to_string(),
                        variant: variant.clone(),
                    });
                }
                self.prefix(level, runtime_id, declared_id);
                let _ = write!(self.out, "{variant};\n");
            }
            (Shape::Sequence { elem }, Value::Seq(seq)) => {
                let items = seq.borrow().clone();
                self.prefix(level, runtime_id, declared_id);
                let _ = write!(self.out, "c{}:\n", items.len());
                let elem = elem.clone();
                for item in &items {
                    self.write_value(item, &elem, level + 1, mode, slot)?;
                }
                self.tabs(level);
                self.out.push_str(";\n");
            }
            (Shape::Mapping { key, value: val }, Value::Map(map)) => {
                let pairs = map.borrow().clone();
                self.prefix(level, runtime_id, declared_id);
                let _ = write!(self.out, "d{}:\n", pairs.len());
                let (key, val) = (key.clone(), val.clone());
                for (k, v) in &pairs {
                    self.write_value(k, &key, level + 1, mode, slot)?;
                    self.write_value(v, &val, level + 1, RefMode::Plain, slot)?;
                }
                self.tabs(level);
                self.out.push_str(";\n");
            }
            (Shape::Grid { elem }, Value::Grid(grid)) => {
                let (bounds, cells) = {
                    let g = grid.borrow();
                    (g.bounds, g.cells.clone())
                };
                self.prefix(level, runtime_id, declared_id);
                let _ = write!(self.out, "a{}:\n", bounds_text(&bounds));
                let elem = elem.clone();
                for cell in &cells {
                    self.write_value(cell, &elem, level + 1, RefMode::Plain, slot)?;
                }
                self.tabs(level);
                self.out.push_str(";\n");
            }
            (Shape::Composite { .. }, Value::Object(obj)) => {
                self.write_object(obj, runtime_id, declared_id, level)?;
            }
            (Shape::Bool, _) => return Err(mismatch("Bool")),
            (Shape::Int, _) => return Err(mismatch("Int")),
            (Shape::Float, _) => return Err(mismatch("Float")),
            (Shape::Text, _) => return Err(mismatch("Text")),
            (Shape::Enum { .. }, _) => return Err(mismatch(&desc.name.to_string())),
            (Shape::Sequence { .. }, _) => return Err(mismatch("sequence")),
            (Shape::Mapping { .. }, _) => return Err(mismatch("mapping")),
            (Shape::Grid { .. }, _) => return Err(mismatch("array")),
            (Shape::Composite { .. }, _) => return Err(mismatch(&desc.name.to_string())),
        }
        Ok(())
    }

    fn write_entity_marker(
        &mut self,
        obj: &ObjRef,
        level: usize,
        slot: &str,
    ) -> Result<(), EncodeError> {
        let id = obj
            .borrow()
            .entity_id
            .ok_or_else(|| EncodeError::MissingIdentity {
                member: slot.to_string(),
            })?;
        self.tabs(level);
        let _ = write!(self.out, ":g{id};\n");
        Ok(())
    }

    fn write_definition_marker(
        &mut self,
        obj: &ObjRef,
        level: usize,
        slot: &str,
    ) -> Result<(), EncodeError> {
        let key = obj
            .borrow()
            .definition_key
            .clone()
            .ok_or_else(|| EncodeError::MissingDefinitionKey {
                member: slot.to_string(),
            })?;
        self.tabs(level);
        let _ = write!(self.out, ":m\"{}\";\n", escape(&key));
        Ok(())
    }

    fn write_object(
        &mut self,
        obj: &ObjRef,
        runtime_id: TypeId,
        declared_id: TypeId,
        level: usize,
    ) -> Result<(), EncodeError> {
        let desc = self.types.descriptor(runtime_id);
        let Shape::Composite {
            members, data_view, ..
        } = &desc.shape
        else {
            unreachable!("write_object called for non-composite shape");
        };

        // (member metadata, current value) pairs in emission order.
        let mut emitted: Vec<(&MemberDescriptor, Value)> = Vec::new();
        if let Some(view) = data_view {
            let pairs = (view.export)(&obj.borrow());
            for (name, value) in pairs {
                let member =
                    desc.member(&name)
                        .ok_or_else(|| EncodeError::UnknownMember {
                            type_name: desc.name.to_string(),
                            member: name.clone(),
                        })?;
                emitted.push((member, value));
            }
        } else {
            let mut order: Vec<&MemberDescriptor> = members
                .iter()
                .filter(|m| m.policy != EmitPolicy::Never)
                .collect();
            order.sort_by_key(|m| m.priority);
            let instance = obj.borrow();
            for member in order {
                let default = self
                    .types
                    .default_value(self.resolve(&member.sig)?);
                let current = instance.field(&member.name).cloned().unwrap_or(default.clone());
                if member.policy == EmitPolicy::SkipDefault && current == default {
                    continue;
                }
                emitted.push((member, current));
            }
        }

        self.prefix(level, runtime_id, declared_id);
        let _ = write!(self.out, "p{}:\n", emitted.len());
        for (member, value) in emitted {
            self.tabs(level + 1);
            let _ = write!(self.out, "{}:\n", member.name);
            let mode = match member.kind {
                RefKind::Plain => RefMode::Plain,
                RefKind::Entity | RefKind::EntityList | RefKind::EntityKeyedMap => RefMode::Entity,
                RefKind::Definition | RefKind::DefinitionList | RefKind::DefinitionKeyedMap => {
                    RefMode::Definition
                }
            };
            self.write_value(&value, &member.sig, level + 2, mode, &member.name)?;
        }
        self.tabs(level);
        self.out.push_str(";\n");
        Ok(())
    }
}

fn bounds_text(bounds: &Bounds) -> String {
    match bounds {
        Bounds::One { min, max } => format!("{min}_{max}"),
        Bounds::Two { min, max } => {
            format!("{}_{},{}_{}", min[0], max[0], min[1], max[1])
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{MemberDescriptor, TypeDescriptor};
    use crate::value::Instance;

    fn setup() -> (TypeRegistry, StringifierRegistry) {
        let types = TypeRegistry::new();
        types
            .register(TypeDescriptor::composite(
                TypeSig::named("Officer"),
                vec![
                    MemberDescriptor::plain("Name", TypeSig::named("Text")),
                    MemberDescriptor::plain("Partner", TypeSig::named("Officer")),
                    MemberDescriptor::plain("Rank", TypeSig::named("Int")),
                ],
            ))
            .unwrap();
        (types, StringifierRegistry::new())
    }

    fn encode(types: &TypeRegistry, value: &Value, declared: &TypeSig) -> String {
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        Encoder::run(types, &strs, &mut ctx, value, declared).unwrap()
    }

    #[test]
    fn scalar_payload_has_no_signature() {
        let (types, _) = setup();
        let text = encode(&types, &Value::Int(42), &TypeSig::named("Int"));
        assert_eq!(text.trim_end(), ":42;");
    }

    #[test]
    fn null_payload_names_the_declared_type() {
        let (types, _) = setup();
        let text = encode(&types, &Value::Null, &TypeSig::named("Officer"));
        assert_eq!(text.trim_end(), "Officer:n;");
    }

    #[test]
    fn text_is_quoted_and_escaped() {
        let (types, _) = setup();
        let text = encode(
            &types,
            &Value::text(r#"say "hi"; ok\done"#),
            &TypeSig::named("Text"),
        );
        assert_eq!(text.trim_end(), r#":"say \"hi\"\; ok\\done";"#);
    }

    #[test]
    fn float_tokens_round_trip_exactly() {
        let (types, _) = setup();
        let text = encode(&types, &Value::Float(0.1), &TypeSig::named("Float"));
        assert_eq!(text.trim_end(), ":0.1;");
    }

    #[test]
    fn default_members_are_skipped() {
        let (types, _) = setup();
        let mut instance = Instance::new(types.resolve(&TypeSig::named("Officer")).unwrap());
        instance.set_field("Name", Value::text("Reyes"));
        // Rank stays 0, Partner stays null: both defaults, both skipped.
        let text = encode(&types, &Value::object(instance), &TypeSig::named("Officer"));
        assert!(text.contains("p1:"), "got: {text}");
        assert!(text.contains("Name:"), "got: {text}");
        assert!(!text.contains("Rank:"), "got: {text}");
    }

    #[test]
    fn mutual_cycle_emits_one_payload_and_one_backref() {
        let (types, _) = setup();
        let officer = types.resolve(&TypeSig::named("Officer")).unwrap();
        let a = ObjRef::new(Instance::new(officer));
        let b = ObjRef::new(Instance::new(officer));
        a.borrow_mut().set_field("Name", Value::text("George"));
        a.borrow_mut().set_field("Partner", Value::Object(b.clone()));
        b.borrow_mut().set_field("Name", Value::text("Brad"));
        b.borrow_mut().set_field("Partner", Value::Object(a.clone()));

        let text = encode(&types, &Value::Object(a), &TypeSig::named("Officer"));
        assert_eq!(text.matches("p2:").count(), 2, "two full payloads: {text}");
        assert_eq!(text.matches(":i0;").count(), 1, "one back-reference: {text}");
    }

    #[test]
    fn shared_value_is_emitted_once() {
        let (types, _) = setup();
        let shared = Value::seq(vec![Value::Int(1), Value::Int(2)]);
        let both = Value::seq(vec![shared.clone(), shared]);
        let declared = TypeSig::seq_of(TypeSig::seq_of(TypeSig::named("Int")));
        let text = encode(&types, &both, &declared);
        assert_eq!(text.matches("c2:").count(), 2, "outer + first inner: {text}");
        // Sequence numbers are per type: the inner Seq<Int> got 0 for its own type.
        assert!(text.contains(":i0;"), "second sighting backrefs: {text}");
    }

    #[test]
    fn subtype_emits_its_signature_supertype_does_not() {
        let types = TypeRegistry::new();
        types
            .register(TypeDescriptor::composite(TypeSig::named("Vehicle"), vec![]))
            .unwrap();
        types
            .register(
                TypeDescriptor::composite(TypeSig::named("Ship"), vec![])
                    .with_base(TypeSig::named("Vehicle")),
            )
            .unwrap();
        let ship = types.resolve(&TypeSig::named("Ship")).unwrap();
        let value = Value::object(Instance::new(ship));
        let text = encode(&types, &value, &TypeSig::named("Vehicle"));
        assert!(text.starts_with("Ship:"), "got: {text}");
        let text = encode(&types, &value, &TypeSig::named("Ship"));
        assert!(text.starts_with(":p0:"), "got: {text}");
    }

    #[test]
    fn wrong_shape_is_a_type_mismatch() {
        let (types, _) = setup();
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let err = Encoder::run(
            &types,
            &strs,
            &mut ctx,
            &Value::text("not an int"),
            &TypeSig::named("Int"),
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { .. }));
    }

    #[test]
    fn unknown_enum_variant_is_rejected() {
        let types = TypeRegistry::new();
        types
            .register(TypeDescriptor::enumeration(
                TypeSig::named("Standing"),
                &["Neutral", "Allied"],
            ))
            .unwrap();
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let err = Encoder::run(
            &types,
            &strs,
            &mut ctx,
            &Value::Enum("Chummy".to_string()),
            &TypeSig::named("Standing"),
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::UnknownVariant { .. }));
    }

    #[test]
    fn grid_writes_bounds_and_cells() {
        let (types, _) = setup();
        let grid = Value::grid(
            Bounds::Two {
                min: [0, 0],
                max: [1, 1],
            },
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)],
        );
        let text = encode(&types, &grid, &TypeSig::grid_of(TypeSig::named("Int")));
        assert!(text.contains("a0_1,0_1:"), "got: {text}");
        assert_eq!(text.matches(';').count(), 5, "4 cells + terminator: {text}");
    }
}
