//! The decoder: grammar text back into a value graph.
//!
//! Mirrors the encoder step for step. Every freshly constructed reference
//! value is registered in the [`GraphContext`] before its elements or
//! members decode, so `i` back-references -- including cycles -- resolve to
//! the partially built value. Entity (`g`) and definition (`m`) markers do
//! not resolve inline: they queue a deferred action that patches the exact
//! pending slot once the whole graph has been read, because the repositories
//! they point into may not be fully populated until then.

use std::sync::Arc;

use tracing::warn;

use crate::catalog::TypeRegistry;
use crate::context::{GraphContext, PendingResolutions};
use crate::descriptor::{Shape, TypeDescriptor};
use crate::error::DecodeError;
use crate::id::{EntityId, SeqId, TypeId};
use crate::scan::Scanner;
use crate::sig::TypeSig;
use crate::stringify::{Stringifier, StringifierRegistry};
use crate::value::{Bounds, Grid, GridRef, MapRef, ObjRef, SeqRef, Value};

/// Outcome of decoding one value position.
///
/// Reference markers cannot produce their final value inline; the caller
/// that owns the slot queues the patch and stores a null placeholder.
#[derive(Debug)]
pub(crate) enum Decoded {
    Now(Value),
    Entity(EntityId),
    Definition(String),
}

pub(crate) struct Decoder<'a> {
    types: &'a TypeRegistry,
    stringifiers: &'a StringifierRegistry,
    ctx: &'a mut GraphContext,
    scan: Scanner<'a>,
}

impl<'a> Decoder<'a> {
    /// Decode one root value and hand back the deferred-action queue.
    pub(crate) fn run(
        types: &'a TypeRegistry,
        stringifiers: &'a StringifierRegistry,
        ctx: &'a mut GraphContext,
        text: &'a str,
        declared: &TypeSig,
    ) -> Result<(Decoded, PendingResolutions), DecodeError> {
        let mut decoder = Decoder {
            types,
            stringifiers,
            ctx,
            scan: Scanner::new(text),
        };
        let root = decoder.decode_value(declared)?;
        let pending = decoder.ctx.take_deferred();
        Ok((root, pending))
    }

    fn decode_value(&mut self, declared: &TypeSig) -> Result<Decoded, DecodeError> {
        self.scan.skip_ws();
        let sig_text = self.scan.read_until(':', "type signature")?;
        let sig_text = sig_text.trim();

        let declared_id = self.types.resolve(declared)?;
        let type_id = if sig_text.is_empty() {
            declared_id
        } else {
            self.types.resolve_text(sig_text)?
        };
        if !self.types.is_assignable(type_id, declared_id) {
            let (line, column) = self.scan.position();
            return Err(DecodeError::TypeMismatch {
                expected: self.types.canonical(declared_id).to_string(),
                found: self.types.canonical(type_id).to_string(),
                line,
                column,
            });
        }

        if let Some(stringifier) = self.stringifiers.find_for(type_id, self.types) {
            return self.decode_stringified(type_id, stringifier);
        }

        let desc = self.types.descriptor(type_id);
        match &desc.shape {
            Shape::Bool | Shape::Int | Shape::Float | Shape::Enum { .. } => {
                self.decode_scalar(&desc)
            }
            Shape::Text => self.decode_text(),
            Shape::Sequence { elem } => {
                let elem = elem.clone();
                let tag = self.scan.read_tag("'c'/'i'/'n'")?;
                match tag {
                    'c' => self.decode_seq_payload(type_id, &elem),
                    'i' => self.decode_backref(type_id),
                    'n' => self.decode_null(),
                    other => Err(self.scan.malformed("'c'/'i'/'n'", other.to_string())),
                }
            }
            Shape::Mapping { key, value } => {
                let (key, value) = (key.clone(), value.clone());
                let tag = self.scan.read_tag("'d'/'i'/'n'")?;
                match tag {
                    'd' => self.decode_map_payload(type_id, &key, &value),
                    'i' => self.decode_backref(type_id),
                    'n' => self.decode_null(),
                    other => Err(self.scan.malformed("'d'/'i'/'n'", other.to_string())),
                }
            }
            Shape::Grid { elem } => {
                let elem = elem.clone();
                let tag = self.scan.read_tag("'a'/'i'/'n'")?;
                match tag {
                    'a' => self.decode_grid_payload(type_id, &elem),
                    'i' => self.decode_backref(type_id),
                    'n' => self.decode_null(),
                    other => Err(self.scan.malformed("'a'/'i'/'n'", other.to_string())),
                }
            }
            Shape::Composite { .. } => {
                let tag = self.scan.read_tag("'p'/'i'/'g'/'m'/'n'")?;
                match tag {
                    'p' => self.decode_composite_payload(type_id, desc.clone()),
                    'i' => self.decode_backref(type_id),
                    'g' => {
                        let token = self.scan.read_raw_token("entity identifier")?;
                        let id: u64 = token
                            .parse()
                            .map_err(|_| self.scan.malformed("entity identifier", token))?;
                        Ok(Decoded::Entity(EntityId(id)))
                    }
                    'm' => {
                        let key = self.scan.read_quoted()?;
                        self.scan.expect(';')?;
                        Ok(Decoded::Definition(key))
                    }
                    'n' => self.decode_null(),
                    other => Err(self.scan.malformed("'p'/'i'/'g'/'m'/'n'", other.to_string())),
                }
            }
        }
    }

    fn decode_null(&mut self) -> Result<Decoded, DecodeError> {
        self.scan.expect(';')?;
        Ok(Decoded::Now(Value::Null))
    }

    fn decode_scalar(&mut self, desc: &TypeDescriptor) -> Result<Decoded, DecodeError> {
        let token = self.scan.read_raw_token("scalar literal")?;
        if token == "n" {
            return Ok(Decoded::Now(Value::Null));
        }
        let value = match &desc.shape {
            Shape::Bool => match token.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(self.scan.malformed("'true' or 'false'", token.clone())),
            },
            Shape::Int => Value::Int(
                token
                    .parse()
                    .map_err(|_| self.scan.malformed("integer literal", token.clone()))?,
            ),
            Shape::Float => Value::Float(
                token
                    .parse()
                    .map_err(|_| self.scan.malformed("float literal", token.clone()))?,
            ),
            Shape::Enum { variants } => {
                if !variants.contains(&token) {
                    let expected = format!("a {} variant", desc.name);
                    return Err(self.scan.malformed(&expected, token));
                }
                Value::Enum(token)
            }
            _ => unreachable!("decode_scalar called for non-scalar shape"),
        };
        Ok(Decoded::Now(value))
    }

    fn decode_text(&mut self) -> Result<Decoded, DecodeError> {
        match self.scan.peek_tag() {
            Some('n') => {
                self.scan.read_tag("'n'")?;
                self.decode_null()
            }
            Some('"') => {
                let text = self.scan.read_quoted()?;
                self.scan.expect(';')?;
                Ok(Decoded::Now(Value::Text(text)))
            }
            Some(other) => Err(self.scan.malformed("'\"' or 'n'", other.to_string())),
            None => Err(self.scan.end_of_input("string payload")),
        }
    }

    fn decode_backref(&mut self, type_id: TypeId) -> Result<Decoded, DecodeError> {
        let token = self.scan.read_raw_token("back-reference id")?;
        let seq: u32 = token
            .parse()
            .map_err(|_| self.scan.malformed("back-reference id", token))?;
        match self.ctx.decoded(type_id, SeqId(seq)) {
            Some(value) => Ok(Decoded::Now(value)),
            None => Err(DecodeError::UnresolvedBackref {
                type_name: self.types.canonical(type_id).to_string(),
                seq,
            }),
        }
    }

    fn read_count(&mut self, what: &str) -> Result<usize, DecodeError> {
        let text = self.scan.read_until(':', what)?;
        text.trim()
            .parse()
            .map_err(|_| self.scan.malformed(what, text.trim().to_string()))
    }

    fn decode_seq_payload(
        &mut self,
        type_id: TypeId,
        elem: &TypeSig,
    ) -> Result<Decoded, DecodeError> {
        let count = self.read_count("collection size")?;
        let seq = SeqRef::new(Vec::with_capacity(count));
        self.ctx.register_decoded(type_id, Value::Seq(seq.clone()));
        for index in 0..count {
            match self.decode_value(elem)? {
                Decoded::Now(v) => seq.borrow_mut().push(v),
                Decoded::Entity(id) => {
                    seq.borrow_mut().push(Value::Null);
                    let seq = seq.clone();
                    self.ctx.defer(Box::new(move |cx| {
                        let found = cx
                            .entities
                            .entity(id)
                            .ok_or(DecodeError::UnresolvedEntity(id))?;
                        seq.borrow_mut()[index] = Value::Object(found);
                        Ok(())
                    }));
                }
                Decoded::Definition(key) => {
                    seq.borrow_mut().push(Value::Null);
                    let seq = seq.clone();
                    self.ctx.defer(Box::new(move |cx| {
                        let found = cx
                            .definitions
                            .definition(&key)
                            .ok_or_else(|| DecodeError::UnresolvedDefinition(key.clone()))?;
                        seq.borrow_mut()[index] = Value::Object(found);
                        Ok(())
                    }));
                }
            }
        }
        self.scan.expect(';')?;
        Ok(Decoded::Now(Value::Seq(seq)))
    }

    fn decode_map_payload(
        &mut self,
        type_id: TypeId,
        key_sig: &TypeSig,
        val_sig: &TypeSig,
    ) -> Result<Decoded, DecodeError> {
        let count = self.read_count("mapping size")?;
        let map = MapRef::new(Vec::with_capacity(count));
        self.ctx.register_decoded(type_id, Value::Map(map.clone()));
        for index in 0..count {
            let key = self.decode_value(key_sig)?;
            let key = self.patchable(key, &map, index, true);
            let val = self.decode_value(val_sig)?;
            let val = self.patchable(val, &map, index, false);
            map.borrow_mut().push((key, val));
        }
        self.scan.expect(';')?;
        Ok(Decoded::Now(Value::Map(map)))
    }

    /// Convert a decode outcome into the value stored in a mapping pair,
    /// deferring a patch of the pair's key or value side for markers.
    fn patchable(&mut self, decoded: Decoded, map: &MapRef, index: usize, is_key: bool) -> Value {
        match decoded {
            Decoded::Now(v) => v,
            Decoded::Entity(id) => {
                let map = map.clone();
                self.ctx.defer(Box::new(move |cx| {
                    let found = cx
                        .entities
                        .entity(id)
                        .ok_or(DecodeError::UnresolvedEntity(id))?;
                    let mut pairs = map.borrow_mut();
                    let slot = if is_key {
                        &mut pairs[index].0
                    } else {
                        &mut pairs[index].1
                    };
                    *slot = Value::Object(found);
                    Ok(())
                }));
                Value::Null
            }
            Decoded::Definition(key) => {
                let map = map.clone();
                self.ctx.defer(Box::new(move |cx| {
                    let found = cx
                        .definitions
                        .definition(&key)
                        .ok_or_else(|| DecodeError::UnresolvedDefinition(key.clone()))?;
                    let mut pairs = map.borrow_mut();
                    let slot = if is_key {
                        &mut pairs[index].0
                    } else {
                        &mut pairs[index].1
                    };
                    *slot = Value::Object(found);
                    Ok(())
                }));
                Value::Null
            }
        }
    }

    fn decode_grid_payload(
        &mut self,
        type_id: TypeId,
        elem: &TypeSig,
    ) -> Result<Decoded, DecodeError> {
        let text = self.scan.read_until(':', "array bounds")?;
        let bounds = self.parse_bounds(text.trim())?;
        let count = bounds.len();
        let grid = GridRef::new(Grid {
            bounds,
            cells: vec![Value::Null; count],
        });
        self.ctx.register_decoded(type_id, Value::Grid(grid.clone()));
        for index in 0..count {
            match self.decode_value(elem)? {
                Decoded::Now(v) => grid.borrow_mut().cells[index] = v,
                Decoded::Entity(id) => {
                    let grid = grid.clone();
                    self.ctx.defer(Box::new(move |cx| {
                        let found = cx
                            .entities
                            .entity(id)
                            .ok_or(DecodeError::UnresolvedEntity(id))?;
                        grid.borrow_mut().cells[index] = Value::Object(found);
                        Ok(())
                    }));
                }
                Decoded::Definition(key) => {
                    let grid = grid.clone();
                    self.ctx.defer(Box::new(move |cx| {
                        let found = cx
                            .definitions
                            .definition(&key)
                            .ok_or_else(|| DecodeError::UnresolvedDefinition(key.clone()))?;
                        grid.borrow_mut().cells[index] = Value::Object(found);
                        Ok(())
                    }));
                }
            }
        }
        self.scan.expect(';')?;
        Ok(Decoded::Now(Value::Grid(grid)))
    }

    fn parse_bounds(&self, text: &str) -> Result<Bounds, DecodeError> {
        let bad = || self.scan.malformed("array bounds", text.to_string());
        let mut dims = Vec::new();
        for dim in text.split(',') {
            let (min, max) = dim.split_once('_').ok_or_else(bad)?;
            let min: i64 = min.trim().parse().map_err(|_| bad())?;
            let max: i64 = max.trim().parse().map_err(|_| bad())?;
            dims.push((min, max));
        }
        match dims.as_slice() {
            [(min, max)] => Ok(Bounds::One {
                min: *min,
                max: *max,
            }),
            [(min0, max0), (min1, max1)] => Ok(Bounds::Two {
                min: [*min0, *min1],
                max: [*max0, *max1],
            }),
            _ => Err(bad()),
        }
    }

    fn decode_composite_payload(
        &mut self,
        type_id: TypeId,
        desc: Arc<TypeDescriptor>,
    ) -> Result<Decoded, DecodeError> {
        let Shape::Composite {
            data_view,
            finalize,
            ..
        } = &desc.shape
        else {
            unreachable!("decode_composite_payload called for non-composite shape");
        };

        // Zero-initialized instance, registered before any member decodes so
        // self- and mutual references can resolve back to it.
        let obj = ObjRef::new(self.types.instantiate(type_id)?);
        self.ctx
            .register_decoded(type_id, Value::Object(obj.clone()));

        let count = self.read_count("property count")?;
        let mut view_pairs = data_view.as_ref().map(|_| Vec::with_capacity(count));
        for _ in 0..count {
            let name = self.scan.read_until(':', "property name")?.trim().to_string();
            let Some(member) = desc.member(&name) else {
                // Old saves may carry members this build no longer has.
                warn!(type_name = %desc.name, member = %name, "skipping unknown member");
                self.skip_value()?;
                continue;
            };
            match self.decode_value(&member.sig)? {
                Decoded::Now(v) => match &mut view_pairs {
                    Some(pairs) => pairs.push((name, v)),
                    None => obj.borrow_mut().set_field(&name, v),
                },
                Decoded::Entity(id) => {
                    if let Some(pairs) = &mut view_pairs {
                        pairs.push((name.clone(), Value::Null));
                    }
                    let obj = obj.clone();
                    self.ctx.defer(Box::new(move |cx| {
                        let found = cx
                            .entities
                            .entity(id)
                            .ok_or(DecodeError::UnresolvedEntity(id))?;
                        obj.borrow_mut().set_field(&name, Value::Object(found));
                        Ok(())
                    }));
                }
                Decoded::Definition(key) => {
                    if let Some(pairs) = &mut view_pairs {
                        pairs.push((name.clone(), Value::Null));
                    }
                    let obj = obj.clone();
                    self.ctx.defer(Box::new(move |cx| {
                        let found = cx
                            .definitions
                            .definition(&key)
                            .ok_or_else(|| DecodeError::UnresolvedDefinition(key.clone()))?;
                        obj.borrow_mut().set_field(&name, Value::Object(found));
                        Ok(())
                    }));
                }
            }
        }
        self.scan.expect(';')?;

        if let (Some(view), Some(pairs)) = (data_view, view_pairs) {
            (view.import)(&mut obj.borrow_mut(), pairs);
        }
        if let Some(f) = finalize {
            f(&mut obj.borrow_mut());
        }
        Ok(Decoded::Now(Value::Object(obj)))
    }

    fn decode_stringified(
        &mut self,
        type_id: TypeId,
        stringifier: &dyn Stringifier,
    ) -> Result<Decoded, DecodeError> {
        let tag = self.scan.read_tag("'s'/'p'/'i'/'n'")?;
        match tag {
            's' => {
                self.scan.expect(':')?;
                let token = self.scan.read_escaped_token("stringified token")?;
                match stringifier.destringify(&token) {
                    Ok(value) => Ok(Decoded::Now(value)),
                    Err(reason) => Err(self.scan.malformed(&reason, token)),
                }
            }
            // Saves written before the stringifier existed carry the full
            // composite payload; keep decoding them.
            'p' => {
                let desc = self.types.descriptor(type_id);
                if !matches!(desc.shape, Shape::Composite { .. }) {
                    return Err(self.scan.malformed("'s'/'i'/'n'", "p"));
                }
                self.decode_composite_payload(type_id, desc)
            }
            'i' => self.decode_backref(type_id),
            'n' => self.decode_null(),
            other => Err(self.scan.malformed("'s'/'p'/'i'/'n'", other.to_string())),
        }
    }

    /// Consume one value without interpreting it. The grammar is
    /// self-delimiting, so no type knowledge is needed: counts and
    /// terminators drive the walk.
    fn skip_value(&mut self) -> Result<(), DecodeError> {
        self.scan.read_until(':', "type signature")?;
        match self.scan.peek_tag() {
            None => Err(self.scan.end_of_input("payload")),
            Some('"') => {
                self.scan.read_quoted()?;
                self.scan.expect(';')
            }
            Some('m') => {
                self.scan.read_tag("'m'")?;
                if self.scan.peek_tag() == Some('"') {
                    self.scan.read_quoted()?;
                    self.scan.expect(';')
                } else {
                    // Not a definition marker after all: a raw token that
                    // happens to start with 'm'.
                    self.scan.read_until(';', "';'")?;
                    Ok(())
                }
            }
            Some('s') => {
                self.scan.read_tag("'s'")?;
                if self.scan.peek_tag() == Some(':') {
                    self.scan.expect(':')?;
                    self.scan.read_escaped_token("stringified token")?;
                    Ok(())
                } else {
                    self.scan.read_until(';', "';'")?;
                    Ok(())
                }
            }
            Some(tag @ ('a' | 'c' | 'd' | 'p')) => {
                self.scan.read_tag("header")?;
                let (header, delim) = self.scan.read_until_either(':', ';', "payload header")?;
                if delim == ';' {
                    // A raw token that started with a header letter.
                    return Ok(());
                }
                let count = match tag {
                    'a' => self.parse_bounds(header.trim())?.len(),
                    'd' => {
                        2 * header.trim().parse::<usize>().map_err(|_| {
                            self.scan.malformed("mapping size", header.trim().to_string())
                        })?
                    }
                    'p' => {
                        let count: usize = header.trim().parse().map_err(|_| {
                            self.scan.malformed("property count", header.trim().to_string())
                        })?;
                        for _ in 0..count {
                            self.scan.read_until(':', "property name")?;
                            self.skip_value()?;
                        }
                        self.scan.expect(';')?;
                        return Ok(());
                    }
                    _ => header.trim().parse::<usize>().map_err(|_| {
                        self.scan.malformed("collection size", header.trim().to_string())
                    })?,
                };
                for _ in 0..count {
                    self.skip_value()?;
                }
                self.scan.expect(';')
            }
            // Null, back-references, entity markers and every raw scalar
            // token all end at the next unescaped ';'.
            Some(_) => {
                self.scan.read_until(';', "';'")?;
                Ok(())
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DefinitionLookup, EntityLookup};
    use crate::descriptor::{MemberDescriptor, TypeDescriptor};
    use crate::encode::Encoder;
    use crate::value::Instance;
    use std::collections::HashMap;

    struct Entities(HashMap<u64, ObjRef>);
    struct Definitions(HashMap<String, ObjRef>);

    impl EntityLookup for Entities {
        fn entity(&self, id: EntityId) -> Option<ObjRef> {
            self.0.get(&id.0).cloned()
        }
    }

    impl DefinitionLookup for Definitions {
        fn definition(&self, key: &str) -> Option<ObjRef> {
            self.0.get(key).cloned()
        }
    }

    fn no_entities() -> Entities {
        Entities(HashMap::new())
    }

    fn no_definitions() -> Definitions {
        Definitions(HashMap::new())
    }

    fn officer_registry() -> TypeRegistry {
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
        types
    }

    fn decode(types: &TypeRegistry, text: &str, declared: &TypeSig) -> Value {
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let (root, pending) = Decoder::run(types, &strs, &mut ctx, text, declared).unwrap();
        pending.resolve(&no_entities(), &no_definitions()).unwrap();
        match root {
            Decoded::Now(v) => v,
            _ => panic!("root was a reference marker"),
        }
    }

    fn round_trip(types: &TypeRegistry, value: &Value, declared: &TypeSig) -> Value {
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let text = Encoder::run(types, &strs, &mut ctx, value, declared).unwrap();
        decode(types, &text, declared)
    }

    #[test]
    fn scalar_decodes_without_signature() {
        let types = TypeRegistry::new();
        assert_eq!(decode(&types, ":42;", &TypeSig::named("Int")), Value::Int(42));
    }

    #[test]
    fn explicit_signature_overrides_declared() {
        let types = officer_registry();
        let value = decode(&types, "Int:7;", &TypeSig::named("Int"));
        assert_eq!(value, Value::Int(7));
    }

    #[test]
    fn null_and_string_payloads() {
        let types = TypeRegistry::new();
        assert_eq!(decode(&types, "Text:n;", &TypeSig::named("Text")), Value::Null);
        assert_eq!(
            decode(&types, r#":"a\;b";"#, &TypeSig::named("Text")),
            Value::text("a;b")
        );
    }

    #[test]
    fn composite_round_trips() {
        let types = officer_registry();
        let officer = types.resolve(&TypeSig::named("Officer")).unwrap();
        let mut instance = types.instantiate(officer).unwrap();
        instance.set_field("Name", Value::text("Reyes"));
        instance.set_field("Rank", Value::Int(3));
        let original = Value::object(instance);
        let decoded = round_trip(&types, &original, &TypeSig::named("Officer"));
        // The unwritten Partner member comes back as its default.
        let Value::Object(obj) = &decoded else { panic!() };
        assert_eq!(obj.borrow().field("Partner"), Some(&Value::Null));
        assert_eq!(decoded, original);
    }

    #[test]
    fn mutual_cycle_round_trips_to_one_pair() {
        let types = officer_registry();
        let officer = types.resolve(&TypeSig::named("Officer")).unwrap();
        let a = ObjRef::new(Instance::new(officer));
        let b = ObjRef::new(Instance::new(officer));
        a.borrow_mut().set_field("Name", Value::text("George"));
        a.borrow_mut().set_field("Partner", Value::Object(b.clone()));
        b.borrow_mut().set_field("Name", Value::text("Brad"));
        b.borrow_mut().set_field("Partner", Value::Object(a.clone()));

        let decoded = round_trip(&types, &Value::Object(a), &TypeSig::named("Officer"));
        let Value::Object(a2) = decoded else { panic!() };
        let Some(Value::Object(b2)) = a2.borrow().field("Partner").cloned() else {
            panic!("partner missing");
        };
        let Some(Value::Object(a3)) = b2.borrow().field("Partner").cloned() else {
            panic!("partner's partner missing");
        };
        assert!(a2.ptr_eq(&a3), "cycle must close on the same instance");
        assert_eq!(a2.borrow().field("Name"), Some(&Value::text("George")));
        assert_eq!(b2.borrow().field("Name"), Some(&Value::text("Brad")));
    }

    #[test]
    fn entity_marker_defers_until_resolution() {
        let types = officer_registry();
        types
            .register(TypeDescriptor::composite(
                TypeSig::named("Bridge"),
                vec![MemberDescriptor::entity("Captain", TypeSig::named("Officer"))],
            ))
            .unwrap();

        let text = "Bridge:p1:\n\tCaptain:\n\t\t:g7;\n;";
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let (root, pending) =
            Decoder::run(&types, &strs, &mut ctx, text, &TypeSig::named("Bridge")).unwrap();
        let Decoded::Now(Value::Object(bridge)) = root else {
            panic!()
        };
        // Placeholder until the queue drains.
        assert_eq!(bridge.borrow().field("Captain"), Some(&Value::Null));
        assert_eq!(pending.len(), 1);

        let officer = types.resolve(&TypeSig::named("Officer")).unwrap();
        let live = ObjRef::new(Instance::new(officer));
        let mut entities = HashMap::new();
        entities.insert(7, live.clone());
        pending
            .resolve(&Entities(entities), &no_definitions())
            .unwrap();

        let Some(Value::Object(captain)) = bridge.borrow().field("Captain").cloned() else {
            panic!("captain not patched");
        };
        assert!(captain.ptr_eq(&live));
    }

    #[test]
    fn missing_entity_fails_the_drain() {
        let types = officer_registry();
        types
            .register(TypeDescriptor::composite(
                TypeSig::named("Bridge"),
                vec![MemberDescriptor::entity("Captain", TypeSig::named("Officer"))],
            ))
            .unwrap();
        let text = "Bridge:p1:\n\tCaptain:\n\t\t:g9;\n;";
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let (_, pending) =
            Decoder::run(&types, &strs, &mut ctx, text, &TypeSig::named("Bridge")).unwrap();
        let result = pending.resolve(&no_entities(), &no_definitions());
        assert!(matches!(
            result,
            Err(DecodeError::UnresolvedEntity(EntityId(9)))
        ));
    }

    #[test]
    fn unknown_member_is_skipped() {
        let types = officer_registry();
        // "Callsign" was dropped from Officer; old saves still carry it.
        let text = ":p2:\n\tCallsign:\n\t\t:\"Maverick\";\n\tName:\n\t\t:\"Reyes\";\n;";
        let value = decode(&types, text, &TypeSig::named("Officer"));
        let Value::Object(obj) = value else { panic!() };
        assert_eq!(obj.borrow().field("Name"), Some(&Value::text("Reyes")));
        assert!(obj.borrow().field("Callsign").is_none());
    }

    #[test]
    fn skipper_handles_structured_members() {
        let types = officer_registry();
        // The unknown member is itself a composite with a nested collection.
        let text = concat!(
            ":p2:\n",
            "\tHistory:\n",
            "\t\tOfficer:p2:\n",
            "\t\t\tName:\n\t\t\t\t:\"old\";\n",
            "\t\t\tMedals:\n\t\t\t\t:c2:\n\t\t\t\t\t:1;\n\t\t\t\t\t:2;\n\t\t\t\t;\n",
            "\t\t;\n",
            "\tName:\n\t\t:\"Reyes\";\n",
            ";"
        );
        let value = decode(&types, text, &TypeSig::named("Officer"));
        let Value::Object(obj) = value else { panic!() };
        assert_eq!(obj.borrow().field("Name"), Some(&Value::text("Reyes")));
    }

    #[test]
    fn legacy_signature_resolves_in_stream() {
        let types = officer_registry();
        let text = "Ecliptic.Core.Officer!v2:p1:\n\tName:\n\t\t:\"Vega\";\n;";
        let value = decode(&types, text, &TypeSig::named("Officer"));
        let Value::Object(obj) = value else { panic!() };
        assert_eq!(obj.borrow().field("Name"), Some(&Value::text("Vega")));
    }

    #[test]
    fn malformed_tag_reports_position() {
        let types = officer_registry();
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let err = Decoder::run(&types, &strs, &mut ctx, ":x5;", &TypeSig::named("Officer"))
            .unwrap_err();
        match err {
            DecodeError::MalformedToken {
                expected, found, ..
            } => {
                assert_eq!(expected, "'p'/'i'/'g'/'m'/'n'");
                assert_eq!(found, "x");
            }
            other => panic!("expected MalformedToken, got {other:?}"),
        }
    }

    #[test]
    fn dangling_backref_fails() {
        let types = officer_registry();
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let err = Decoder::run(&types, &strs, &mut ctx, ":i3;", &TypeSig::named("Officer"))
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnresolvedBackref { seq: 3, .. }
        ));
    }

    #[test]
    fn truncated_stream_fails_fast() {
        let types = officer_registry();
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let err = Decoder::run(
            &types,
            &strs,
            &mut ctx,
            ":p1:\n\tName:\n\t\t:\"Re",
            &TypeSig::named("Officer"),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEnd { .. }));
    }

    #[test]
    fn wrong_runtime_type_is_a_mismatch() {
        let types = officer_registry();
        let strs = StringifierRegistry::new();
        let mut ctx = GraphContext::new();
        let err = Decoder::run(
            &types,
            &strs,
            &mut ctx,
            "Officer:p0:\n;",
            &TypeSig::named("Int"),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { .. }));
    }

    #[test]
    fn offset_bounds_grid_round_trips() {
        // Old saves can carry arrays with a nonzero lower bound.
        let types = TypeRegistry::new();
        let declared = TypeSig::grid_of(TypeSig::named("Int"));
        let original = Value::grid(
            Bounds::One { min: 1, max: 3 },
            vec![Value::Int(10), Value::Int(20), Value::Int(30)],
        );
        assert_eq!(round_trip(&types, &original, &declared), original);
    }

    #[test]
    fn two_dimensional_grid_round_trips() {
        let types = TypeRegistry::new();
        let declared = TypeSig::grid_of(TypeSig::named("Int"));
        let original = Value::grid(
            Bounds::Two {
                min: [0, 0],
                max: [1, 2],
            },
            (0..6).map(Value::Int).collect(),
        );
        assert_eq!(round_trip(&types, &original, &declared), original);
    }
}
