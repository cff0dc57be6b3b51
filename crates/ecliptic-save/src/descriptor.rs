//! Serialization descriptors: the statically-declared member metadata that
//! replaces runtime reflection.
//!
//! Each registered type carries a [`Shape`] decided once at registration.
//! Composite shapes list their members in declaration order; every member
//! records its declared signature, how references through it are written
//! ([`RefKind`]), when it is emitted ([`EmitPolicy`]) and its priority.

use crate::sig::TypeSig;
use crate::value::{Instance, Value};

/// Members with no explicit priority sort after every prioritized member.
pub const DEFAULT_PRIORITY: u32 = u32::MAX;

/// How a member's value is written and resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Full payload, recursively encoded.
    Plain,
    /// A single live entity, written as a `g` marker carrying its repository id.
    Entity,
    /// A single definition object, written as an `m` marker carrying its key.
    Definition,
    /// A sequence whose elements are written as `g` markers.
    EntityList,
    /// A sequence whose elements are written as `m` markers.
    DefinitionList,
    /// A mapping whose keys are written as `g` markers.
    EntityKeyedMap,
    /// A mapping whose keys are written as `m` markers.
    DefinitionKeyedMap,
}

/// When a member is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitPolicy {
    /// Emit only when the current value differs from the member's default.
    SkipDefault,
    /// Always emit, even when the value is the default.
    Always,
    /// Never emit (derived/computed members).
    Never,
}

/// One named, typed member of a composite type.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub name: String,
    pub sig: TypeSig,
    pub kind: RefKind,
    pub policy: EmitPolicy,
    pub priority: u32,
}

impl MemberDescriptor {
    fn new(name: &str, sig: TypeSig, kind: RefKind) -> Self {
        Self {
            name: name.to_string(),
            sig,
            kind,
            policy: EmitPolicy::SkipDefault,
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn plain(name: &str, sig: TypeSig) -> Self {
        Self::new(name, sig, RefKind::Plain)
    }

    pub fn entity(name: &str, sig: TypeSig) -> Self {
        Self::new(name, sig, RefKind::Entity)
    }

    pub fn definition(name: &str, sig: TypeSig) -> Self {
        Self::new(name, sig, RefKind::Definition)
    }

    pub fn entity_list(name: &str, elem: TypeSig) -> Self {
        Self::new(name, TypeSig::seq_of(elem), RefKind::EntityList)
    }

    pub fn definition_list(name: &str, elem: TypeSig) -> Self {
        Self::new(name, TypeSig::seq_of(elem), RefKind::DefinitionList)
    }

    pub fn entity_keyed(name: &str, key: TypeSig, value: TypeSig) -> Self {
        Self::new(name, TypeSig::mapping_of(key, value), RefKind::EntityKeyedMap)
    }

    pub fn definition_keyed(name: &str, key: TypeSig, value: TypeSig) -> Self {
        Self::new(
            name,
            TypeSig::mapping_of(key, value),
            RefKind::DefinitionKeyedMap,
        )
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn always(mut self) -> Self {
        self.policy = EmitPolicy::Always;
        self
    }

    pub fn never(mut self) -> Self {
        self.policy = EmitPolicy::Never;
        self
    }
}

/// Explicit named-value export for types that control their own wire view.
///
/// `export` produces the ordered (name, value) list the encoder writes in
/// place of the member walk; `import` consumes the decoded list and populates
/// the instance. Exported names must exist in the member list so reference
/// kinds still apply.
#[derive(Debug, Clone, Copy)]
pub struct DataView {
    pub export: fn(&Instance) -> Vec<(String, Value)>,
    pub import: fn(&mut Instance, Vec<(String, Value)>),
}

/// Fix-up run on an instance immediately after its members decode, before
/// deferred references resolve. Used to rebuild derived members.
pub type FinalizeFn = fn(&mut Instance);

/// The runtime shape of a registered type, decided once at registration.
#[derive(Debug, Clone)]
pub enum Shape {
    Bool,
    Int,
    Float,
    Text,
    Enum {
        variants: Vec<String>,
    },
    Sequence {
        elem: TypeSig,
    },
    Mapping {
        key: TypeSig,
        value: TypeSig,
    },
    Grid {
        elem: TypeSig,
    },
    Composite {
        members: Vec<MemberDescriptor>,
        data_view: Option<DataView>,
        finalize: Option<FinalizeFn>,
    },
}

/// A registered type: canonical signature, shape, and optional base type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: TypeSig,
    pub shape: Shape,
    pub base: Option<TypeSig>,
}

impl TypeDescriptor {
    pub fn composite(name: TypeSig, members: Vec<MemberDescriptor>) -> Self {
        Self {
            name,
            shape: Shape::Composite {
                members,
                data_view: None,
                finalize: None,
            },
            base: None,
        }
    }

    pub fn enumeration(name: TypeSig, variants: &[&str]) -> Self {
        Self {
            name,
            shape: Shape::Enum {
                variants: variants.iter().map(|v| v.to_string()).collect(),
            },
            base: None,
        }
    }

    pub fn with_base(mut self, base: TypeSig) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_data_view(mut self, view: DataView) -> Self {
        if let Shape::Composite { data_view, .. } = &mut self.shape {
            *data_view = Some(view);
        }
        self
    }

    pub fn with_finalizer(mut self, f: FinalizeFn) -> Self {
        if let Shape::Composite { finalize, .. } = &mut self.shape {
            *finalize = Some(f);
        }
        self
    }

    /// Composite members, or an empty slice for every other shape.
    pub fn members(&self) -> &[MemberDescriptor] {
        match &self.shape {
            Shape::Composite { members, .. } => members,
            _ => &[],
        }
    }

    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members().iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::TypeSig;

    #[test]
    fn member_builders_set_kind_and_signature() {
        let m = MemberDescriptor::entity_list("Ships", TypeSig::named("Ship"));
        assert_eq!(m.kind, RefKind::EntityList);
        assert_eq!(m.sig.to_string(), "Seq<Ship>");
        assert_eq!(m.policy, EmitPolicy::SkipDefault);
        assert_eq!(m.priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn policy_and_priority_modifiers() {
        let m = MemberDescriptor::plain("Name", TypeSig::named("Text"))
            .always()
            .with_priority(1);
        assert_eq!(m.policy, EmitPolicy::Always);
        assert_eq!(m.priority, 1);

        let n = MemberDescriptor::plain("Cache", TypeSig::named("Int")).never();
        assert_eq!(n.policy, EmitPolicy::Never);
    }

    #[test]
    fn composite_member_lookup() {
        let desc = TypeDescriptor::composite(
            TypeSig::named("Ship"),
            vec![
                MemberDescriptor::plain("Name", TypeSig::named("Text")),
                MemberDescriptor::entity("Escort", TypeSig::named("Ship")),
            ],
        );
        assert_eq!(desc.members().len(), 2);
        assert_eq!(desc.member("Escort").unwrap().kind, RefKind::Entity);
        assert!(desc.member("Hull").is_none());
    }

    #[test]
    fn non_composite_shapes_expose_no_members() {
        let desc = TypeDescriptor::enumeration(TypeSig::named("Standing"), &["Neutral", "Allied"]);
        assert!(desc.members().is_empty());
        assert!(desc.member("anything").is_none());
    }
}
