//! The registered game schema.
//!
//! Every type a save can contain is declared here once, at startup, with
//! its members, reference kinds and priorities. Registration is idempotent,
//! so calling [`register_schema`] from several entry points is harmless.

use ecliptic_save::catalog::{RegistryError, TypeRegistry};
use ecliptic_save::descriptor::{DataView, MemberDescriptor, TypeDescriptor};
use ecliptic_save::id::TypeId;
use ecliptic_save::sig::TypeSig;
use ecliptic_save::stringify::{ColorStringifier, StringifierRegistry};
use ecliptic_save::value::{Instance, Value};

/// Type ids of the registered schema, for building instances in game code.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub color: TypeId,
    pub standing: TypeId,
    pub formula_int: TypeId,
    pub entity: TypeId,
    pub hull: TypeId,
    pub design: TypeId,
    pub ship: TypeId,
    pub fleet: TypeId,
    pub empire: TypeId,
    pub waypoint: TypeId,
    pub game_state: TypeId,
}

fn text() -> TypeSig {
    TypeSig::named("Text")
}

fn int() -> TypeSig {
    TypeSig::named("Int")
}

/// Register the full game schema. Base types go first so derived types and
/// members can name them.
pub fn register_schema(types: &TypeRegistry) -> Result<Schema, RegistryError> {
    let color = types.register(TypeDescriptor::composite(
        TypeSig::named("Color"),
        vec![
            MemberDescriptor::plain("A", int()),
            MemberDescriptor::plain("R", int()),
            MemberDescriptor::plain("G", int()),
            MemberDescriptor::plain("B", int()),
        ],
    ))?;

    let standing = types.register(TypeDescriptor::enumeration(
        TypeSig::named("Standing"),
        &["Neutral", "Allied", "Hostile"],
    ))?;

    let formula_int = types.register(TypeDescriptor::composite(
        TypeSig::generic("Formula", vec![int()]),
        vec![
            MemberDescriptor::plain("Expression", text()),
            MemberDescriptor::plain("Value", int()),
        ],
    ))?;

    // Abstract root of everything the entity repository owns.
    let entity = types.register(TypeDescriptor::composite(TypeSig::named("Entity"), vec![]))?;

    let hull = types.register(TypeDescriptor::composite(
        TypeSig::named("Hull"),
        vec![
            MemberDescriptor::plain("Name", text()),
            MemberDescriptor::plain("Mass", int()),
        ],
    ))?;

    let design = types.register(
        TypeDescriptor::composite(
            TypeSig::named("Design"),
            vec![
                MemberDescriptor::plain("Name", text()),
                MemberDescriptor::definition("Hull", TypeSig::named("Hull")),
                MemberDescriptor::plain("Cost", TypeSig::mapping_of(text(), int())),
                // Derived: rebuilt from Cost after decode.
                MemberDescriptor::plain("CostTotal", int()).never(),
            ],
        )
        .with_finalizer(refresh_design_cost),
    )?;

    let ship = types.register(
        TypeDescriptor::composite(
            TypeSig::named("Ship"),
            vec![
                MemberDescriptor::plain("Name", text()),
                MemberDescriptor::definition("Design", TypeSig::named("Design")),
                MemberDescriptor::entity("Escort", TypeSig::named("Ship")),
            ],
        )
        .with_base(TypeSig::named("Entity")),
    )?;

    let fleet = types.register(
        TypeDescriptor::composite(
            TypeSig::named("Fleet"),
            vec![
                MemberDescriptor::plain("Name", text()),
                MemberDescriptor::entity("Flagship", TypeSig::named("Ship")),
                MemberDescriptor::entity_list("Ships", TypeSig::named("Ship")),
            ],
        )
        .with_base(TypeSig::named("Entity")),
    )?;

    let empire = types.register(
        TypeDescriptor::composite(
            TypeSig::named("Empire"),
            vec![
                MemberDescriptor::plain("Name", text()),
                MemberDescriptor::plain("Flag", TypeSig::named("Color")),
                MemberDescriptor::plain("Standing", TypeSig::named("Standing")),
                MemberDescriptor::plain("Storage", TypeSig::mapping_of(text(), int())),
                MemberDescriptor::entity_list("Allies", TypeSig::named("Empire")),
            ],
        )
        .with_base(TypeSig::named("Entity")),
    )?;

    let waypoint = types.register(
        TypeDescriptor::composite(
            TypeSig::named("Waypoint"),
            vec![
                MemberDescriptor::plain("X", int()),
                MemberDescriptor::plain("Y", int()),
            ],
        )
        .with_data_view(DataView {
            export: waypoint_export,
            import: waypoint_import,
        }),
    )?;

    // The save root. The player reference is written before the entity dump
    // on purpose: resolving it requires the deferred second pass.
    let game_state = types.register(TypeDescriptor::composite(
        TypeSig::named("GameState"),
        vec![
            MemberDescriptor::plain("Turn", int()).with_priority(0),
            MemberDescriptor::entity("Player", TypeSig::named("Empire")).with_priority(1),
            MemberDescriptor::plain(
                "Entities",
                TypeSig::mapping_of(int(), TypeSig::named("Entity")),
            )
            .with_priority(2),
        ],
    ))?;

    Ok(Schema {
        color,
        standing,
        formula_int,
        entity,
        hull,
        design,
        ship,
        fleet,
        empire,
        waypoint,
        game_state,
    })
}

/// The stringifiers the game registers alongside the schema.
pub fn register_stringifiers(types: &TypeRegistry, schema: &Schema) -> StringifierRegistry {
    let mut stringifiers = StringifierRegistry::new();
    stringifiers.register(Box::new(ColorStringifier::new(types, schema.color)));
    stringifiers
}

/// Recompute a design's derived total from its cost mapping.
pub fn refresh_design_cost(instance: &mut Instance) {
    let total = match instance.field("Cost") {
        Some(Value::Map(map)) => map
            .borrow()
            .iter()
            .filter_map(|(_, v)| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .sum(),
        _ => 0,
    };
    instance.set_field("CostTotal", Value::Int(total));
}

// Waypoints control their own wire view: both coordinates, always, in a
// fixed order.
fn waypoint_export(instance: &Instance) -> Vec<(String, Value)> {
    ["X", "Y"]
        .into_iter()
        .map(|name| {
            (
                name.to_string(),
                instance.field(name).cloned().unwrap_or(Value::Int(0)),
            )
        })
        .collect()
}

fn waypoint_import(instance: &mut Instance, pairs: Vec<(String, Value)>) {
    for (name, value) in pairs {
        instance.set_field(&name, value);
    }
}
