//! Data-driven definition loading from JSON.
//!
//! Rulesets define their hulls and designs in data files; this module
//! deserializes them into live definition instances and registers them in a
//! [`DefinitionLibraryBuilder`]. Designs reference hulls by key, so hulls
//! load first and unknown references fail instead of dangling.

use std::collections::BTreeMap;

use ecliptic_save::catalog::TypeRegistry;
use ecliptic_save::error::DecodeError;
use ecliptic_save::value::{ObjRef, Value};

use crate::library::{DefinitionLibraryBuilder, LibraryError};
use crate::schema::{Schema, refresh_design_cost};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while loading definition data.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("library error: {0}")]
    Library(#[from] LibraryError),
    #[error("schema error: {0}")]
    Schema(#[from] DecodeError),
    #[error("design '{design}' references unknown hull '{hull}'")]
    UnknownHullRef { design: String, hull: String },
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

/// Top-level definition file structure.
#[derive(Debug, serde::Deserialize)]
pub struct DefinitionData {
    #[serde(default)]
    pub hulls: Vec<HullData>,
    #[serde(default)]
    pub designs: Vec<DesignData>,
}

/// JSON representation of a hull definition.
#[derive(Debug, serde::Deserialize)]
pub struct HullData {
    pub key: String,
    pub name: String,
    pub mass: i64,
}

/// JSON representation of a ship design.
#[derive(Debug, serde::Deserialize)]
pub struct DesignData {
    pub key: String,
    pub name: String,
    pub hull: String, // references a hull by key
    #[serde(default)]
    pub cost: BTreeMap<String, i64>,
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load definitions from a JSON string into a library builder.
pub fn load_definitions_json(
    json: &str,
    types: &TypeRegistry,
    schema: &Schema,
) -> Result<DefinitionLibraryBuilder, DataLoadError> {
    let data: DefinitionData = serde_json::from_str(json)?;
    build_definitions(data, types, schema)
}

fn build_definitions(
    data: DefinitionData,
    types: &TypeRegistry,
    schema: &Schema,
) -> Result<DefinitionLibraryBuilder, DataLoadError> {
    tracing::debug!(
        hulls = data.hulls.len(),
        designs = data.designs.len(),
        "loading definition data"
    );
    let mut builder = DefinitionLibraryBuilder::new();

    for hull in &data.hulls {
        let mut instance = types.instantiate(schema.hull)?;
        instance.set_field("Name", Value::text(hull.name.clone()));
        instance.set_field("Mass", Value::Int(hull.mass));
        builder.register(&hull.key, &ObjRef::new(instance))?;
    }

    for design in &data.designs {
        let hull = builder
            .get(&design.hull)
            .ok_or_else(|| DataLoadError::UnknownHullRef {
                design: design.key.clone(),
                hull: design.hull.clone(),
            })?;
        let mut instance = types.instantiate(schema.design)?;
        instance.set_field("Name", Value::text(design.name.clone()));
        instance.set_field("Hull", Value::Object(hull));
        instance.set_field(
            "Cost",
            Value::map(
                design
                    .cost
                    .iter()
                    .map(|(k, v)| (Value::text(k.clone()), Value::Int(*v)))
                    .collect(),
            ),
        );
        refresh_design_cost(&mut instance);
        builder.register(&design.key, &ObjRef::new(instance))?;
    }

    Ok(builder)
}

// ===========================================================================
// Tests
// ===========================================================================
