//! Legacy signature normalization.
//!
//! Older save formats wrote module-qualified type names, revision suffixes,
//! and since-renamed generic wrappers. Normalization is an ordered, closed,
//! versioned list of plain text substitutions -- no pattern matching -- so
//! each rule is reproducible and testable on its own. The registry applies
//! the whole list once and retries resolution a single time.

/// One substitution: every occurrence of `needle` becomes `with`.
#[derive(Debug, Clone, Copy)]
pub struct AliasRule {
    pub needle: &'static str,
    pub with: &'static str,
}

/// Revision 1 of the alias set. Append-only: extend this list whenever a
/// type is renamed or moved, never reorder or edit existing entries.
pub const ALIAS_RULES_V1: &[AliasRule] = &[
    // Saves written before the module split qualified every name.
    AliasRule { needle: "Ecliptic.Core.", with: "" },
    AliasRule { needle: "Ecliptic.Mod.", with: "" },
    // Generic wrappers renamed in format revision 2.
    AliasRule { needle: "Collection<", with: "Seq<" },
    AliasRule { needle: "Lookup<", with: "Mapping<" },
    // Early builds stamped names with a format revision suffix.
    AliasRule { needle: "!v1", with: "" },
    AliasRule { needle: "!v2", with: "" },
    AliasRule { needle: "!v3", with: "" },
];

/// Apply every rule of the current alias set, in order, to a signature
/// string. Substitution is global, so qualified names nested inside generic
/// arguments are rewritten too.
pub fn normalize(signature: &str) -> String {
    let mut out = signature.to_string();
    for rule in ALIAS_RULES_V1 {
        if out.contains(rule.needle) {
            out = out.replace(rule.needle, rule.with);
        }
    }
    out
}

// ===========================================================================
// Tests
// ===========================================================================
