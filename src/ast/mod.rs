//! The AST shape: statement atoms and expression nodes.
//!
//! The wire form is plain JSON; both node families derive
//! `Serialize`/`Deserialize` so a program round-trips losslessly through
//! `serde_json::Value` without a bespoke parser — the transpiler that
//! produces this AST is an external collaborator, out of scope here.

pub mod expr;

pub use expr::{BinaryOp, ExprNode, LogicalOp, ObjectProp, UnaryOp};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A single statement-level operation, addressed by opcode.
///
/// `op`, `result`, and `resultConst` are pulled out as named fields (the
/// executor contract strips `op`/`result` before validating the rest);
/// every other field is atom-specific and lives in `fields` as raw JSON,
/// decoded on demand by each atom's handler. This mirrors how the spec
/// describes the shape — "a mapping with a mandatory `op` string... and
/// atom-specific fields" — without forcing one Rust struct per opcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    pub op: String,
    #[serde(default, rename = "result")]
    pub result: Option<String>,
    #[serde(default, rename = "resultConst")]
    pub result_const: bool,
    #[serde(flatten)]
    pub fields: IndexMap<String, Json>,
}

impl Atom {
    pub fn field(&self, name: &str) -> Option<&Json> {
        self.fields.get(name)
    }

    pub fn require_field(&self, name: &str) -> Result<&Json, crate::value::ErrorValue> {
        self.fields
            .get(name)
            .ok_or_else(|| crate::error::kind::validation(&self.op, format!("missing field '{name}'")))
    }

    /// Decodes an atom-specific field (e.g. `steps`, `condition`) into a
    /// strongly typed Rust value via serde.
    pub fn decode_field<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, crate::value::ErrorValue> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(json) => serde_json::from_value(json.clone())
                .map(Some)
                .map_err(|e| crate::error::kind::validation(&self.op, format!("field '{name}': {e}"))),
        }
    }

    pub fn decode_required<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<T, crate::value::ErrorValue> {
        self.decode_field(name)?
            .ok_or_else(|| crate::error::kind::validation(&self.op, format!("missing field '{name}'")))
    }

    /// Checks whether `op` is `seq` (required of a program root).
    pub fn is_seq(&self) -> bool {
        self.op == "seq"
    }
}

/// A reference to a program input, as carried in AST fields:
/// `{ "$kind": "arg", "path": "name" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgRef {
    #[serde(rename = "$kind")]
    pub kind: String,
    pub path: String,
}

/// A schema descriptor used by `return`/`varsImport`/`varsExport`: opaque
/// except for its declared property names.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaDescriptor {
    #[serde(default)]
    pub properties: IndexMap<String, Json>,
}

impl SchemaDescriptor {
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(|s| s.as_str())
    }
}
