//! Grid primitives consumed by the renderer.
//!
//! A [`Transformer`] owns the actual cell storage. It exposes the template as a snapshot
//! (reads never observe the renderer's own writes) and accepts writes, clears and merges at
//! absolute coordinates.

mod memory;

pub use memory::{MemoryGrid, WriteRecord};

use crate::error::Result;
use crate::grid::{AreaRef, CellRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Formula text without the leading `=`; copied verbatim.
    Formula(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Typed conversion of an evaluated expression result.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// A note attached to a template cell; the markup builder reads commands from these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellComment {
    pub cell: CellRef,
    pub text: String,
}

pub trait Transformer {
    /// Template content at `cell`, unaffected by anything written during rendering.
    fn template_cell(&self, cell: &CellRef) -> Option<CellValue>;

    fn write_cell(&mut self, target: &CellRef, value: CellValue) -> Result<()>;

    fn clear_cell(&mut self, cell: &CellRef) -> Result<()>;

    fn merge_cells(&mut self, region: &AreaRef) -> Result<()>;

    fn comments(&self) -> Vec<CellComment>;
}
