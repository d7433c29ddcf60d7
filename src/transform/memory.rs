use super::{CellComment, CellValue, Transformer};
use crate::error::{Result, TemplateError};
use crate::grid::{AreaRef, CellRef};
use std::collections::{BTreeMap, BTreeSet};

/// One `write_cell` call, in the order the renderer issued it.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub cell: CellRef,
    pub value: CellValue,
}

/// In-memory grid. The template snapshot is frozen at construction; output starts as a copy
/// of it and receives every write, clear and merge.
#[derive(Debug, Clone, Default)]
pub struct MemoryGrid {
    template: BTreeMap<CellRef, CellValue>,
    output: BTreeMap<CellRef, CellValue>,
    comments: Vec<CellComment>,
    merged: Vec<AreaRef>,
    writes: Vec<WriteRecord>,
    sheets: BTreeSet<String>,
}

impl MemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a template from `(A1 reference, value)` pairs on `sheet`.
    pub fn from_cells<'a, I, V>(sheet: &str, cells: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<CellValue>,
    {
        let mut grid = Self::new();
        grid.sheets.insert(sheet.to_string());
        for (reference, value) in cells {
            let cell = CellRef::parse(reference, sheet)?;
            grid.set_template_cell(cell, value.into());
        }
        Ok(grid)
    }

    pub fn set_template_cell(&mut self, cell: CellRef, value: CellValue) {
        self.sheets.insert(cell.sheet.clone());
        self.output.insert(cell.clone(), value.clone());
        self.template.insert(cell, value);
    }

    pub fn add_sheet(&mut self, sheet: impl Into<String>) {
        self.sheets.insert(sheet.into());
    }

    pub fn add_comment(&mut self, reference: &str, default_sheet: &str, text: impl Into<String>) -> Result<()> {
        let cell = CellRef::parse(reference, default_sheet)?;
        self.sheets.insert(cell.sheet.clone());
        self.comments.push(CellComment {
            cell,
            text: text.into(),
        });
        Ok(())
    }

    pub fn cell(&self, cell: &CellRef) -> Option<&CellValue> {
        self.output.get(cell).filter(|value| !value.is_empty())
    }

    /// Convenience lookup by A1 reference; unparsable references read as empty.
    pub fn value_at(&self, reference: &str, default_sheet: &str) -> Option<&CellValue> {
        let cell = CellRef::parse(reference, default_sheet).ok()?;
        self.cell(&cell)
    }

    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    pub fn merged_regions(&self) -> &[AreaRef] {
        &self.merged
    }

    /// Non-empty output cells in row-major order.
    pub fn non_empty_cells(&self) -> impl Iterator<Item = (&CellRef, &CellValue)> {
        self.output.iter().filter(|(_, value)| !value.is_empty())
    }

    pub fn clear_write_log(&mut self) {
        self.writes.clear();
    }

    fn ensure_sheet(&self, sheet: &str) -> Result<()> {
        if self.sheets.is_empty() || self.sheets.contains(sheet) {
            Ok(())
        } else {
            Err(TemplateError::transform(format!("sheet {sheet} not found")))
        }
    }
}

impl Transformer for MemoryGrid {
    fn template_cell(&self, cell: &CellRef) -> Option<CellValue> {
        self.template.get(cell).cloned()
    }

    fn write_cell(&mut self, target: &CellRef, value: CellValue) -> Result<()> {
        self.ensure_sheet(&target.sheet)?;
        self.writes.push(WriteRecord {
            cell: target.clone(),
            value: value.clone(),
        });
        self.output.insert(target.clone(), value);
        Ok(())
    }

    fn clear_cell(&mut self, cell: &CellRef) -> Result<()> {
        self.output.remove(cell);
        Ok(())
    }

    fn merge_cells(&mut self, region: &AreaRef) -> Result<()> {
        self.ensure_sheet(region.sheet())?;
        if self.merged.iter().any(|existing| existing.intersects(region)) {
            return Err(TemplateError::transform(format!(
                "merged region {region} overlaps an existing merged region"
            )));
        }
        self.merged.push(region.clone());
        Ok(())
    }

    fn comments(&self) -> Vec<CellComment> {
        self.comments.clone()
    }
}
