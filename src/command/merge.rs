use super::{Command, ensure_area_capacity};
use crate::area::Area;
use crate::context::Context;
use crate::error::{Result, TemplateError};
use crate::grid::{AreaRef, CellRef, Size};
use crate::transform::Transformer;
use serde_json::Value;

/// `mergeCells`: renders its area, then merges `cols` x `rows` cells at the target.
#[derive(Debug)]
pub struct MergeCellsCommand {
    cols: Option<String>,
    rows: Option<String>,
    min_cols: u32,
    min_rows: u32,
    area: Option<Area>,
}

impl MergeCellsCommand {
    pub fn new() -> Self {
        Self {
            cols: None,
            rows: None,
            min_cols: 1,
            min_rows: 1,
            area: None,
        }
    }

    pub fn with_area(mut self, area: Area) -> Result<Self> {
        self.add_area(area)?;
        Ok(self)
    }

    /// Expression for the merged width; the rendered width when unset.
    pub fn with_cols(mut self, cols: impl Into<String>) -> Self {
        self.cols = Some(cols.into());
        self
    }

    /// Expression for the merged height; the rendered height when unset.
    pub fn with_rows(mut self, rows: impl Into<String>) -> Self {
        self.rows = Some(rows.into());
        self
    }

    pub fn with_min_cols(mut self, min_cols: u32) -> Self {
        self.min_cols = min_cols;
        self
    }

    pub fn with_min_rows(mut self, min_rows: u32) -> Self {
        self.min_rows = min_rows;
        self
    }

    fn dimension(&self, expression: Option<&str>, fallback: u32, context: &Context) -> Result<u32> {
        let Some(expression) = expression else {
            return Ok(fallback);
        };
        match context.evaluate(expression)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    TemplateError::evaluation(expression, format!("{n} is not a valid merge extent"))
                }),
            Value::Null => Ok(fallback),
            other => Err(TemplateError::evaluation(
                expression,
                format!("merge extent must be a number, got {other}"),
            )),
        }
    }
}

impl Default for MergeCellsCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for MergeCellsCommand {
    fn name(&self) -> &str {
        "mergeCells"
    }

    fn areas(&self) -> &[Area] {
        self.area.as_slice()
    }

    fn add_area(&mut self, area: Area) -> Result<()> {
        ensure_area_capacity(self.name(), self.areas().len(), 1)?;
        self.area = Some(area);
        Ok(())
    }

    fn apply_at(
        &self,
        cell: &CellRef,
        context: &mut Context,
        transformer: &mut dyn Transformer,
    ) -> Result<Size> {
        let area = self
            .area
            .as_ref()
            .ok_or_else(|| TemplateError::configuration("'mergeCells' command has no area"))?;
        let rendered = area.apply_at(cell, context, transformer)?;

        let cols = self.dimension(self.cols.as_deref(), rendered.width, context)?;
        let rows = self.dimension(self.rows.as_deref(), rendered.height, context)?;
        if cols >= self.min_cols && rows >= self.min_rows && u64::from(cols) * u64::from(rows) > 1 {
            let region = AreaRef::from_size(cell, Size::new(cols, rows))?;
            tracing::trace!(region = %region, "merging cells");
            transformer.merge_cells(&region)?;
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::MemoryGrid;
    use serde_json::json;

    fn grid() -> MemoryGrid {
        MemoryGrid::from_cells("S", [("A1", "${title}")]).unwrap()
    }

    #[test]
    fn test_merges_evaluated_extent() {
        let mut grid = grid();
        let command = MergeCellsCommand::new()
            .with_cols("span")
            .with_rows("2")
            .with_area(Area::parse("A1", "S").unwrap())
            .unwrap();
        let mut context = Context::from_vars([("title", json!("Report")), ("span", json!(3))]);

        let size = command
            .apply_at(&CellRef::new("S", 2, 1), &mut context, &mut grid)
            .unwrap();

        assert_eq!(size, Size::new(1, 1));
        assert_eq!(
            grid.merged_regions(),
            &[AreaRef::parse("B3:D4", "S").unwrap()]
        );
    }

    #[test]
    fn test_single_cell_is_not_merged() {
        let mut grid = grid();
        let command = MergeCellsCommand::new()
            .with_area(Area::parse("A1", "S").unwrap())
            .unwrap();
        let mut context = Context::from_vars([("title", json!("Report"))]);
        command
            .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid)
            .unwrap();
        assert!(grid.merged_regions().is_empty());
    }

    #[test]
    fn test_below_minimum_is_not_merged() {
        let mut grid = grid();
        let command = MergeCellsCommand::new()
            .with_cols("2")
            .with_min_cols(3)
            .with_area(Area::parse("A1", "S").unwrap())
            .unwrap();
        let mut context = Context::from_vars([("title", json!("Report"))]);
        command
            .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid)
            .unwrap();
        assert!(grid.merged_regions().is_empty());
    }

    #[test]
    fn test_negative_extent_is_evaluation_error() {
        let command = MergeCellsCommand::new()
            .with_cols("0 - 2")
            .with_area(Area::parse("A1", "S").unwrap())
            .unwrap();
        let mut context = Context::from_vars([("title", json!("Report"))]);
        let err = command
            .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid())
            .unwrap_err();
        assert!(matches!(err, TemplateError::Evaluation { .. }));
    }
}
