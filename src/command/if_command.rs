use super::{Command, ensure_area_capacity};
use crate::area::Area;
use crate::context::Context;
use crate::error::Result;
use crate::grid::{CellRef, Size};
use crate::transform::Transformer;

/// `if`: renders the first area when the condition holds, otherwise the optional second
/// (else) area. With no else area a false condition occupies nothing.
#[derive(Debug)]
pub struct IfCommand {
    condition: String,
    areas: Vec<Area>,
}

impl IfCommand {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            areas: Vec::new(),
        }
    }

    pub fn with_area(mut self, area: Area) -> Result<Self> {
        self.add_area(area)?;
        Ok(self)
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn if_area(&self) -> Option<&Area> {
        self.areas.first()
    }

    pub fn else_area(&self) -> Option<&Area> {
        self.areas.get(1)
    }
}

impl Command for IfCommand {
    fn name(&self) -> &str {
        "if"
    }

    fn areas(&self) -> &[Area] {
        &self.areas
    }

    fn add_area(&mut self, area: Area) -> Result<()> {
        ensure_area_capacity(self.name(), self.areas.len(), 2)?;
        self.areas.push(area);
        Ok(())
    }

    fn apply_at(
        &self,
        cell: &CellRef,
        context: &mut Context,
        transformer: &mut dyn Transformer,
    ) -> Result<Size> {
        let holds = context.is_condition_true(&self.condition)?;
        let branch = if holds {
            self.if_area()
        } else {
            self.else_area()
        };
        tracing::trace!(condition = %self.condition, holds, "if command evaluated");
        match branch {
            Some(area) => area.apply_at(cell, context, transformer),
            None => Ok(Size::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::transform::{CellValue, MemoryGrid};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn grid() -> MemoryGrid {
        MemoryGrid::from_cells("S", [("A1", "high ${v}"), ("A2", "low ${v}")]).unwrap()
    }

    fn command() -> IfCommand {
        IfCommand::new("v > 10")
            .with_area(Area::parse("A1", "S").unwrap())
            .unwrap()
            .with_area(Area::parse("A2", "S").unwrap())
            .unwrap()
    }

    #[test]
    fn test_branches_follow_condition() {
        let mut grid = grid();
        let mut context = Context::from_vars([("v", json!(3))]);
        let size = command()
            .apply_at(&CellRef::new("S", 5, 0), &mut context, &mut grid)
            .unwrap();
        assert_eq!(size, Size::new(1, 1));
        assert_eq!(grid.value_at("A6", "S"), Some(&CellValue::text("low 3")));
    }

    #[test]
    fn test_false_without_else_is_empty() {
        let mut grid = grid();
        let command = IfCommand::new("v > 10")
            .with_area(Area::parse("A1", "S").unwrap())
            .unwrap();
        let mut context = Context::from_vars([("v", json!(3))]);
        let size = command
            .apply_at(&CellRef::new("S", 5, 0), &mut context, &mut grid)
            .unwrap();
        assert_eq!(size, Size::ZERO);
        assert!(grid.writes().is_empty());
    }

    #[test]
    fn test_third_area_is_rejected() {
        let err = command()
            .with_area(Area::parse("A3", "S").unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::configuration("You can add at most 2 areas to 'if' command")
        );
    }

    #[test]
    fn test_non_boolean_condition_fails() {
        let mut context = Context::from_vars([("v", json!("yes"))]);
        assert_matches!(
            IfCommand::new("v")
                .with_area(Area::parse("A1", "S").unwrap())
                .unwrap()
                .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid()),
            Err(TemplateError::Evaluation { .. })
        );
    }
}
