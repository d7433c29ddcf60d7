use crate::area::Area;
use crate::builder::AreaBuilder;
use crate::context::Context;
use crate::error::Result;
use crate::grid::{AreaRef, Size};
use crate::transform::Transformer;
use serde::Serialize;

/// Result of one render pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderSummary {
    pub areas: Vec<AreaSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaSummary {
    pub area: String,
    pub size: Size,
}

impl RenderSummary {
    pub fn total_cells(&self) -> u64 {
        self.areas
            .iter()
            .map(|a| u64::from(a.size.width) * u64::from(a.size.height))
            .sum()
    }
}

/// Owns the root areas of a template and renders them in place.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    areas: Vec<Area>,
}

impl TemplateRenderer {
    pub fn new(areas: Vec<Area>) -> Self {
        Self { areas }
    }

    /// Builds the root areas from the markup in `transformer`'s comments.
    pub fn from_transformer(builder: &AreaBuilder, transformer: &dyn Transformer) -> Result<Self> {
        Ok(Self::new(builder.build(transformer)?))
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Applies every root area at its own template start. Areas are reset first, so a
    /// renderer can be reused for independent passes.
    pub fn render(
        &self,
        context: &mut Context,
        transformer: &mut dyn Transformer,
    ) -> Result<RenderSummary> {
        for area in &self.areas {
            area.reset();
        }

        let mut summary = RenderSummary { areas: Vec::new() };
        for area in &self.areas {
            let region: &AreaRef = area.region();
            let span = tracing::info_span!("render_area", area = %region);
            let _enter = span.enter();
            let size = area.apply_at(area.start(), context, transformer)?;
            tracing::info!(size = %size, "area rendered");
            summary.areas.push(AreaSummary {
                area: region.to_string(),
                size,
            });
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{CellValue, MemoryGrid};
    use serde_json::json;

    fn template() -> MemoryGrid {
        let mut grid = MemoryGrid::from_cells(
            "S",
            [("A1", "Name"), ("A2", "${e.name}"), ("A3", "done")],
        )
        .unwrap();
        grid.add_comment("A1", "S", "jx:area(lastCell=\"A3\")").unwrap();
        grid.add_comment("A2", "S", "jx:each(items=\"employees\" var=\"e\" lastCell=\"A2\")")
            .unwrap();
        grid
    }

    #[test]
    fn test_render_expands_and_summarises() {
        let mut grid = template();
        let renderer = TemplateRenderer::from_transformer(&AreaBuilder::new(), &grid).unwrap();
        let mut context =
            Context::from_vars([("employees", json!([{"name": "Elsa"}, {"name": "Oleg"}]))]);

        let summary = renderer.render(&mut context, &mut grid).unwrap();

        assert_eq!(summary.areas.len(), 1);
        assert_eq!(summary.areas[0].area, "S!A1:A3");
        assert_eq!(summary.areas[0].size, Size::new(1, 4));
        assert_eq!(summary.total_cells(), 4);
        assert_eq!(grid.value_at("A3", "S"), Some(&CellValue::text("Oleg")));
        assert_eq!(grid.value_at("A4", "S"), Some(&CellValue::text("done")));
    }

    #[test]
    fn test_renderer_is_reusable() {
        let mut grid = template();
        let renderer = TemplateRenderer::from_transformer(&AreaBuilder::new(), &grid).unwrap();

        let mut first = Context::from_vars([("employees", json!([{"name": "A"}, {"name": "B"}]))]);
        renderer.render(&mut first, &mut grid).unwrap();

        let mut second = Context::from_vars([("employees", json!([]))]);
        let summary = renderer.render(&mut second, &mut grid).unwrap();

        assert_eq!(summary.areas[0].size, Size::new(1, 2));
        assert_eq!(grid.value_at("A2", "S"), Some(&CellValue::text("done")));
    }
}
