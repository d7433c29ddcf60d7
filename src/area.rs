//! Template areas: rectangles of static cells with nested commands.
//!
//! Rendering an area at a target cell renders its commands first (in template order),
//! shifting each past the rendered extent of the commands above it and to its left, then
//! renders the static cells at their shifted positions. The returned [`Size`] is the bounding
//! box of everything written.

use crate::command::{Command, CommandData};
use crate::context::Context;
use crate::error::{Result, TemplateError};
use crate::expression::to_display_string;
use crate::grid::{AreaRef, CellRef, Size};
use crate::transform::{CellValue, Transformer};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::Cell;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));
static WHOLE_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{([^}]+)\}$").expect("placeholder pattern is valid"));

#[derive(Debug)]
pub struct Area {
    region: AreaRef,
    commands: Vec<CommandData>,
    cells_cleared: Cell<bool>,
}

impl Area {
    pub fn new(region: AreaRef) -> Self {
        Self {
            region,
            commands: Vec::new(),
            cells_cleared: Cell::new(false),
        }
    }

    pub fn from_size(start: &CellRef, size: Size) -> Result<Self> {
        Ok(Self::new(AreaRef::from_size(start, size)?))
    }

    /// `Area::parse("Sheet1!A1:C4", "Sheet1")`.
    pub fn parse(reference: &str, default_sheet: &str) -> Result<Self> {
        Ok(Self::new(AreaRef::parse(reference, default_sheet)?))
    }

    pub fn region(&self) -> &AreaRef {
        &self.region
    }

    pub fn start(&self) -> &CellRef {
        &self.region.first
    }

    pub fn size(&self) -> Size {
        self.region.size()
    }

    pub fn commands(&self) -> &[CommandData] {
        &self.commands
    }

    pub fn add_command<C: Command + 'static>(&mut self, region: AreaRef, command: C) -> Result<()> {
        self.add_boxed_command(region, Box::new(command))
    }

    pub fn add_boxed_command(&mut self, region: AreaRef, command: Box<dyn Command>) -> Result<()> {
        if !self.region.contains_area(&region) {
            return Err(TemplateError::configuration(format!(
                "'{}' command region {} lies outside area {}",
                command.name(),
                region,
                self.region
            )));
        }
        if let Some(existing) = self
            .commands
            .iter()
            .find(|data| data.region().intersects(&region))
        {
            return Err(TemplateError::configuration(format!(
                "'{}' command region {} overlaps '{}' command region {}",
                command.name(),
                region,
                existing.command().name(),
                existing.region()
            )));
        }
        self.commands.push(CommandData::new(region, command));
        Ok(())
    }

    pub fn with_command<C: Command + 'static>(mut self, region: AreaRef, command: C) -> Result<Self> {
        self.add_command(region, command)?;
        Ok(self)
    }

    pub fn apply_at(
        &self,
        target: &CellRef,
        context: &mut Context,
        transformer: &mut dyn Transformer,
    ) -> Result<Size> {
        if !self.cells_cleared.get() {
            self.clear_cells(transformer)?;
        }
        tracing::trace!(area = %self.region, target = %target, "applying area");

        let origin = self.start();
        let mut ordered: Vec<&CommandData> = self.commands.iter().collect();
        ordered.sort_by_key(|data| (data.start().row, data.start().col));

        let mut placed: Vec<Placement> = Vec::with_capacity(ordered.len());
        for data in ordered {
            let template = Rect::relative(data.region(), origin);
            let (row_shift, col_shift) = shift_for(&placed, &template);
            let row = template.row as i64 + row_shift;
            let col = template.col as i64 + col_shift;
            let cell = target.shifted(row, col)?;
            let size = data.command().apply_at(&cell, context, transformer)?;
            tracing::trace!(
                command = data.command().name(),
                cell = %cell,
                size = %size,
                "command applied"
            );
            placed.push(Placement {
                template,
                row,
                col,
                size,
            });
        }

        let Size { width, height } = self.size();
        for row in 0..height {
            for col in 0..width {
                if placed.iter().any(|p| p.template.contains(row, col)) {
                    continue;
                }
                let Some(value) = transformer.template_cell(&origin.offset(row, col)) else {
                    continue;
                };
                let (row_shift, col_shift) = shift_for(&placed, &Rect::cell(row, col));
                let dest = target.shifted(row as i64 + row_shift, col as i64 + col_shift)?;
                let rendered = render_value(value, context)?;
                transformer.write_cell(&dest, rendered)?;
            }
        }

        Ok(bounding_size(self.size(), &placed))
    }

    /// Clears this area's template cells in the output. Nested areas inside the region are
    /// only marked cleared; nested areas elsewhere clear themselves.
    pub fn clear_cells(&self, transformer: &mut dyn Transformer) -> Result<()> {
        let origin = self.start();
        let Size { width, height } = self.size();
        for row in 0..height {
            for col in 0..width {
                transformer.clear_cell(&origin.offset(row, col))?;
            }
        }
        self.cells_cleared.set(true);
        self.settle_nested(&self.region, transformer)
    }

    fn settle_nested(&self, cleared: &AreaRef, transformer: &mut dyn Transformer) -> Result<()> {
        for data in &self.commands {
            for area in data.command().areas() {
                if area.cells_cleared.get() {
                    continue;
                }
                if cleared.contains_area(area.region()) {
                    area.cells_cleared.set(true);
                    area.settle_nested(cleared, transformer)?;
                } else {
                    area.clear_cells(transformer)?;
                }
            }
        }
        Ok(())
    }

    /// Re-arms template clearing and resets every nested command.
    pub fn reset(&self) {
        self.cells_cleared.set(false);
        for data in &self.commands {
            data.command().reset();
        }
    }
}

/// Template rectangle relative to the area origin.
#[derive(Debug, Clone, Copy)]
struct Rect {
    row: u32,
    col: u32,
    width: u32,
    height: u32,
}

impl Rect {
    fn relative(region: &AreaRef, origin: &CellRef) -> Self {
        let size = region.size();
        Self {
            row: region.first.row - origin.row,
            col: region.first.col - origin.col,
            width: size.width,
            height: size.height,
        }
    }

    fn cell(row: u32, col: u32) -> Self {
        Self {
            row,
            col,
            width: 1,
            height: 1,
        }
    }

    fn contains(&self, row: u32, col: u32) -> bool {
        self.spans_row(row) && self.spans_col(col)
    }

    fn bottom(&self) -> u32 {
        self.row + self.height
    }

    fn right(&self) -> u32 {
        self.col + self.width
    }

    fn spans_row(&self, row: u32) -> bool {
        (self.row..self.bottom()).contains(&row)
    }

    fn spans_col(&self, col: u32) -> bool {
        (self.col..self.right()).contains(&col)
    }
}

/// A command after rendering: where its template sat and what it produced.
#[derive(Debug)]
struct Placement {
    template: Rect,
    row: i64,
    col: i64,
    size: Size,
}

impl Placement {
    /// Rendered bottom edge minus template bottom edge, relative to the area origin.
    fn bottom_offset(&self) -> i64 {
        self.row + self.size.height as i64 - self.template.bottom() as i64
    }

    fn right_offset(&self) -> i64 {
        self.col + self.size.width as i64 - self.template.right() as i64
    }
}

/// Shift of a template rectangle after the commands placed before it.
///
/// Each column the rectangle spans is pushed down by the furthest a command above it in that
/// column ended up from its template bottom (zero when no command sits above). The rectangle
/// moves by the largest of those, so growth in side-by-side columns is never added twice.
/// Columns shift the same way along rows.
fn shift_for(placed: &[Placement], rect: &Rect) -> (i64, i64) {
    let row_shift = (rect.col..rect.col + rect.width)
        .map(|col| column_offset(placed, col, rect.row))
        .max()
        .unwrap_or(0);
    let col_shift = (rect.row..rect.row + rect.height)
        .map(|row| row_offset(placed, row, rect.col))
        .max()
        .unwrap_or(0);
    (row_shift, col_shift)
}

/// Vertical displacement in `col` for template rows at or below `row`.
fn column_offset(placed: &[Placement], col: u32, row: u32) -> i64 {
    placed
        .iter()
        .filter(|p| p.template.bottom() <= row && p.template.spans_col(col))
        .map(Placement::bottom_offset)
        .max()
        .unwrap_or(0)
}

/// Horizontal displacement in `row` for template columns at or right of `col`.
fn row_offset(placed: &[Placement], row: u32, col: u32) -> i64 {
    placed
        .iter()
        .filter(|p| p.template.right() <= col && p.template.spans_row(row))
        .map(Placement::right_offset)
        .max()
        .unwrap_or(0)
}

fn bounding_size(template: Size, placed: &[Placement]) -> Size {
    let mut height = (0..template.width)
        .map(|col| template.height as i64 + column_offset(placed, col, template.height))
        .max()
        .unwrap_or(0);
    let mut width = (0..template.height)
        .map(|row| template.width as i64 + row_offset(placed, row, template.width))
        .max()
        .unwrap_or(0);

    for p in placed {
        height = height.max(p.row + p.size.height as i64);
        width = width.max(p.col + p.size.width as i64);
    }

    Size::new(
        width.clamp(0, u32::MAX as i64) as u32,
        height.clamp(0, u32::MAX as i64) as u32,
    )
}

/// Evaluates `${...}` placeholders. A cell holding exactly one placeholder keeps the type of
/// the evaluated value; otherwise placeholders are interpolated into text.
fn render_value(value: CellValue, context: &Context) -> Result<CellValue> {
    let CellValue::Text(text) = value else {
        return Ok(value);
    };
    if let Some(caps) = WHOLE_PLACEHOLDER_RE.captures(&text) {
        let result = context.evaluate(caps[1].trim())?;
        return Ok(CellValue::from_json(&result));
    }
    if !text.contains("${") {
        return Ok(CellValue::Text(text));
    }

    let mut rendered = String::with_capacity(text.len());
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(&text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        rendered.push_str(&text[last..whole.start()]);
        let result = context.evaluate(caps[1].trim())?;
        rendered.push_str(&to_display_string(&result));
        last = whole.end();
    }
    rendered.push_str(&text[last..]);
    Ok(CellValue::Text(rendered))
}
