//! Commands transform one or more template areas at a target cell.
//!
//! Dispatch is purely through the [`Command`] trait; `name()` only serves diagnostics and
//! markup registration.

mod each;
mod if_command;
mod merge;

pub use each::{CellRefGenerator, Direction, EachCommand, SortOrder};
pub use if_command::IfCommand;
pub use merge::MergeCellsCommand;

use crate::area::Area;
use crate::context::Context;
use crate::error::Result;
use crate::grid::{AreaRef, CellRef, Size};
use crate::transform::Transformer;

pub trait Command {
    /// Stable identifier of the command kind (`each`, `if`, ...).
    fn name(&self) -> &str;

    fn areas(&self) -> &[Area];

    /// Attaches a nested area. Variants with a fixed number of areas return a configuration
    /// error once that number is reached, leaving the already attached areas untouched.
    fn add_area(&mut self, area: Area) -> Result<()>;

    /// Applies the command with its top-left corner at `cell` and returns the extent it
    /// occupied. The context is left exactly as it was found.
    fn apply_at(
        &self,
        cell: &CellRef,
        context: &mut Context,
        transformer: &mut dyn Transformer,
    ) -> Result<Size>;

    /// Clears per-render state so the command can serve another independent render pass.
    fn reset(&self) {
        for area in self.areas() {
            area.reset();
        }
    }
}

/// A command placed inside an area: its template region and the command itself.
pub struct CommandData {
    region: AreaRef,
    command: Box<dyn Command>,
}

impl CommandData {
    pub fn new(region: AreaRef, command: Box<dyn Command>) -> Self {
        Self { region, command }
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

    pub fn command(&self) -> &dyn Command {
        self.command.as_ref()
    }
}

impl std::fmt::Debug for CommandData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandData")
            .field("region", &self.region)
            .field("command", &self.command.name())
            .finish()
    }
}

/// Enforces the area cardinality shared by the built-in commands.
pub(crate) fn ensure_area_capacity(command: &str, current: usize, max: usize) -> Result<()> {
    if current >= max {
        let message = if max == 1 {
            format!("You can add only a single area to '{command}' command")
        } else {
            format!("You can add at most {max} areas to '{command}' command")
        };
        return Err(crate::error::TemplateError::configuration(message));
    }
    Ok(())
}
