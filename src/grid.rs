//! Grid coordinates and extents.
//!
//! All coordinates are 0-based. A1 notation is only used at the edges (markup parsing,
//! display, xlsx addresses).

use crate::error::{Result, TemplateError};
use crate::utils::{column_name_to_number, column_number_to_name, needs_sheet_quotes};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static CELL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:'((?:[^']|'')+)'|([^'!:]+))!)?\$?([A-Za-z]{1,3})\$?([0-9]+)$")
        .expect("cell reference pattern is valid")
});

/// Occupied extent of a rendered region, in columns and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Absolute grid coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub sheet: String,
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(sheet: impl Into<String>, row: u32, col: u32) -> Self {
        Self {
            sheet: sheet.into(),
            row,
            col,
        }
    }

    /// Parses `B3`, `$B$3`, `Sheet1!B3` or `'My Sheet'!B3`. References without a sheet land
    /// on `default_sheet`.
    pub fn parse(reference: &str, default_sheet: &str) -> Result<Self> {
        let trimmed = reference.trim();
        let caps = CELL_RE
            .captures(trimmed)
            .ok_or_else(|| TemplateError::invalid_reference(trimmed))?;
        let sheet = caps
            .get(1)
            .map(|m| m.as_str().replace("''", "'"))
            .or_else(|| caps.get(2).map(|m| m.as_str().to_string()))
            .unwrap_or_else(|| default_sheet.to_string());
        let col = column_name_to_number(&caps[3])
            .ok_or_else(|| TemplateError::invalid_reference(trimmed))?;
        let row: u32 = caps[4]
            .parse()
            .map_err(|_| TemplateError::invalid_reference(trimmed))?;
        if row == 0 {
            return Err(TemplateError::invalid_reference(trimmed));
        }
        Ok(Self::new(sheet, row - 1, col - 1))
    }

    /// A1 address without the sheet prefix.
    pub fn cell_name(&self) -> String {
        format!("{}{}", column_number_to_name(self.col + 1), self.row + 1)
    }

    pub fn with_row(&self, row: u32) -> Self {
        Self::new(self.sheet.clone(), row, self.col)
    }

    pub fn with_col(&self, col: u32) -> Self {
        Self::new(self.sheet.clone(), self.row, col)
    }

    /// Saturates at the last addressable row and column.
    pub fn offset(&self, rows: u32, cols: u32) -> Self {
        Self::new(
            self.sheet.clone(),
            self.row.saturating_add(rows),
            self.col.saturating_add(cols),
        )
    }

    /// Applies signed deltas. A position before the grid origin or past `u32::MAX` is an
    /// invalid reference.
    pub fn shifted(&self, rows: i64, cols: i64) -> Result<Self> {
        let row = u32::try_from(self.row as i64 + rows);
        let col = u32::try_from(self.col as i64 + cols);
        match (row, col) {
            (Ok(row), Ok(col)) => Ok(Self::new(self.sheet.clone(), row, col)),
            _ => Err(TemplateError::invalid_reference(format!(
                "{self} shifted by ({rows}, {cols})"
            ))),
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if needs_sheet_quotes(&self.sheet) {
            write!(f, "'{}'!{}", self.sheet.replace('\'', "''"), self.cell_name())
        } else {
            write!(f, "{}!{}", self.sheet, self.cell_name())
        }
    }
}

/// Inclusive rectangle on a single sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AreaRef {
    pub first: CellRef,
    pub last: CellRef,
}

impl AreaRef {
    pub fn new(first: CellRef, last: CellRef) -> Result<Self> {
        if first.sheet != last.sheet || last.row < first.row || last.col < first.col {
            return Err(TemplateError::invalid_reference(format!("{first}:{last}")));
        }
        Ok(Self { first, last })
    }

    /// Rectangle of `size` anchored at `start`. A zero size has no cells and is rejected.
    pub fn from_size(start: &CellRef, size: Size) -> Result<Self> {
        if size.is_empty() {
            return Err(TemplateError::invalid_reference(format!("{start} ({size})")));
        }
        let last = start.offset(size.height - 1, size.width - 1);
        Self::new(start.clone(), last)
    }

    /// Parses `A1:D4` or `Sheet1!A1:D4`; a single cell is a 1x1 area.
    pub fn parse(reference: &str, default_sheet: &str) -> Result<Self> {
        let trimmed = reference.trim();
        match trimmed.rsplit_once(':') {
            Some((first, last)) => {
                let first = CellRef::parse(first, default_sheet)?;
                let last = CellRef::parse(last, &first.sheet)?;
                Self::new(first, last)
            }
            None => {
                let cell = CellRef::parse(trimmed, default_sheet)?;
                Self::new(cell.clone(), cell)
            }
        }
    }

    pub fn sheet(&self) -> &str {
        &self.first.sheet
    }

    pub fn size(&self) -> Size {
        Size::new(
            self.last.col - self.first.col + 1,
            self.last.row - self.first.row + 1,
        )
    }

    pub fn cell_count(&self) -> u64 {
        let size = self.size();
        size.width as u64 * size.height as u64
    }

    pub fn contains_cell(&self, cell: &CellRef) -> bool {
        cell.sheet == self.first.sheet
            && (self.first.row..=self.last.row).contains(&cell.row)
            && (self.first.col..=self.last.col).contains(&cell.col)
    }

    pub fn contains_area(&self, other: &AreaRef) -> bool {
        self.contains_cell(&other.first) && self.contains_cell(&other.last)
    }

    pub fn intersects(&self, other: &AreaRef) -> bool {
        self.sheet() == other.sheet()
            && self.first.row <= other.last.row
            && other.first.row <= self.last.row
            && self.first.col <= other.last.col
            && other.first.col <= self.last.col
    }
}

impl fmt::Display for AreaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.first, self.last.cell_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_refs() {
        assert_eq!(
            CellRef::parse("B3", "Sheet1").unwrap(),
            CellRef::new("Sheet1", 2, 1)
        );
        assert_eq!(
            CellRef::parse("$AA$10", "Sheet1").unwrap(),
            CellRef::new("Sheet1", 9, 26)
        );
        assert_eq!(
            CellRef::parse("Data!C1", "Sheet1").unwrap(),
            CellRef::new("Data", 0, 2)
        );
        assert_eq!(
            CellRef::parse("'My Sheet'!A1", "Sheet1").unwrap(),
            CellRef::new("My Sheet", 0, 0)
        );
        assert!(CellRef::parse("A0", "Sheet1").is_err());
        assert!(CellRef::parse("not a cell", "Sheet1").is_err());
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellRef::new("Sheet1", 0, 0).to_string(), "Sheet1!A1");
        assert_eq!(CellRef::new("My Sheet", 2, 27).to_string(), "'My Sheet'!AB3");
    }

    #[test]
    fn test_derived_positions_leave_original_untouched() {
        let cell = CellRef::new("S", 4, 2);
        assert_eq!(cell.offset(1, 2), CellRef::new("S", 5, 4));
        assert_eq!(cell.shifted(-4, 1).unwrap(), CellRef::new("S", 0, 3));
        assert_eq!(cell.with_row(9).row, 9);
        assert_eq!(cell, CellRef::new("S", 4, 2));
    }

    #[test]
    fn test_positions_past_the_grid_edges() {
        let cell = CellRef::new("S", 4, 2);
        assert!(matches!(
            cell.shifted(-5, 0),
            Err(TemplateError::InvalidReference { .. })
        ));
        assert!(cell.shifted(0, i64::from(u32::MAX)).is_err());

        let corner = CellRef::new("S", u32::MAX - 1, u32::MAX);
        assert_eq!(corner.offset(3, 1), CellRef::new("S", u32::MAX, u32::MAX));
        let area = AreaRef::from_size(&corner, Size::new(2, 2)).unwrap();
        assert_eq!(area.last, CellRef::new("S", u32::MAX, u32::MAX));
    }

    #[test]
    fn test_area_geometry() {
        let area = AreaRef::parse("Sheet1!A1:D4", "Other").unwrap();
        assert_eq!(area.size(), Size::new(4, 4));
        assert_eq!(area.to_string(), "Sheet1!A1:D4");
        assert!(area.contains_cell(&CellRef::new("Sheet1", 3, 3)));
        assert!(!area.contains_cell(&CellRef::new("Sheet1", 4, 0)));

        let inner = AreaRef::parse("B2:C3", "Sheet1").unwrap();
        assert!(area.contains_area(&inner));
        assert!(!inner.contains_area(&area));

        let right = AreaRef::parse("E1:F2", "Sheet1").unwrap();
        assert!(!area.intersects(&right));
        assert!(area.intersects(&AreaRef::parse("D4:E5", "Sheet1").unwrap()));
        assert!(AreaRef::parse("C3:A1", "Sheet1").is_err());
    }

    #[test]
    fn test_area_from_size() {
        let start = CellRef::new("S", 1, 1);
        let area = AreaRef::from_size(&start, Size::new(2, 3)).unwrap();
        assert_eq!(area.last, CellRef::new("S", 3, 2));
        assert!(AreaRef::from_size(&start, Size::ZERO).is_err());
    }
}
