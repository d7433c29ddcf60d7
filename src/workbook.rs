//! `.xlsx` backend for the renderer, built on `umya-spreadsheet`.
//!
//! The workbook is read once; every populated cell and every comment is snapshotted as the
//! template before rendering starts. Results are written back into the same in-memory
//! workbook, which is then saved to the output path.

use crate::error::{Result, TemplateError};
use crate::grid::{AreaRef, CellRef};
use crate::transform::{CellComment, CellValue, Transformer};
use crate::utils::cell_address;
use anyhow::Context;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use umya_spreadsheet::reader::xlsx;
use umya_spreadsheet::{Cell, Spreadsheet, Worksheet};

const MARKUP_PREFIX: &str = "jx:";

pub struct XlsxTransformer {
    book: Spreadsheet,
    template: HashMap<CellRef, CellValue>,
    comments: Vec<CellComment>,
    sheets: HashSet<String>,
}

impl XlsxTransformer {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let book =
            xlsx::read(path).with_context(|| format!("failed to parse workbook {:?}", path))?;
        Ok(Self::from_spreadsheet(book))
    }

    pub fn from_spreadsheet(book: Spreadsheet) -> Self {
        let mut template = HashMap::new();
        let mut comments = Vec::new();
        let mut sheets = HashSet::new();

        for sheet in book.get_sheet_collection() {
            let name = sheet.get_name().to_string();
            for cell in sheet.get_cell_collection() {
                let coord = cell.get_coordinate();
                let row = coord.get_row_num().to_owned();
                let col = coord.get_col_num().to_owned();
                if row == 0 || col == 0 {
                    continue;
                }
                let value = cell_to_value(cell);
                if !value.is_empty() {
                    template.insert(CellRef::new(name.clone(), row - 1, col - 1), value);
                }
            }
            comments.extend(sheet_comments(sheet, &name));
            sheets.insert(name);
        }

        tracing::debug!(
            sheets = sheets.len(),
            cells = template.len(),
            comments = comments.len(),
            "workbook template loaded"
        );
        Self {
            book,
            template,
            comments,
            sheets,
        }
    }

    pub fn spreadsheet(&self) -> &Spreadsheet {
        &self.book
    }

    /// Writes the rendered workbook to `path`, dropping the `jx:` markup comments.
    pub fn save(&mut self, path: &Path) -> anyhow::Result<()> {
        for sheet in self.book.get_sheet_collection_mut() {
            sheet
                .get_comments_mut()
                .retain(|comment| !comment.get_text().get_text().contains(MARKUP_PREFIX));
        }
        umya_spreadsheet::writer::xlsx::write(&self.book, path)
            .with_context(|| format!("failed to write workbook {:?}", path))?;
        tracing::info!(path = %path.display(), "rendered workbook saved");
        Ok(())
    }

    /// Current output value at `cell`.
    pub fn output_cell(&self, cell: &CellRef) -> Option<CellValue> {
        let sheet = self.book.get_sheet_by_name(&cell.sheet)?;
        let value = sheet
            .get_cell(address(cell).as_str())
            .map(cell_to_value)
            .unwrap_or_default();
        (!value.is_empty()).then_some(value)
    }

    fn sheet_mut(&mut self, sheet: &str) -> Result<&mut Worksheet> {
        if !self.sheets.contains(sheet) {
            return Err(TemplateError::transform(format!("sheet {sheet} not found")));
        }
        self.book
            .get_sheet_by_name_mut(sheet)
            .ok_or_else(|| TemplateError::transform(format!("sheet {sheet} not found")))
    }
}

impl std::fmt::Debug for XlsxTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XlsxTransformer")
            .field("sheets", &self.sheets)
            .field("template_cells", &self.template.len())
            .field("comments", &self.comments.len())
            .finish_non_exhaustive()
    }
}

impl Transformer for XlsxTransformer {
    fn template_cell(&self, cell: &CellRef) -> Option<CellValue> {
        self.template.get(cell).cloned()
    }

    fn write_cell(&mut self, target: &CellRef, value: CellValue) -> Result<()> {
        let sheet = self.sheet_mut(&target.sheet)?;
        let cell = sheet.get_cell_mut(address(target).as_str());
        match value {
            CellValue::Empty => {
                cell.set_value("");
            }
            CellValue::Text(text) => {
                cell.set_value_string(text);
            }
            CellValue::Number(number) => {
                cell.set_value_number(number);
            }
            CellValue::Bool(flag) => {
                cell.set_value_bool(flag);
            }
            CellValue::Formula(formula) => {
                cell.set_formula(formula);
            }
        }
        Ok(())
    }

    fn clear_cell(&mut self, cell: &CellRef) -> Result<()> {
        let sheet = self.sheet_mut(&cell.sheet)?;
        let coordinate = address(cell);
        if sheet.get_cell(coordinate.as_str()).is_some() {
            sheet.get_cell_mut(coordinate.as_str()).set_value("");
        }
        Ok(())
    }

    fn merge_cells(&mut self, region: &AreaRef) -> Result<()> {
        let range = format!("{}:{}", address(&region.first), address(&region.last));
        let sheet = self.sheet_mut(region.sheet())?;
        sheet.add_merge_cells(range);
        Ok(())
    }

    fn comments(&self) -> Vec<CellComment> {
        self.comments.clone()
    }
}

fn address(cell: &CellRef) -> String {
    cell_address(cell.col + 1, cell.row + 1)
}

fn sheet_comments(sheet: &Worksheet, name: &str) -> Vec<CellComment> {
    sheet
        .get_comments()
        .iter()
        .filter_map(|comment| {
            let coord = comment.get_coordinate();
            let row = coord.get_row_num().to_owned();
            let col = coord.get_col_num().to_owned();
            if row == 0 || col == 0 {
                return None;
            }
            Some(CellComment {
                cell: CellRef::new(name, row - 1, col - 1),
                text: comment.get_text().get_text().to_string(),
            })
        })
        .collect()
}

/// Typed template value of a workbook cell. Formulas are kept verbatim.
pub fn cell_to_value(cell: &Cell) -> CellValue {
    if cell.is_formula() {
        return CellValue::Formula(cell.get_formula().to_string());
    }
    let raw = cell.get_value();
    if raw.is_empty() {
        return CellValue::Empty;
    }
    if raw.contains("${") {
        return CellValue::Text(raw.to_string());
    }
    if let Ok(number) = raw.parse::<f64>() {
        return CellValue::Number(number);
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => CellValue::Bool(true),
        "false" => CellValue::Bool(false),
        _ => CellValue::Text(raw.to_string()),
    }
}
