#![allow(dead_code)]

use serde_json::{Value, json};
use spreadsheet_template::{CellRef, CellValue, MemoryGrid};
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};
use umya_spreadsheet::{self, Spreadsheet};

pub const SHEET: &str = "Sheet1";

/// In-memory template on [`SHEET`].
pub fn grid<'a>(cells: impl IntoIterator<Item = (&'a str, &'a str)>) -> MemoryGrid {
    MemoryGrid::from_cells(SHEET, cells).expect("template cells")
}

pub fn cell(reference: &str) -> CellRef {
    CellRef::parse(reference, SHEET).expect("cell reference")
}

pub fn text(grid: &MemoryGrid, reference: &str) -> Option<String> {
    grid.value_at(reference, SHEET)
        .and_then(CellValue::as_text)
        .map(str::to_string)
}

pub fn employees() -> Value {
    json!([
        {"name": "Elsa", "payment": 1500, "dept": "IT"},
        {"name": "Oleg", "payment": 2300, "dept": "HR"},
        {"name": "Neil", "payment": 2500, "dept": "IT"},
        {"name": "Maria", "payment": 1700, "dept": "HR"},
        {"name": "John", "payment": 2800, "dept": "IT"}
    ])
}

pub fn write_workbook_to_path<F>(path: &Path, f: F)
where
    F: FnOnce(&mut Spreadsheet),
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dir");
    }
    let mut book = umya_spreadsheet::new_file();
    f(&mut book);
    umya_spreadsheet::writer::xlsx::write(&book, path).expect("write workbook");
}

pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn create_workbook<F>(&self, name: &str, f: F) -> PathBuf
    where
        F: FnOnce(&mut Spreadsheet),
    {
        let path = self.path(name);
        write_workbook_to_path(&path, f);
        path
    }

    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("write file");
        path
    }
}

/// Attaches a comment holding `text` to `reference` on the named sheet.
pub fn add_comment(book: &mut Spreadsheet, sheet: &str, reference: &str, text: &str) {
    let mut comment = umya_spreadsheet::Comment::default();
    comment.new_comment(reference);
    comment.set_text_string(text);
    book.get_sheet_by_name_mut(sheet)
        .expect("sheet exists")
        .add_comments(comment);
}
