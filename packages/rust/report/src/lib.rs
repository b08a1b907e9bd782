//! Report views and their spreadsheet form.
//!
//! - [`View`], [`Table`], [`Series`]: named sheets produced by a report source
//! - [`Labels`]: localized column headers
//! - [`write_workbook`] / [`read_sheets`]: in-memory xlsx
//! - [`CostTable`]: per-item costs from an uploaded sheet

pub mod costs;
pub mod labels;
pub mod sheet;
pub mod workbook;

pub use costs::CostTable;
pub use labels::{Dictionary, Labels};
pub use sheet::{Series, Table, View, as_number, number};
pub use workbook::{SheetContents, read_sheets, sanitize_sheet_name, write_workbook};
