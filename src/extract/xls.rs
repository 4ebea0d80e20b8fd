//! Legacy Excel (BIFF `.xls`) extraction through `calamine`.
//!
//! Output matches the XLSX reader: one `--- Sheet: <name> ---` block of CSV
//! per non-empty sheet, in workbook order.

use calamine::{Data, Range, Reader, Xls};
use std::io::Cursor;

use super::ooxml::csv_escape;
use super::ExtractError;

const XLS_MAX_SHEETS: usize = 100;

pub fn extract_xls(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut workbook: Xls<_> =
        Xls::new(Cursor::new(bytes)).map_err(|e| ExtractError::Xls(e.to_string()))?;

    let mut pieces = Vec::new();
    for name in workbook.sheet_names().into_iter().take(XLS_MAX_SHEETS) {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!(sheet = %name, error = %e, "skipping unreadable sheet");
                continue;
            }
        };
        let csv = range_to_csv(&range);
        if !csv.trim().is_empty() {
            pieces.push(format!("--- Sheet: {} ---\n{}", name, csv));
        }
    }
    Ok(pieces.join("\n\n"))
}

/// The range already covers only the used rectangle of the sheet.
fn range_to_csv(range: &Range<Data>) -> String {
    range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| csv_escape(&cell_text(cell)))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Bool(true) => "TRUE".to_string(),
        Data::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}
