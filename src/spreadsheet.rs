//! Spreadsheet-to-text conversion.
//!
//! The spreadsheet provider publishes its weekly schedule as an `.xlsx`
//! workbook. The extraction model takes text, not workbooks, so this module
//! dumps the relevant worksheet into delimited lines. Date cells are kept as
//! their raw serial numbers; the normalizer owns the 1899-12-30 epoch
//! conversion, whichever path a serial reaches it through.
//!
//! Decoding is CPU-bound; callers run it inside `spawn_blocking`.

use crate::error::ScrapeError;
use calamine::{Data, Reader, Xlsx};
use std::io::Cursor;
use tracing::debug;

/// The worksheet carrying the public schedule.
pub const SHEET_NAME: &str = "Publicacion Externa";

/// Dump the schedule worksheet of an `.xlsx` workbook into delimited text.
///
/// # Errors
///
/// An unreadable workbook or a workbook without the expected worksheet is
/// [`ScrapeError::Extraction`] — fatal for the provider's run.
pub fn worksheet_to_table(bytes: &[u8]) -> Result<String, ScrapeError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ScrapeError::Extraction(format!("unreadable workbook: {e}")))?;
    let range = workbook
        .worksheet_range(SHEET_NAME)
        .map_err(|e| ScrapeError::Extraction(format!("worksheet '{SHEET_NAME}' not found: {e}")))?;

    let mut table = String::new();
    for row in range.rows() {
        let line = row
            .iter()
            .map(|cell| quote_field(&cell_text(cell)))
            .collect::<Vec<_>>()
            .join(",");
        table.push_str(&line);
        table.push('\n');
    }

    debug!(rows = range.height(), "Converted worksheet to table text");
    Ok(table)
}

/// Render one cell as text.
///
/// Whole-number floats and date serials print without a fractional part so
/// they survive as integers all the way to the serial-date detection.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            if serial.fract() == 0.0 {
                format!("{}", serial as i64)
            } else {
                serial.to_string()
            }
        }
        other => other.to_string(),
    }
}

/// Quote a field if it would break the comma-delimited line.
fn quote_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text_keeps_serials_integral() {
        assert_eq!(cell_text(&Data::Float(45000.0)), "45000");
        assert_eq!(cell_text(&Data::Float(45000.5)), "45000.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("Santiago".to_string())), "Santiago");
    }

    #[test]
    fn test_quote_field() {
        assert_eq!(quote_field("Centro"), "Centro");
        assert_eq!(quote_field("Boreal, La Ureña"), "\"Boreal, La Ureña\"");
        assert_eq!(quote_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
