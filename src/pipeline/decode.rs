use crate::error::DecodeError;
use crate::types::{Cell, RawRow};
use calamine::{Data, Reader, Xlsx};
use chrono::NaiveDateTime;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Rows of the first sheet, keyed by the labels found on the label row.
#[derive(Debug)]
pub struct DecodedSheet {
    pub sheet_name: String,
    pub labels: Arc<Vec<String>>,
    pub rows: Vec<RawRow>,
}

/// Decode workbook bytes into raw rows.
///
/// `header_offset` rows at the top of the sheet are skipped; the row right
/// after them carries the column labels and every following row is data.
#[instrument(skip(bytes), fields(bytes = bytes.len()))]
pub fn decode(bytes: &[u8], header_offset: usize) -> Result<DecodedSheet, DecodeError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(DecodeError::NoSheet)?;
    let range = workbook.worksheet_range(&sheet_name)?;

    // The range starts at the first non-empty cell, not at A1.
    let first_row = match range.start() {
        Some((row, _)) => row as usize,
        None => return Err(DecodeError::MissingHeaderRow { offset: header_offset }),
    };
    if first_row > header_offset {
        return Err(DecodeError::MissingHeaderRow { offset: header_offset });
    }

    let mut labels: Option<Arc<Vec<String>>> = None;
    let mut rows = Vec::new();
    for (i, cells) in range.rows().enumerate() {
        let absolute = first_row + i;
        if absolute < header_offset {
            continue;
        }
        match &labels {
            None => {
                let found: Vec<String> = cells.iter().map(label_text).collect();
                debug!(labels = ?found, "label row");
                labels = Some(Arc::new(found));
            }
            Some(l) => {
                let values = cells.iter().map(to_cell).collect();
                rows.push(RawRow::new(Arc::clone(l), values));
            }
        }
    }

    let labels = labels.ok_or(DecodeError::MissingHeaderRow { offset: header_offset })?;
    debug!(sheet = %sheet_name, rows = rows.len(), "decoded sheet");
    Ok(DecodedSheet {
        sheet_name,
        labels,
        rows,
    })
}

/// Carriage returns survive as an escaped code unit in the sheet XML.
fn unescape(s: &str) -> String {
    s.replace("_x000D_", "\r")
}

fn label_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => unescape(s),
        other => other.to_string(),
    }
}

fn to_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => Cell::Null,
        Data::String(s) => Cell::Text(unescape(s)),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::Date(naive),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(Cell::Date)
            .unwrap_or_else(|_| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}
