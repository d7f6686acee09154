#![allow(dead_code)]

use medsupply::app::ports::{ObservabilitySink, SourcePayload, SourcePort, StoreConnector};
use medsupply::error::{IngestError, RunError};
use medsupply::pipeline::snapshot::SnapshotWriter;
use medsupply::pipeline::translate::COLUMNS;
use medsupply::pipeline::{Pipeline, RunReport};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A cell in a fixture sheet.
#[derive(Debug, Clone)]
pub enum V {
    T(&'static str),
    N(f64),
    Empty,
}

fn col_name(mut i: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (i % 26) as u8);
        if i < 26 {
            break;
        }
        i = i / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap()
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        // Excel writes carriage returns as an escaped code unit.
        .replace('\r', "_x000D_")
}

fn sheet_xml(rows: &[Vec<V>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            let at = format!("{}{}", col_name(c), r + 1);
            match cell {
                V::T(s) => xml.push_str(&format!(
                    r#"<c r="{at}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    escape(s)
                )),
                V::N(n) => xml.push_str(&format!(r#"<c r="{at}"><v>{n}</v></c>"#)),
                V::Empty => {}
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Assemble a single-sheet `.xlsx` from rows of cells.
pub fn xlsx(rows: &[Vec<V>]) -> Vec<u8> {
    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="出荷状況" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
        ),
        ("xl/worksheets/sheet1.xml", sheet_xml(rows)),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, body) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A data row with the given label/value pairs; every other column empty.
pub fn row(labels: &[&'static str], cells: &[(&'static str, V)]) -> Vec<V> {
    labels
        .iter()
        .map(|label| {
            cells
                .iter()
                .find(|(l, _)| l == label)
                .map(|(_, v)| v.clone())
                .unwrap_or(V::Empty)
        })
        .collect()
}

/// Title row, label row with every known column, then `data`.
pub fn standard_workbook(data: Vec<Vec<V>>) -> Vec<u8> {
    workbook_with_labels(&all_labels(), data)
}

pub fn workbook_with_labels(labels: &[&'static str], data: Vec<Vec<V>>) -> Vec<u8> {
    let mut rows = vec![
        vec![V::T("医療用医薬品供給状況データベース")],
        labels.iter().map(|l| V::T(*l)).collect(),
    ];
    rows.extend(data);
    xlsx(&rows)
}

pub fn all_labels() -> Vec<&'static str> {
    COLUMNS.iter().map(|c| c.label).collect()
}

/// Counts what the pipeline reports.
#[derive(Default)]
pub struct RecordingSink {
    pub runs: Mutex<Vec<RunReport>>,
    pub failures: Mutex<Vec<String>>,
}

impl ObservabilitySink for RecordingSink {
    fn record_run(&self, report: &RunReport) {
        self.runs.lock().unwrap().push(report.clone());
    }

    fn record_failure(&self, _report: &RunReport, error: &RunError) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

/// Serves fixed bytes for any date.
pub struct StaticSource(pub Vec<u8>);

#[async_trait]
impl SourcePort for StaticSource {
    fn name_for(&self, target: NaiveDate) -> String {
        medsupply::calendar::file_name(target, "iyakuhinkyoukyu.xlsx")
    }

    async fn fetch(&self, target: NaiveDate) -> Result<SourcePayload, IngestError> {
        Ok(SourcePayload::new(self.name_for(target), self.0.clone()))
    }
}

pub fn pipeline(
    bytes: Vec<u8>,
    connector: Arc<dyn StoreConnector>,
    sink: Arc<RecordingSink>,
    holder: &str,
) -> Pipeline {
    Pipeline::new(
        Arc::new(StaticSource(bytes)),
        connector,
        sink,
        SnapshotWriter::new(2, Duration::minutes(15), holder),
        1,
    )
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 24).unwrap()
}
