//! Row translation: source labels to canonical record fields.
//!
//! The mapping is a fixed table of `(label, field, coercion)` entries. It is
//! checked once per decoded sheet against the labels the sheet declares
//! (see [`check_labels`]) and then applied to every row without further
//! lookups by name.

use crate::constants::*;
use crate::types::{Cell, MedicineRecord, RawRow};
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Text field of [`MedicineRecord`] a column fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    DrugCategory,
    TherapeuticCategory,
    IngredientName,
    PackageUnit,
    ProductName,
    Manufacturer,
    ProductType,
    IsBasicDrug,
    IsStableSupplyDrug,
    ShippingStatus,
    Reason,
    ResolutionEstimate,
    ResolutionOrDiscontinuationDate,
    ShipmentVolumeStatus,
    ShipmentVolumeImprovementDate,
    ShipmentVolumeImprovementAmount,
    IsNew,
}

/// Date field of [`MedicineRecord`] a column fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    ListingDate,
    StatusUpdateDate,
    OtherInfoUpdateDate,
}

/// How a cell is coerced, and where the result lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Free text; blank becomes null.
    Text(TextField),
    /// Natural key `yj_code`; trimmed, blank becomes null.
    Key,
    /// Calendar date via [`normalize_date`].
    Date(DateField),
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub label: &'static str,
    /// Other wordings of the same column seen in published workbooks.
    pub aliases: &'static [&'static str],
    pub coercion: Coercion,
}

impl ColumnSpec {
    pub fn matches(&self, label: &str) -> bool {
        self.label == label || self.aliases.iter().any(|a| *a == label)
    }

    fn cell<'a>(&self, row: &'a RawRow) -> Option<&'a Cell> {
        row.get(self.label)
            .or_else(|| self.aliases.iter().find_map(|a| row.get(a)))
    }
}

const fn col(label: &'static str, coercion: Coercion) -> ColumnSpec {
    ColumnSpec {
        label,
        aliases: &[],
        coercion,
    }
}

const fn text(label: &'static str, field: TextField) -> ColumnSpec {
    col(label, Coercion::Text(field))
}

const fn date(label: &'static str, field: DateField) -> ColumnSpec {
    col(label, Coercion::Date(field))
}

pub const COLUMNS: [ColumnSpec; 21] = [
    text(LABEL_DRUG_CATEGORY, TextField::DrugCategory),
    text(LABEL_THERAPEUTIC_CATEGORY, TextField::TherapeuticCategory),
    text(LABEL_INGREDIENT_NAME, TextField::IngredientName),
    text(LABEL_PACKAGE_UNIT, TextField::PackageUnit),
    col(LABEL_YJ_CODE, Coercion::Key),
    text(LABEL_PRODUCT_NAME, TextField::ProductName),
    text(LABEL_MANUFACTURER, TextField::Manufacturer),
    text(LABEL_PRODUCT_TYPE, TextField::ProductType),
    text(LABEL_IS_BASIC_DRUG, TextField::IsBasicDrug),
    text(LABEL_IS_STABLE_SUPPLY_DRUG, TextField::IsStableSupplyDrug),
    date(LABEL_LISTING_DATE, DateField::ListingDate),
    text(LABEL_SHIPPING_STATUS, TextField::ShippingStatus),
    date(LABEL_STATUS_UPDATE_DATE, DateField::StatusUpdateDate),
    text(LABEL_REASON, TextField::Reason),
    text(LABEL_RESOLUTION_ESTIMATE, TextField::ResolutionEstimate),
    text(
        LABEL_RESOLUTION_OR_DISCONTINUATION_DATE,
        TextField::ResolutionOrDiscontinuationDate,
    ),
    text(LABEL_SHIPMENT_VOLUME_STATUS, TextField::ShipmentVolumeStatus),
    text(
        LABEL_SHIPMENT_VOLUME_IMPROVEMENT_DATE,
        TextField::ShipmentVolumeImprovementDate,
    ),
    text(
        LABEL_SHIPMENT_VOLUME_IMPROVEMENT_AMOUNT,
        TextField::ShipmentVolumeImprovementAmount,
    ),
    date(LABEL_OTHER_INFO_UPDATE_DATE, DateField::OtherInfoUpdateDate),
    ColumnSpec {
        label: LABEL_IS_NEW,
        aliases: &[LABEL_IS_NEW_SHORT],
        coercion: Coercion::Text(TextField::IsNew),
    },
];

/// Result of matching the column table against a sheet's labels.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LabelCheck {
    /// Table labels the sheet does not carry.
    pub missing: Vec<&'static str>,
    /// Non-empty sheet labels the table does not know.
    pub unmapped: Vec<String>,
}

impl LabelCheck {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn key_missing(&self) -> bool {
        self.missing.contains(&LABEL_YJ_CODE)
    }
}

pub fn check_labels(labels: &[String]) -> LabelCheck {
    let missing = COLUMNS
        .iter()
        .filter(|c| !labels.iter().any(|l| c.matches(l)))
        .map(|c| c.label)
        .collect();
    let unmapped = labels
        .iter()
        .filter(|l| !l.trim().is_empty())
        .filter(|l| !COLUMNS.iter().any(|c| c.matches(l)))
        .cloned()
        .collect();
    LabelCheck { missing, unmapped }
}

/// Translate one raw row. Never fails: unknown or absent labels yield null.
pub fn translate(row: &RawRow) -> MedicineRecord {
    let mut record = MedicineRecord::default();
    for column in &COLUMNS {
        let cell = column.cell(row).unwrap_or(&Cell::Null);
        match column.coercion {
            Coercion::Text(field) => *text_slot(&mut record, field) = text_or_null(cell),
            Coercion::Key => record.yj_code = text_or_null(cell).map(|s| s.trim().to_string()),
            Coercion::Date(field) => *date_slot(&mut record, field) = normalize_date(cell),
        }
    }
    record
}

fn text_slot(record: &mut MedicineRecord, field: TextField) -> &mut Option<String> {
    match field {
        TextField::DrugCategory => &mut record.drug_category,
        TextField::TherapeuticCategory => &mut record.therapeutic_category,
        TextField::IngredientName => &mut record.ingredient_name,
        TextField::PackageUnit => &mut record.package_unit,
        TextField::ProductName => &mut record.product_name,
        TextField::Manufacturer => &mut record.manufacturer,
        TextField::ProductType => &mut record.product_type,
        TextField::IsBasicDrug => &mut record.is_basic_drug,
        TextField::IsStableSupplyDrug => &mut record.is_stable_supply_drug,
        TextField::ShippingStatus => &mut record.shipping_status,
        TextField::Reason => &mut record.reason,
        TextField::ResolutionEstimate => &mut record.resolution_estimate,
        TextField::ResolutionOrDiscontinuationDate => &mut record.resolution_or_discontinuation_date,
        TextField::ShipmentVolumeStatus => &mut record.shipment_volume_status,
        TextField::ShipmentVolumeImprovementDate => &mut record.shipment_volume_improvement_date,
        TextField::ShipmentVolumeImprovementAmount => &mut record.shipment_volume_improvement_amount,
        TextField::IsNew => &mut record.is_new,
    }
}

fn date_slot(record: &mut MedicineRecord, field: DateField) -> &mut Option<NaiveDate> {
    match field {
        DateField::ListingDate => &mut record.listing_date,
        DateField::StatusUpdateDate => &mut record.status_update_date,
        DateField::OtherInfoUpdateDate => &mut record.other_info_update_date,
    }
}

/// Render a cell as text; blank cells become `None`.
fn text_or_null(cell: &Cell) -> Option<String> {
    match cell {
        c if c.is_blank() => None,
        Cell::Null => None,
        Cell::Text(s) => Some(s.clone()),
        Cell::Number(n) => Some(format_number(*n)),
        Cell::Date(dt) => Some(dt.date().format("%Y-%m-%d").to_string()),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

const TEXT_DATE_FORMATS: [&str; 5] = ["%Y/%m/%d", "%Y-%m-%d", "%Y.%m.%d", "%Y年%m月%d日", "%Y%m%d"];
const TEXT_DATETIME_FORMATS: [&str; 4] = [
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Normalize a date cell to a date-only value.
///
/// Null, blank, sentinel tokens and unparseable values all yield `None`.
pub fn normalize_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Null => None,
        Cell::Date(dt) => Some(dt.date()),
        Cell::Number(n) => from_serial(*n),
        Cell::Text(s) => parse_date_text(s),
    }
}

/// Text form of [`normalize_date`].
pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() || DATE_SENTINELS.contains(&s) {
        return None;
    }
    TEXT_DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            TEXT_DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Spreadsheet serial day number (1900 date system) to a date.
fn from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial >= 2_958_466.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}
