//! Row layout shared by the SQL-backed snapshot stores.
//!
//! `updated_at` is stored as unix microseconds; dates as `YYYY-MM-DD` text.

use crate::types::MedicineRecord;
use chrono::{DateTime, NaiveDate, Utc};

/// Column order used for every read and write.
pub(crate) const COLUMNS: [&str; 22] = [
    "yj_code",
    "drug_category",
    "therapeutic_category",
    "ingredient_name",
    "package_unit",
    "product_name",
    "manufacturer",
    "product_type",
    "is_basic_drug",
    "is_stable_supply_drug",
    "listing_date",
    "shipping_status",
    "status_update_date",
    "reason",
    "resolution_estimate",
    "resolution_or_discontinuation_date",
    "shipment_volume_status",
    "shipment_volume_improvement_date",
    "shipment_volume_improvement_amount",
    "other_info_update_date",
    "is_new",
    "updated_at",
];

/// Backend-neutral cell value; each store converts it to its own type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
}

impl SqlValue {
    fn into_text(self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn into_date(self) -> Option<NaiveDate> {
        self.into_text()
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
    }
}

pub(crate) fn schema_sql(table: &str) -> String {
    let columns = COLUMNS[1..COLUMNS.len() - 1]
        .iter()
        .map(|c| format!("{c} TEXT"))
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    yj_code TEXT PRIMARY KEY,
    {columns},
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{table}_updated_at ON {table} (updated_at);
CREATE TABLE IF NOT EXISTS snapshot_lease (
    name        TEXT PRIMARY KEY,
    holder      TEXT NOT NULL,
    expires_at  INTEGER NOT NULL
);
"#
    )
}

pub(crate) fn upsert_sql(table: &str) -> String {
    let placeholders = (1..=COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
        COLUMNS.join(", ")
    )
}

pub(crate) fn select_sql(table: &str) -> String {
    format!("SELECT {} FROM {table} ORDER BY yj_code", COLUMNS.join(", "))
}

pub(crate) const LEASE_SELECT_SQL: &str =
    "SELECT holder, expires_at FROM snapshot_lease WHERE name = ?1";
pub(crate) const LEASE_UPSERT_SQL: &str =
    "INSERT INTO snapshot_lease (name, holder, expires_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(name) DO UPDATE SET holder=excluded.holder, expires_at=excluded.expires_at";
pub(crate) const LEASE_DELETE_SQL: &str =
    "DELETE FROM snapshot_lease WHERE name = ?1 AND holder = ?2";

pub(crate) fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(
        micros.div_euclid(1_000_000),
        (micros.rem_euclid(1_000_000) * 1_000) as u32,
    )
}

fn text(v: &Option<String>) -> SqlValue {
    v.as_ref().map_or(SqlValue::Null, |s| SqlValue::Text(s.clone()))
}

fn date(v: &Option<NaiveDate>) -> SqlValue {
    v.map_or(SqlValue::Null, |d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
}

/// Values of `r` in [`COLUMNS`] order.
pub(crate) fn encode(r: &MedicineRecord) -> Vec<SqlValue> {
    vec![
        r.natural_key().map_or(SqlValue::Null, |k| SqlValue::Text(k.to_string())),
        text(&r.drug_category),
        text(&r.therapeutic_category),
        text(&r.ingredient_name),
        text(&r.package_unit),
        text(&r.product_name),
        text(&r.manufacturer),
        text(&r.product_type),
        text(&r.is_basic_drug),
        text(&r.is_stable_supply_drug),
        date(&r.listing_date),
        text(&r.shipping_status),
        date(&r.status_update_date),
        text(&r.reason),
        text(&r.resolution_estimate),
        text(&r.resolution_or_discontinuation_date),
        text(&r.shipment_volume_status),
        text(&r.shipment_volume_improvement_date),
        text(&r.shipment_volume_improvement_amount),
        date(&r.other_info_update_date),
        text(&r.is_new),
        r.updated_at
            .map_or(SqlValue::Null, |t| SqlValue::Integer(t.timestamp_micros())),
    ]
}

/// Inverse of [`encode`]; missing trailing values read as null.
pub(crate) fn decode(values: Vec<SqlValue>) -> MedicineRecord {
    let mut it = values.into_iter();
    let mut next = || it.next().unwrap_or(SqlValue::Null);
    MedicineRecord {
        yj_code: next().into_text(),
        drug_category: next().into_text(),
        therapeutic_category: next().into_text(),
        ingredient_name: next().into_text(),
        package_unit: next().into_text(),
        product_name: next().into_text(),
        manufacturer: next().into_text(),
        product_type: next().into_text(),
        is_basic_drug: next().into_text(),
        is_stable_supply_drug: next().into_text(),
        listing_date: next().into_date(),
        shipping_status: next().into_text(),
        status_update_date: next().into_date(),
        reason: next().into_text(),
        resolution_estimate: next().into_text(),
        resolution_or_discontinuation_date: next().into_text(),
        shipment_volume_status: next().into_text(),
        shipment_volume_improvement_date: next().into_text(),
        shipment_volume_improvement_amount: next().into_text(),
        other_info_update_date: next().into_date(),
        is_new: next().into_text(),
        updated_at: match next() {
            SqlValue::Integer(m) => from_micros(m),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_micros_keep_sign() {
        let t = from_micros(-1).unwrap();
        assert_eq!(t.timestamp_micros(), -1);
        assert_eq!(
            from_micros(1_700_000_000_123_456).unwrap().timestamp_micros(),
            1_700_000_000_123_456
        );
    }

    #[test]
    fn test_encode_uses_trimmed_key_and_text_dates() {
        let record = MedicineRecord {
            yj_code: Some(" 1141007F1063 ".into()),
            listing_date: NaiveDate::from_ymd_opt(1984, 11, 22),
            updated_at: from_micros(1_753_315_200_000_001),
            ..Default::default()
        };
        let values = encode(&record);
        assert_eq!(values.len(), COLUMNS.len());
        assert_eq!(values[0], SqlValue::Text("1141007F1063".into()));
        assert_eq!(values[10], SqlValue::Text("1984-11-22".into()));
        assert_eq!(values[21], SqlValue::Integer(1_753_315_200_000_001));

        let back = decode(values);
        assert_eq!(back.natural_key(), Some("1141007F1063"));
        assert_eq!(back.listing_date, record.listing_date);
        assert_eq!(back.updated_at, record.updated_at);
    }

    #[test]
    fn test_short_rows_decode_as_null() {
        let record = decode(vec![SqlValue::Text("K".into())]);
        assert_eq!(record.natural_key(), Some("K"));
        assert_eq!(record.updated_at, None);
    }
}
