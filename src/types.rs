use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl Cell {
    /// Null, or text made only of whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) | Cell::Date(_) => false,
        }
    }
}

/// One data row of the sheet, keyed by the sheet's column labels.
///
/// Every label of the sheet is present in every row; cells the workbook
/// omits are `Cell::Null`.
#[derive(Debug, Clone)]
pub struct RawRow {
    labels: Arc<Vec<String>>,
    values: Vec<Cell>,
}

impl RawRow {
    pub fn new(labels: Arc<Vec<String>>, mut values: Vec<Cell>) -> Self {
        values.resize(labels.len(), Cell::Null);
        Self { labels, values }
    }

    /// Convenience constructor for fixtures.
    pub fn from_pairs<I, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, Cell)>,
        L: Into<String>,
    {
        let (labels, values): (Vec<String>, Vec<Cell>) =
            pairs.into_iter().map(|(l, c)| (l.into(), c)).unzip();
        Self::new(Arc::new(labels), values)
    }

    pub fn get(&self, label: &str) -> Option<&Cell> {
        self.labels
            .iter()
            .position(|l| l == label)
            .and_then(|i| self.values.get(i))
    }
}

/// Canonical shipment-status record for one product, keyed by `yj_code`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicineRecord {
    pub drug_category: Option<String>,
    pub therapeutic_category: Option<String>,
    pub ingredient_name: Option<String>,
    pub package_unit: Option<String>,
    pub yj_code: Option<String>,
    pub product_name: Option<String>,
    pub manufacturer: Option<String>,
    pub product_type: Option<String>,
    pub is_basic_drug: Option<String>,
    pub is_stable_supply_drug: Option<String>,
    pub listing_date: Option<NaiveDate>,
    pub shipping_status: Option<String>,
    pub status_update_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub resolution_estimate: Option<String>,
    pub resolution_or_discontinuation_date: Option<String>,
    pub shipment_volume_status: Option<String>,
    pub shipment_volume_improvement_date: Option<String>,
    pub shipment_volume_improvement_amount: Option<String>,
    pub other_info_update_date: Option<NaiveDate>,
    pub is_new: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MedicineRecord {
    /// The natural key, if present and not blank.
    pub fn natural_key(&self) -> Option<&str> {
        self.yj_code
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// True when no translated field carries a value.
    pub fn is_blank(&self) -> bool {
        let texts = [
            &self.drug_category,
            &self.therapeutic_category,
            &self.ingredient_name,
            &self.package_unit,
            &self.yj_code,
            &self.product_name,
            &self.manufacturer,
            &self.product_type,
            &self.is_basic_drug,
            &self.is_stable_supply_drug,
            &self.shipping_status,
            &self.reason,
            &self.resolution_estimate,
            &self.resolution_or_discontinuation_date,
            &self.shipment_volume_status,
            &self.shipment_volume_improvement_date,
            &self.shipment_volume_improvement_amount,
            &self.is_new,
        ];
        let dates = [
            &self.listing_date,
            &self.status_update_date,
            &self.other_info_update_date,
        ];
        texts
            .iter()
            .all(|v| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            && dates.iter().all(|d| d.is_none())
    }

    /// Returns the record with its commit timestamp set.
    pub fn stamped(self, at: DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(at),
            ..self
        }
    }
}
