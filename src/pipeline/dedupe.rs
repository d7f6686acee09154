use crate::types::MedicineRecord;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Collapse records sharing a natural key; the last one in row order wins.
///
/// Each key keeps the output position of its first occurrence. Returns the
/// surviving records and the number of keys that had at least one duplicate.
/// Records without a key are passed through untouched.
pub fn dedupe(records: Vec<MedicineRecord>) -> (Vec<MedicineRecord>, usize) {
    let mut out: Vec<MedicineRecord> = Vec::with_capacity(records.len());
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut conflicted: HashSet<String> = HashSet::new();

    for record in records {
        let Some(key) = record.natural_key().map(str::to_string) else {
            out.push(record);
            continue;
        };
        match slots.get(&key) {
            Some(&slot) => {
                debug!(yj_code = %key, "duplicate key, later row replaces earlier");
                out[slot] = record;
                conflicted.insert(key);
            }
            None => {
                slots.insert(key, out.len());
                out.push(record);
            }
        }
    }

    (out, conflicted.len())
}
