use super::aggregate::AggregationType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder key for records missing a row or column value.
pub const UNKNOWN_KEY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotTable {
    pub row_field: String,
    pub column_field: String,
    pub value_field: String,
    pub aggregation: AggregationType,
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    /// row key → column key → aggregated value. Absent pairs had no records.
    pub cells: BTreeMap<String, BTreeMap<String, f64>>,
    pub row_totals: BTreeMap<String, f64>,
    pub column_totals: BTreeMap<String, f64>,
    pub grand_total: f64,
}

impl PivotTable {
    pub fn cell(&self, row: &str, column: &str) -> Option<f64> {
        self.cells.get(row).and_then(|cols| cols.get(column)).copied()
    }
}
