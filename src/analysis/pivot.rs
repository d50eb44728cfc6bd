use super::accumulator::Accumulator;
use crate::error::{EngineError, Result};
use crate::models::aggregate::AggregationType;
use crate::models::pivot::{PivotTable, UNKNOWN_KEY};
use crate::models::record::{validate_fields, Record};
use std::collections::BTreeMap;

/// Cross-tabulate `records` by two fields.
///
/// Cells, row totals, column totals and the grand total are each aggregated
/// from the underlying values, never from other aggregates, so `avg`/`min`/`max`
/// totals stay meaningful.
pub fn create_pivot(
    records: &[Record],
    row_field: &str,
    column_field: &str,
    value_field: &str,
    aggregation: AggregationType,
) -> Result<PivotTable> {
    validate_fields(&[
        ("row", row_field),
        ("column", column_field),
        ("value", value_field),
    ])?;

    let mut cells: BTreeMap<String, BTreeMap<String, Accumulator>> = BTreeMap::new();
    let mut rows: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut columns: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut grand = Accumulator::new();

    for record in records {
        let row = record.text(row_field).unwrap_or_else(|| UNKNOWN_KEY.to_string());
        let column = record.text(column_field).unwrap_or_else(|| UNKNOWN_KEY.to_string());
        let value = record.number(value_field);

        cells
            .entry(row.clone())
            .or_default()
            .entry(column.clone())
            .or_default()
            .push_record(value);
        rows.entry(row).or_default().push_record(value);
        columns.entry(column).or_default().push_record(value);
        grand.push_record(value);
    }

    let table = PivotTable {
        row_field: row_field.to_string(),
        column_field: column_field.to_string(),
        value_field: value_field.to_string(),
        aggregation,
        rows: rows.keys().cloned().collect(),
        columns: columns.keys().cloned().collect(),
        cells: cells
            .into_iter()
            .map(|(row, cols)| {
                let values = cols
                    .into_iter()
                    .map(|(col, acc)| (col, acc.value(aggregation)))
                    .collect();
                (row, values)
            })
            .collect(),
        row_totals: rows
            .into_iter()
            .map(|(key, acc)| (key, acc.value(aggregation)))
            .collect(),
        column_totals: columns
            .into_iter()
            .map(|(key, acc)| (key, acc.value(aggregation)))
            .collect(),
        grand_total: grand.value(aggregation),
    };

    if !table.grand_total.is_finite() {
        return Err(EngineError::computation("create_pivot"));
    }

    Ok(table)
}
