use super::accumulator::Accumulator;
use crate::error::{EngineError, Result};
use crate::models::aggregate::{AggregationType, Bucket, Interval, TimeSeries, TimeSeriesSummary};
use crate::models::record::{validate_fields, Record};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeMap;

/// Period key and first day of the period containing `date`.
pub fn period_key(date: NaiveDate, interval: Interval) -> (String, NaiveDate) {
    match interval {
        Interval::Day => (date.format("%Y-%m-%d").to_string(), date),
        Interval::Week => {
            let iso = date.iso_week();
            let anchor =
                NaiveDate::from_isoywd_opt(iso.year(), iso.week(), Weekday::Mon).unwrap_or(date);
            (format!("{:04}-W{:02}", iso.year(), iso.week()), anchor)
        }
        Interval::Month => {
            let anchor = date.with_day(1).unwrap_or(date);
            (date.format("%Y-%m").to_string(), anchor)
        }
        Interval::Quarter => {
            let quarter = (date.month() - 1) / 3 + 1;
            let first_month = (quarter - 1) * 3 + 1;
            let anchor = NaiveDate::from_ymd_opt(date.year(), first_month, 1).unwrap_or(date);
            (format!("{:04}-Q{quarter}", date.year()), anchor)
        }
        Interval::Year => {
            let anchor = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
            (format!("{:04}", date.year()), anchor)
        }
    }
}

/// Buckets records by calendar period. Records without a parseable date or
/// value are skipped; only periods holding at least one record are emitted.
pub fn aggregate_by_time(
    records: &[Record],
    interval: Interval,
    date_field: &str,
    value_field: &str,
    aggregation: AggregationType,
) -> Result<TimeSeries> {
    validate_fields(&[("date", date_field), ("value", value_field)])?;

    let mut periods: BTreeMap<String, (NaiveDate, Accumulator)> = BTreeMap::new();
    let mut overall = Accumulator::new();

    for record in records {
        let (Some(date), Some(value)) = (record.date(date_field), record.number(value_field)) else {
            continue;
        };
        let (key, anchor) = period_key(date, interval);
        periods
            .entry(key)
            .or_insert_with(|| (anchor, Accumulator::new()))
            .1
            .push(value);
        overall.push(value);
    }

    let data: Vec<Bucket> = periods
        .into_iter()
        .map(|(period_key, (anchor_date, acc))| Bucket {
            period_key,
            anchor_date,
            count: acc.count(),
            sum: acc.sum(),
            avg: acc.avg(),
            min: acc.min(),
            max: acc.max(),
            value: acc.value(aggregation),
        })
        .collect();

    let min_value = data.iter().map(|b| b.value).reduce(f64::min).unwrap_or(0.0);
    let max_value = data.iter().map(|b| b.value).reduce(f64::max).unwrap_or(0.0);
    let summary = TimeSeriesSummary {
        total_records: overall.count(),
        total_value: overall.value(aggregation),
        min_value,
        max_value,
        period_count: data.len(),
    };

    if !summary.total_value.is_finite() || data.iter().any(|b| !b.sum.is_finite()) {
        return Err(EngineError::computation("aggregate_by_time"));
    }

    Ok(TimeSeries {
        interval,
        aggregation,
        data,
        summary,
    })
}
