use crate::models::query::{FieldFilter, FilterOp, Page, Pagination, SortDirection, SortSpec};
use crate::models::record::{parse_date, parse_number, Record};
use chrono::NaiveDate;
use serde_json::Value;
use std::cmp::Ordering;

pub const MAX_PAGE_SIZE: usize = 100;

/// Whether `record` passes one filter. Filters without an operand always pass.
pub fn matches(record: &Record, filter: &FieldFilter) -> bool {
    let field = filter.field.as_str();
    match &filter.op {
        FilterOp::Equals(expected) => match expected {
            Value::Null => true,
            Value::String(s) if s.trim().is_empty() => true,
            Value::String(s) => record.text(field).is_some_and(|actual| actual == *s),
            Value::Number(_) => match (record.number(field), parse_number(expected)) {
                (Some(actual), Some(expected)) => actual == expected,
                _ => false,
            },
            other => record.get(field) == Some(other),
        },
        FilterOp::Contains(needle) => {
            needle.is_empty()
                || record
                    .text(field)
                    .is_some_and(|hay| hay.to_lowercase().contains(&needle.to_lowercase()))
        }
        FilterOp::StartsWith(prefix) => {
            prefix.is_empty()
                || record
                    .text(field)
                    .is_some_and(|hay| hay.to_lowercase().starts_with(&prefix.to_lowercase()))
        }
        FilterOp::GreaterThan(bound) => match bound {
            None => true,
            Some(bound) => record.number(field).is_some_and(|v| v > *bound),
        },
        FilterOp::LessThan(bound) => match bound {
            None => true,
            Some(bound) => record.number(field).is_some_and(|v| v < *bound),
        },
        FilterOp::Between { min, max } => {
            if min.is_none() && max.is_none() {
                return true;
            }
            record.number(field).is_some_and(|v| {
                min.map_or(true, |min| v >= min) && max.map_or(true, |max| v <= max)
            })
        }
        FilterOp::DateRange { start, end } => {
            if start.is_none() && end.is_none() {
                return true;
            }
            record.date(field).is_some_and(|d| {
                start.map_or(true, |start| d >= start) && end.map_or(true, |end| d <= end)
            })
        }
    }
}

pub fn filter_records(records: &[Record], filters: &[FieldFilter]) -> Vec<Record> {
    records
        .iter()
        .filter(|record| filters.iter().all(|filter| matches(record, filter)))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SortKind {
    Numeric,
    Date,
    Text,
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortKey {
    Numeric(f64),
    Date(NaiveDate),
    Text(String),
}

/// Comparison mode is picked from the first non-null value seen in the field.
fn detect_kind(records: &[Record], field: &str) -> SortKind {
    match records.iter().find_map(|record| record.get(field)) {
        Some(Value::Number(_)) => SortKind::Numeric,
        Some(value @ Value::String(_)) if parse_date(value).is_some() => SortKind::Date,
        _ => SortKind::Text,
    }
}

fn sort_key(record: &Record, field: &str, kind: SortKind) -> Option<SortKey> {
    match kind {
        SortKind::Numeric => record.number(field).map(SortKey::Numeric),
        SortKind::Date => record.date(field).map(SortKey::Date),
        SortKind::Text => record.text(field).map(|t| SortKey::Text(t.to_lowercase())),
    }
}

/// Stable sort. With no field, orders by `default_date_field`, newest first.
/// Records lacking a comparable value go last regardless of direction.
pub fn sort_records(
    records: Vec<Record>,
    sort: &SortSpec,
    default_date_field: &str,
) -> Vec<Record> {
    let (field, direction) = match sort.field.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(field) => (field, sort.direction),
        None => (default_date_field, SortDirection::Desc),
    };
    let kind = detect_kind(&records, field);

    let mut keyed: Vec<(Option<SortKey>, Record)> = records
        .into_iter()
        .map(|record| (sort_key(&record, field, kind), record))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => {
            let ordering = a.partial_cmp(b).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    keyed.into_iter().map(|(_, record)| record).collect()
}

/// Filter then sort into a fresh collection; `records` is left untouched.
pub fn filter_and_sort(
    records: &[Record],
    filters: &[FieldFilter],
    sort: &SortSpec,
    default_date_field: &str,
) -> Vec<Record> {
    sort_records(filter_records(records, filters), sort, default_date_field)
}

/// Page bounds for `total` records. `page_size` is clamped to [1, 100] and
/// `page` to [1, last page].
pub fn page_bounds(total: usize, page: usize, page_size: usize) -> Pagination {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let total_pages = total.div_ceil(page_size);
    let current_page = page.max(1).min(total_pages.max(1));
    let start_index = ((current_page - 1) * page_size).min(total);
    let end_index = (start_index + page_size).min(total);

    Pagination {
        current_page,
        page_size,
        start_index,
        end_index,
        has_next_page: current_page < total_pages,
        has_previous_page: current_page > 1,
        total_records: total,
        total_pages,
    }
}

pub fn paginate(records: &[Record], page: usize, page_size: usize) -> Page {
    let pagination = page_bounds(records.len(), page, page_size);
    Page {
        data: records[pagination.start_index..pagination.end_index].to_vec(),
        pagination,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(id: u32, date: &str, amount: f64, description: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("transaction_date", date)
            .with("amount", amount)
            .with("description", description)
    }

    fn sample() -> Vec<Record> {
        vec![
            tx(1, "2024-01-03", 150.0, "Rice purchase"),
            tx(2, "2024-01-01", 75.5, "Cooking oil"),
            tx(3, "2024-01-05", 300.0, "rice bulk order"),
            tx(4, "2024-01-02", 20.0, "Sugar"),
            tx(5, "2024-01-04", 150.0, "Fertilizer"),
        ]
    }

    fn ids(records: &[Record]) -> Vec<f64> {
        records.iter().filter_map(|r| r.number("id")).collect()
    }

    #[test]
    fn contains_is_case_insensitive() {
        let filters = vec![FieldFilter::new("description", FilterOp::Contains("RICE".into()))];
        assert_eq!(ids(&filter_records(&sample(), &filters)), vec![1.0, 3.0]);
    }

    #[test]
    fn starts_with_and_equals() {
        let records = sample();
        let prefix = vec![FieldFilter::new("description", FilterOp::StartsWith("ri".into()))];
        assert_eq!(ids(&filter_records(&records, &prefix)), vec![1.0, 3.0]);

        let equals = vec![FieldFilter::new("amount", FilterOp::Equals(json!(150)))];
        assert_eq!(ids(&filter_records(&records, &equals)), vec![1.0, 5.0]);

        let text = vec![FieldFilter::new("description", FilterOp::Equals(json!("Sugar")))];
        assert_eq!(ids(&filter_records(&records, &text)), vec![4.0]);
    }

    #[test]
    fn numeric_and_date_ranges() {
        let records = sample();
        let filters = vec![
            FieldFilter::new("amount", FilterOp::Between { min: Some(75.5), max: Some(150.0) }),
            FieldFilter::new(
                "transaction_date",
                FilterOp::DateRange {
                    start: NaiveDate::from_ymd_opt(2024, 1, 2),
                    end: None,
                },
            ),
        ];
        assert_eq!(ids(&filter_records(&records, &filters)), vec![1.0, 5.0]);

        let gt = vec![FieldFilter::new("amount", FilterOp::GreaterThan(Some(150.0)))];
        assert_eq!(ids(&filter_records(&records, &gt)), vec![3.0]);
        let lt = vec![FieldFilter::new("amount", FilterOp::LessThan(Some(75.5)))];
        assert_eq!(ids(&filter_records(&records, &lt)), vec![4.0]);
    }

    #[test]
    fn empty_filters_pass_through() {
        let filters = vec![
            FieldFilter::new("description", FilterOp::Contains(String::new())),
            FieldFilter::new("amount", FilterOp::GreaterThan(None)),
            FieldFilter::new("status", FilterOp::Equals(Value::Null)),
            FieldFilter::new("status", FilterOp::Equals(json!(""))),
            FieldFilter::new("transaction_date", FilterOp::DateRange { start: None, end: None }),
            FieldFilter::new("amount", FilterOp::Between { min: None, max: None }),
        ];
        assert_eq!(filter_records(&sample(), &filters).len(), 5);
    }

    #[test]
    fn default_sort_is_date_descending() {
        let sorted = sort_records(sample(), &SortSpec::default(), "transaction_date");
        assert_eq!(ids(&sorted), vec![3.0, 5.0, 1.0, 4.0, 2.0]);
    }

    #[test]
    fn numeric_sort_is_stable() {
        let spec = SortSpec {
            field: Some("amount".into()),
            direction: SortDirection::Asc,
        };
        let sorted = sort_records(sample(), &spec, "transaction_date");
        assert_eq!(ids(&sorted), vec![4.0, 2.0, 1.0, 5.0, 3.0]);

        let desc = SortSpec {
            field: Some("amount".into()),
            direction: SortDirection::Desc,
        };
        // Ties keep input order in both directions.
        let sorted = sort_records(sample(), &desc, "transaction_date");
        assert_eq!(ids(&sorted), vec![3.0, 1.0, 5.0, 2.0, 4.0]);
    }

    #[test]
    fn text_sort_ignores_case_and_puts_missing_last() {
        let mut records = sample();
        records.push(Record::new().with("id", 6));
        let spec = SortSpec {
            field: Some("description".into()),
            direction: SortDirection::Asc,
        };
        let sorted = sort_records(records, &spec, "transaction_date");
        assert_eq!(ids(&sorted), vec![2.0, 5.0, 3.0, 1.0, 4.0, 6.0]);
    }

    #[test]
    fn filter_and_sort_leaves_input_untouched() {
        let records = sample();
        let before = records.clone();
        let filters = vec![FieldFilter::new("amount", FilterOp::GreaterThan(Some(50.0)))];
        let _ = filter_and_sort(&records, &filters, &SortSpec::default(), "transaction_date");
        assert_eq!(records, before);
    }

    #[test]
    fn pagination_bounds() {
        let p = page_bounds(45, 2, 20);
        assert_eq!(p.current_page, 2);
        assert_eq!((p.start_index, p.end_index), (20, 40));
        assert!(p.has_next_page && p.has_previous_page);
        assert_eq!(p.total_pages, 3);

        let last = page_bounds(45, 9, 20);
        assert_eq!(last.current_page, 3);
        assert_eq!((last.start_index, last.end_index), (40, 45));
        assert!(!last.has_next_page);

        assert_eq!(page_bounds(10, 1, 0).page_size, 1);
        assert_eq!(page_bounds(10, 1, 5000).page_size, MAX_PAGE_SIZE);

        let empty = page_bounds(0, 0, 10);
        assert_eq!(empty.current_page, 1);
        assert_eq!(empty.total_pages, 0);
        assert_eq!((empty.start_index, empty.end_index), (0, 0));
        assert!(!empty.has_next_page && !empty.has_previous_page);
    }

    #[test]
    fn pages_concatenate_to_whole_collection() {
        let records: Vec<Record> = (0..37)
            .map(|i| tx(i, &format!("2024-02-{:02}", i % 28 + 1), f64::from(i), "x"))
            .collect();
        let sorted = filter_and_sort(&records, &[], &SortSpec::default(), "transaction_date");

        let first = paginate(&sorted, 1, 8);
        let mut rebuilt = Vec::new();
        for page in 1..=first.pagination.total_pages {
            rebuilt.extend(paginate(&sorted, page, 8).data);
        }
        assert_eq!(rebuilt, sorted);
    }
}
