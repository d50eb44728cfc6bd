use super::aggregate::Bucket;
use super::record::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicate applied to one field. `None`/empty operands make the filter a pass-through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", content = "value", rename_all = "snake_case")]
pub enum FilterOp {
    Equals(Value),
    /// Case-insensitive substring.
    Contains(String),
    /// Case-insensitive prefix.
    StartsWith(String),
    GreaterThan(Option<f64>),
    LessThan(Option<f64>),
    /// Inclusive on both bounds.
    Between { min: Option<f64>, max: Option<f64> },
    /// Inclusive on both bounds.
    DateRange {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
}

impl FieldFilter {
    pub fn new(field: &str, op: FilterOp) -> Self {
        Self {
            field: field.to_string(),
            op,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// `field: None` sorts by the collection's date field, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: Option<String>,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: usize,
    pub page_size: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub total_records: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub data: Vec<Record>,
    pub pagination: Pagination,
}

/// Filters for the transactions topic. Missing dates widen the fetch to all time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionFilters {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub conditions: Vec<FieldFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub sort: SortSpec,
    pub page: usize,
    /// Falls back to the configured default page size.
    pub page_size: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            sort: SortSpec::default(),
            page: 1,
            page_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPerformance {
    pub query_time_ms: f64,
    pub cached: bool,
    pub records_processed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionHistory {
    pub data: Vec<Record>,
    pub pagination: Pagination,
    pub performance: QueryPerformance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub count: usize,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionStatistics {
    pub total_count: usize,
    pub total_amount: f64,
    pub average_amount: f64,
    pub distinct_members: usize,
    pub by_category: Vec<CategoryTotal>,
    pub by_day: Vec<Bucket>,
    pub by_month: Vec<Bucket>,
}
