use crate::models::aggregate::{CategoryAggregate, CategorySnapshot, StatusBreakdown};
use crate::models::pivot::UNKNOWN_KEY;
use crate::models::record::{Record, Topic};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashSet};

/// Fixed field layout and taxonomy for one domain record family.
#[derive(Debug, Clone, Copy)]
pub struct CategorySchema {
    pub topic: Topic,
    pub categories: &'static [&'static str],
    /// Bucket for unrecognized or missing category values.
    pub default_category: &'static str,
    pub category_field: &'static str,
    pub amount_field: &'static str,
    pub entity_field: &'static str,
    pub status_field: Option<&'static str>,
    /// Field and value marking an outflow. Matching amounts are counted as negative.
    pub outflow: Option<(&'static str, &'static str)>,
}

pub const SAVINGS_SCHEMA: CategorySchema = CategorySchema {
    topic: Topic::Savings,
    categories: &["principal", "mandatory", "voluntary"],
    default_category: "voluntary",
    category_field: "savings_type",
    amount_field: "amount",
    entity_field: "member_id",
    status_field: None,
    outflow: Some(("transaction_type", "withdrawal")),
};

pub const LOAN_SCHEMA: CategorySchema = CategorySchema {
    topic: Topic::Loans,
    categories: &["productive", "consumptive", "emergency"],
    default_category: "consumptive",
    category_field: "loan_type",
    amount_field: "amount",
    entity_field: "member_id",
    status_field: Some("status"),
    outflow: None,
};

impl CategorySchema {
    fn resolve(&self, raw: Option<String>) -> &'static str {
        raw.and_then(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            self.categories.iter().copied().find(|c| *c == normalized)
        })
        .unwrap_or(self.default_category)
    }

    fn signed_amount(&self, record: &Record, amount: f64) -> f64 {
        match self.outflow {
            Some((field, value))
                if record
                    .text(field)
                    .is_some_and(|kind| kind.trim().eq_ignore_ascii_case(value)) =>
            {
                -amount.abs()
            }
            _ => amount,
        }
    }
}

#[derive(Default)]
struct CategoryTally {
    total: f64,
    count: usize,
    entities: HashSet<String>,
}

/// Per-category totals for one period, without growth. Every taxonomy category
/// is present, in taxonomy order. Records without a numeric amount are skipped;
/// outflows (savings withdrawals) reduce totals.
pub fn summarize_categories(records: &[Record], schema: &CategorySchema) -> CategorySnapshot {
    let mut tallies: BTreeMap<&'static str, CategoryTally> = BTreeMap::new();
    let mut statuses: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    let mut all_entities: HashSet<String> = HashSet::new();
    let mut grand_total = 0.0;
    let mut transaction_count = 0;

    for record in records {
        let Some(amount) = record.number(schema.amount_field) else {
            continue;
        };
        let amount = schema.signed_amount(record, amount);
        let category = schema.resolve(record.text(schema.category_field));
        let tally = tallies.entry(category).or_default();
        tally.total += amount;
        tally.count += 1;
        if let Some(entity) = record.text(schema.entity_field) {
            tally.entities.insert(entity.clone());
            all_entities.insert(entity);
        }

        if let Some(status_field) = schema.status_field {
            let status = record
                .text(status_field)
                .map(|s| s.trim().to_ascii_lowercase())
                .unwrap_or_else(|| UNKNOWN_KEY.to_string());
            let slot = statuses.entry(status).or_insert((0, 0.0));
            slot.0 += 1;
            slot.1 += amount;
        }

        grand_total += amount;
        transaction_count += 1;
    }

    let categories = schema
        .categories
        .iter()
        .map(|name| {
            let tally = tallies.remove(name).unwrap_or_default();
            let distinct = tally.entities.len();
            CategoryAggregate {
                category: name.to_string(),
                total_amount: tally.total,
                transaction_count: tally.count,
                distinct_entity_count: distinct,
                average_per_transaction: ratio(tally.total, tally.count),
                average_per_entity: ratio(tally.total, distinct),
                percentage_of_total: share(tally.total, grand_total),
                previous_total: 0.0,
                growth_percent: 0.0,
            }
        })
        .collect();

    let statuses = statuses
        .into_iter()
        .map(|(status, (count, total_amount))| StatusBreakdown {
            status,
            count,
            total_amount,
            percentage: share(count as f64, transaction_count as f64),
        })
        .collect();

    CategorySnapshot {
        categories,
        statuses,
        total_amount: grand_total,
        transaction_count,
        distinct_entity_count: all_entities.len(),
    }
}

/// Percentage change from `previous` to `current`.
/// Both zero gives 0; a zero baseline with positive current gives 100.
pub fn growth_percent(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

/// Attach previous totals and growth to the current period's categories.
pub fn apply_growth(
    current: &CategorySnapshot,
    previous: &CategorySnapshot,
) -> Vec<CategoryAggregate> {
    current
        .categories
        .iter()
        .map(|aggregate| {
            let previous_total = previous
                .categories
                .iter()
                .find(|p| p.category == aggregate.category)
                .map(|p| p.total_amount)
                .unwrap_or(0.0);
            CategoryAggregate {
                previous_total,
                growth_percent: growth_percent(aggregate.total_amount, previous_total),
                ..aggregate.clone()
            }
        })
        .collect()
}

/// The equal-length window ending the day before `start`. Ranges are inclusive.
pub fn previous_period(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let duration = (end - start) + Duration::days(1);
    (start - duration, end - duration)
}

fn ratio(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn share(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}
