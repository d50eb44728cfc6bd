use super::time_buckets::aggregate_by_time;
use crate::error::Result;
use crate::models::aggregate::{AggregationType, Interval};
use crate::models::pivot::UNKNOWN_KEY;
use crate::models::query::{CategoryTotal, TransactionStatistics};
use crate::models::record::Record;
use std::collections::{BTreeMap, HashSet};

/// Field layout of POS transaction records.
pub const DATE_FIELD: &str = "transaction_date";
pub const AMOUNT_FIELD: &str = "amount";
pub const CATEGORY_FIELD: &str = "category";
pub const MEMBER_FIELD: &str = "member_id";

/// Dashboard headline numbers for a set of transactions.
pub fn transaction_statistics(records: &[Record]) -> Result<TransactionStatistics> {
    let mut by_category: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    let mut members: HashSet<String> = HashSet::new();
    let mut total_count = 0;
    let mut total_amount = 0.0;

    for record in records {
        let Some(amount) = record.number(AMOUNT_FIELD) else {
            continue;
        };
        let category = record
            .text(CATEGORY_FIELD)
            .unwrap_or_else(|| UNKNOWN_KEY.to_string());
        let slot = by_category.entry(category).or_insert((0, 0.0));
        slot.0 += 1;
        slot.1 += amount;
        if let Some(member) = record.text(MEMBER_FIELD) {
            members.insert(member);
        }
        total_count += 1;
        total_amount += amount;
    }

    let sums_by = |interval| {
        aggregate_by_time(records, interval, DATE_FIELD, AMOUNT_FIELD, AggregationType::Sum)
    };
    let daily = sums_by(Interval::Day)?;
    let monthly = sums_by(Interval::Month)?;

    Ok(TransactionStatistics {
        total_count,
        total_amount,
        average_amount: if total_count == 0 {
            0.0
        } else {
            total_amount / total_count as f64
        },
        distinct_members: members.len(),
        by_category: by_category
            .into_iter()
            .map(|(category, (count, total_amount))| CategoryTotal {
                category,
                count,
                total_amount,
            })
            .collect(),
        by_day: daily.data,
        by_month: monthly.data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_counts_categories_and_periods() {
        let records = vec![
            Record::new()
                .with("transaction_date", "2024-01-30")
                .with("amount", 10.0)
                .with("category", "groceries")
                .with("member_id", "m1"),
            Record::new()
                .with("transaction_date", "2024-01-30")
                .with("amount", 30.0)
                .with("category", "groceries"),
            Record::new()
                .with("transaction_date", "2024-02-02")
                .with("amount", 20.0)
                .with("member_id", "m1"),
            Record::new().with("transaction_date", "2024-02-03").with("amount", "void"),
        ];

        let stats = transaction_statistics(&records).unwrap();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.total_amount, 60.0);
        assert_eq!(stats.average_amount, 20.0);
        assert_eq!(stats.distinct_members, 1);
        assert_eq!(stats.by_category.len(), 2);
        assert_eq!(stats.by_category[0].category, UNKNOWN_KEY);
        assert_eq!(stats.by_category[1].total_amount, 40.0);
        assert_eq!(stats.by_day.len(), 2);
        assert_eq!(stats.by_month.len(), 2);
        assert_eq!(stats.by_month[0].sum, 40.0);
    }

    #[test]
    fn empty_input_is_all_zero() {
        let stats = transaction_statistics(&[]).unwrap();
        assert_eq!(stats, TransactionStatistics::default());
    }
}
