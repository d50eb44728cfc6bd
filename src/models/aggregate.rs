use crate::error::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
            Interval::Quarter => "quarter",
            Interval::Year => "year",
        }
    }
}

impl FromStr for Interval {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Interval::Day),
            "week" | "weekly" => Ok(Interval::Week),
            "month" | "monthly" => Ok(Interval::Month),
            "quarter" | "quarterly" => Ok(Interval::Quarter),
            "year" | "yearly" => Ok(Interval::Year),
            other => Err(EngineError::config(format!("unsupported interval: {other}"))),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggregationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Avg => "avg",
            AggregationType::Count => "count",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
        }
    }
}

impl FromStr for AggregationType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregationType::Sum),
            "avg" | "average" => Ok(AggregationType::Avg),
            "count" => Ok(AggregationType::Count),
            "min" => Ok(AggregationType::Min),
            "max" => Ok(AggregationType::Max),
            other => Err(EngineError::config(format!(
                "unsupported aggregation type: {other}"
            ))),
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One calendar period with at least one valid record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub period_key: String,
    pub anchor_date: NaiveDate,
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    /// The bucket's figure under the requested aggregation type.
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSummary {
    pub total_records: usize,
    pub total_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub period_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub interval: Interval,
    pub aggregation: AggregationType,
    pub data: Vec<Bucket>,
    pub summary: TimeSeriesSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAggregate {
    pub category: String,
    pub total_amount: f64,
    pub transaction_count: usize,
    pub distinct_entity_count: usize,
    pub average_per_transaction: f64,
    pub average_per_entity: f64,
    pub percentage_of_total: f64,
    pub previous_total: f64,
    pub growth_percent: f64,
}

/// Growth-free aggregate of one period. This is the cached unit; growth is layered on top.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub categories: Vec<CategoryAggregate>,
    pub statuses: Vec<StatusBreakdown>,
    pub total_amount: f64,
    pub transaction_count: usize,
    pub distinct_entity_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub status: String,
    pub count: usize,
    pub total_amount: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub period: PeriodRange,
    pub previous_period: PeriodRange,
    pub total_amount: f64,
    pub transaction_count: usize,
    pub distinct_entity_count: usize,
    pub previous_total: f64,
    pub growth_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsReport {
    pub categories: Vec<CategoryAggregate>,
    pub summary: CategorySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanReport {
    pub categories: Vec<CategoryAggregate>,
    pub statuses: Vec<StatusBreakdown>,
    pub summary: CategorySummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interval_aliases() {
        assert_eq!("monthly".parse::<Interval>().unwrap(), Interval::Month);
        assert_eq!(" Quarter ".parse::<Interval>().unwrap(), Interval::Quarter);
        assert!(matches!(
            "hourly".parse::<Interval>(),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn parses_aggregation_types() {
        assert_eq!("average".parse::<AggregationType>().unwrap(), AggregationType::Avg);
        assert_eq!("COUNT".parse::<AggregationType>().unwrap(), AggregationType::Count);
        assert!(matches!(
            "median".parse::<AggregationType>(),
            Err(EngineError::Configuration(_))
        ));
    }
}
