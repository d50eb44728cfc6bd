use crate::models::aggregate::AggregationType;

/// Running count/sum/min/max shared by buckets, pivot cells and totals so every
/// level of a report uses identical aggregation semantics.
///
/// `records` counts every pushed record; `values` only those with a numeric value.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    records: usize,
    values: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.push_record(Some(value));
    }

    pub fn push_record(&mut self, value: Option<f64>) {
        self.records += 1;
        let Some(value) = value else {
            return;
        };
        if self.values == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.values += 1;
        self.sum += value;
    }

    pub fn count(&self) -> usize {
        self.records
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn avg(&self) -> f64 {
        if self.values == 0 {
            0.0
        } else {
            self.sum / self.values as f64
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn value(&self, aggregation: AggregationType) -> f64 {
        match aggregation {
            AggregationType::Sum => self.sum(),
            AggregationType::Avg => self.avg(),
            AggregationType::Count => self.count() as f64,
            AggregationType::Min => self.min(),
            AggregationType::Max => self.max(),
        }
    }
}
