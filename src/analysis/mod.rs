pub mod accumulator;
pub mod categories;
pub mod pivot;
pub mod query;
pub mod statistics;
pub mod time_buckets;
