pub mod aggregate;
pub mod cache;
pub mod ledger;
pub mod performance;
pub mod pivot;
pub mod query;
pub mod record;
