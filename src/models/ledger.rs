use super::record::Topic;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSavings {
    pub member_id: String,
    pub savings_type: String, // "principal" | "mandatory" | "voluntary"
    pub transaction_type: String, // "deposit" | "withdrawal"
    pub amount: f64,
    pub transaction_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoan {
    pub member_id: String,
    pub loan_type: String, // "productive" | "consumptive" | "emergency"
    pub amount: f64,
    pub interest_rate: f64,
    pub term_months: u32,
    pub status: String, // "active" | "paid" | "overdue"
    pub disbursed_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub member_id: Option<String>,
    pub category: String,
    pub description: String,
    pub payment_method: String,
    pub amount: f64,
    pub transaction_date: NaiveDate,
}

/// Result of a write: the new row id and the cache topic it dirties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub id: String,
    pub topic: Topic,
}
