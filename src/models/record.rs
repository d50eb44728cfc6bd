use crate::error::{DataSourceError, EngineError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A caller-supplied row. Fields of interest are named by the operation that reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert, handy for fixtures and adapters.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    /// Raw value, with JSON `null` treated as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|value| !value.is_null())
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(parse_number)
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.get(field).and_then(parse_date)
    }

    /// String view of a scalar field. Empty strings count as missing.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Numbers or numeric strings; non-finite values are rejected.
pub fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and RFC 3339.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    None
}

/// Reject blank field names before any record is touched.
pub(crate) fn validate_fields(fields: &[(&str, &str)]) -> Result<()> {
    for (role, name) in fields {
        if name.trim().is_empty() {
            return Err(EngineError::config(format!("{role} field name must not be empty")));
        }
    }
    Ok(())
}

/// Data families served by the external store. Each doubles as a cache invalidation topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Savings,
    Loans,
    Transactions,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Savings => "savings",
            Topic::Loans => "loans",
            Topic::Transactions => "transactions",
        }
    }

    /// Every cache key derived from this topic starts with this prefix.
    pub fn cache_prefix(&self) -> String {
        format!("{}:", self.as_str())
    }

    pub fn date_field(&self) -> &'static str {
        match self {
            Topic::Savings | Topic::Transactions => "transaction_date",
            Topic::Loans => "disbursed_date",
        }
    }
}

/// The opaque store behind the engine. Ranges are inclusive on both ends.
pub trait DataSource: Send + Sync {
    fn fetch_by_date_range(
        &self,
        topic: Topic,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<Record>, DataSourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_numbers_from_numbers_and_numeric_strings() {
        let record = Record::new()
            .with("a", 12.5)
            .with("b", "40")
            .with("c", "n/a")
            .with("d", Value::Null);

        assert_eq!(record.number("a"), Some(12.5));
        assert_eq!(record.number("b"), Some(40.0));
        assert_eq!(record.number("c"), None);
        assert_eq!(record.number("d"), None);
        assert_eq!(record.number("missing"), None);
    }

    #[test]
    fn parses_supported_date_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(parse_date(&json!("2024-03-05")), expected);
        assert_eq!(parse_date(&json!("2024-03-05 10:11:12")), expected);
        assert_eq!(parse_date(&json!("2024-03-05T10:11:12")), expected);
        assert_eq!(parse_date(&json!("2024-03-05T10:11:12+07:00")), expected);
        assert_eq!(parse_date(&json!("05/03/2024")), None);
        assert_eq!(parse_date(&json!(20240305)), None);
    }

    #[test]
    fn blank_text_is_missing() {
        let record = Record::new().with("name", "  ").with("code", 7);
        assert_eq!(record.text("name"), None);
        assert_eq!(record.text("code"), Some("7".to_string()));
    }

    #[test]
    fn rejects_empty_field_names() {
        assert!(validate_fields(&[("date", "created_at")]).is_ok());
        let err = validate_fields(&[("value", " ")]).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
