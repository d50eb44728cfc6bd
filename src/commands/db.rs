use crate::error::DataSourceError;
use crate::models::ledger::{NewLoan, NewSavings, NewTransaction, WriteReceipt};
use crate::models::record::{DataSource, Record, Topic};
use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, Params, Result};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};

const DB_SCHEMA_VERSION: i64 = 2;

type WriteResult = std::result::Result<WriteReceipt, DataSourceError>;

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 2 {
        apply_migration_2(conn)?;
        version = 2;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        // Future schema; do not fail reads/writes for forward-compatible changes.
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS savings_transactions (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL,
            savings_type TEXT NOT NULL,
            transaction_type TEXT NOT NULL DEFAULT 'deposit',
            amount REAL NOT NULL,
            transaction_date TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS loans (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL,
            loan_type TEXT NOT NULL,
            amount REAL NOT NULL,
            interest_rate REAL NOT NULL DEFAULT 0,
            term_months INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            disbursed_date TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pos_transactions (
            id TEXT PRIMARY KEY,
            member_id TEXT,
            category TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            payment_method TEXT NOT NULL DEFAULT 'cash',
            amount REAL NOT NULL,
            transaction_date TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        ",
    )
}

fn apply_migration_2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_savings_date ON savings_transactions(transaction_date);
        CREATE INDEX IF NOT EXISTS idx_loans_disbursed ON loans(disbursed_date);
        CREATE INDEX IF NOT EXISTS idx_pos_date ON pos_transactions(transaction_date);
        ",
    )
}

/// SQLite-backed store for savings, loans and POS transactions.
pub struct SqliteDataSource {
    conn: Mutex<Connection>,
}

impl SqliteDataSource {
    /// Opens (or creates) `<data_dir>/.coopdash/ledger.db`.
    pub fn open(data_dir: &str) -> std::result::Result<Self, DataSourceError> {
        let dir = std::path::Path::new(data_dir).join(".coopdash");
        std::fs::create_dir_all(&dir).map_err(|e| {
            DataSourceError::Unavailable(format!("Failed to create .coopdash directory: {e}"))
        })?;
        let conn = Connection::open(dir.join("ledger.db"))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> std::result::Result<Self, DataSourceError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> std::result::Result<Self, DataSourceError> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, Connection>, DataSourceError> {
        self.conn
            .lock()
            .map_err(|_| DataSourceError::Unavailable("connection lock poisoned".to_string()))
    }

    pub fn insert_savings(&self, item: &NewSavings) -> WriteResult {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        self.lock()?.execute(
            "INSERT INTO savings_transactions \
             (id, member_id, savings_type, transaction_type, amount, transaction_date, created_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                &id,
                &item.member_id,
                &item.savings_type,
                &item.transaction_type,
                item.amount,
                format_date(item.transaction_date),
                now
            ],
        )?;
        Ok(WriteReceipt {
            id,
            topic: Topic::Savings,
        })
    }

    pub fn insert_loan(&self, item: &NewLoan) -> WriteResult {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        self.lock()?.execute(
            "INSERT INTO loans \
             (id, member_id, loan_type, amount, interest_rate, term_months, status, \
              disbursed_date, created_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                &id,
                &item.member_id,
                &item.loan_type,
                item.amount,
                item.interest_rate,
                item.term_months,
                &item.status,
                format_date(item.disbursed_date),
                now
            ],
        )?;
        Ok(WriteReceipt {
            id,
            topic: Topic::Loans,
        })
    }

    pub fn insert_transaction(&self, item: &NewTransaction) -> WriteResult {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        self.lock()?.execute(
            "INSERT INTO pos_transactions \
             (id, member_id, category, description, payment_method, amount, \
              transaction_date, created_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                &id,
                item.member_id.as_deref(),
                &item.category,
                &item.description,
                &item.payment_method,
                item.amount,
                format_date(item.transaction_date),
                now
            ],
        )?;
        Ok(WriteReceipt {
            id,
            topic: Topic::Transactions,
        })
    }
}

impl DataSource for SqliteDataSource {
    fn fetch_by_date_range(
        &self,
        topic: Topic,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<Record>, DataSourceError> {
        let sql = match topic {
            Topic::Savings => {
                "SELECT id, member_id, savings_type, transaction_type, amount, transaction_date \
                 FROM savings_transactions \
                 WHERE transaction_date BETWEEN ?1 AND ?2 \
                 ORDER BY transaction_date, id"
            }
            Topic::Loans => {
                "SELECT id, member_id, loan_type, amount, interest_rate, term_months, status, \
                 disbursed_date \
                 FROM loans \
                 WHERE disbursed_date BETWEEN ?1 AND ?2 \
                 ORDER BY disbursed_date, id"
            }
            Topic::Transactions => {
                "SELECT id, member_id, category, description, payment_method, amount, \
                 transaction_date \
                 FROM pos_transactions \
                 WHERE transaction_date BETWEEN ?1 AND ?2 \
                 ORDER BY transaction_date, id"
            }
        };

        let conn = self.lock()?;
        Ok(query_records(&conn, sql, params![format_date(start), format_date(end)])?)
    }
}

/// Runs `sql` and turns each row into a `Record` keyed by column name.
fn query_records<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let rows = stmt.query_map(params, |row| {
        let mut record = Record::new();
        for (index, name) in columns.iter().enumerate() {
            record.insert(name, column_value(row.get_ref(index)?));
        }
        Ok(record)
    })?;

    rows.collect()
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => Value::from(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
