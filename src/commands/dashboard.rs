use crate::analysis::categories::{
    apply_growth, growth_percent, previous_period, summarize_categories, CategorySchema,
    LOAN_SCHEMA, SAVINGS_SCHEMA,
};
use crate::analysis::pivot::create_pivot;
use crate::analysis::query::{filter_and_sort, filter_records, paginate};
use crate::analysis::statistics::{transaction_statistics, AMOUNT_FIELD, DATE_FIELD};
use crate::analysis::time_buckets::aggregate_by_time;
use crate::commands::settings::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::aggregate::{
    AggregationType, CategorySnapshot, CategorySummary, Interval, LoanReport, PeriodRange,
    SavingsReport, TimeSeries,
};
use crate::models::cache::{QueryCache, TtlClass};
use crate::models::performance::{PerformanceMetrics, PerformanceTracker};
use crate::models::pivot::PivotTable;
use crate::models::query::{
    QueryOptions, QueryPerformance, TransactionFilters, TransactionHistory, TransactionStatistics,
};
use crate::models::record::{DataSource, Record, Topic};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::OnceCell;

type Pending = Arc<OnceCell<(Value, usize)>>;
type InflightMap = Mutex<HashMap<String, Pending>>;

/// A cache-served result plus how it was produced.
#[derive(Debug, Clone)]
pub struct Served<T> {
    pub value: T,
    pub cached: bool,
    pub records_processed: usize,
}

/// Cache payload: the encoded result and how many source records produced it.
#[derive(Serialize, Deserialize)]
struct Stored<T> {
    value: T,
    records_processed: usize,
}

/// A caller's claim on a key's pending cell. The last claim to go away removes
/// the cell from the in-flight map, even when its future is dropped mid-compute.
struct InflightSlot<'a> {
    inflight: &'a InflightMap,
    key: &'a str,
    cell: Pending,
}

impl<'a> InflightSlot<'a> {
    fn claim(inflight: &'a InflightMap, key: &'a str) -> Self {
        let cell = lock(inflight)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        Self {
            inflight,
            key,
            cell,
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut inflight = lock(self.inflight);
        let registered = inflight
            .get(self.key)
            .is_some_and(|cell| Arc::ptr_eq(cell, &self.cell));
        // map entry + this claim
        if registered && Arc::strong_count(&self.cell) <= 2 {
            inflight.remove(self.key);
        }
    }
}

/// Query engine over one `DataSource`. Owns its cache and performance tracker;
/// nothing here is global.
pub struct DashboardEngine<S: DataSource> {
    source: S,
    config: EngineConfig,
    cache: Mutex<QueryCache>,
    tracker: Mutex<PerformanceTracker>,
    inflight: InflightMap,
}

impl<S: DataSource> DashboardEngine<S> {
    pub fn new(source: S, config: EngineConfig) -> Self {
        Self {
            cache: Mutex::new(QueryCache::new(config.cache_capacity)),
            tracker: Mutex::new(PerformanceTracker::new(
                config.slow_query_threshold,
                config.slow_query_log_size,
            )),
            inflight: Mutex::new(HashMap::new()),
            source,
            config,
        }
    }

    pub fn with_defaults(source: S) -> Self {
        Self::new(source, EngineConfig::default())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Buckets caller-supplied records by period. Not cached: the records are the input.
    pub fn aggregate_by_time(
        &self,
        records: &[Record],
        interval: Interval,
        date_field: &str,
        value_field: &str,
        aggregation: AggregationType,
    ) -> Result<TimeSeries> {
        guard("aggregate_by_time", || {
            aggregate_by_time(records, interval, date_field, value_field, aggregation)
        })
    }

    /// Cross-tabulates caller-supplied records. Not cached: the records are the input.
    pub fn create_pivot(
        &self,
        records: &[Record],
        row_field: &str,
        column_field: &str,
        value_field: &str,
        aggregation: AggregationType,
    ) -> Result<PivotTable> {
        guard("create_pivot", || {
            create_pivot(records, row_field, column_field, value_field, aggregation)
        })
    }

    pub async fn aggregate_savings_by_category(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SavingsReport> {
        let (current, previous, summary) = self
            .category_periods("aggregate_savings_by_category", &SAVINGS_SCHEMA, start, end)
            .await?;
        Ok(SavingsReport {
            categories: apply_growth(&current, &previous),
            summary,
        })
    }

    pub async fn aggregate_loans_by_category(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<LoanReport> {
        let (current, previous, summary) = self
            .category_periods("aggregate_loans_by_category", &LOAN_SCHEMA, start, end)
            .await?;
        Ok(LoanReport {
            categories: apply_growth(&current, &previous),
            statuses: current.statuses,
            summary,
        })
    }

    /// Filtered, sorted and paginated POS transactions.
    ///
    /// The filtered+sorted collection is cached as a search index so paging
    /// through one query reuses it.
    pub async fn get_transaction_history(
        &self,
        filters: &TransactionFilters,
        options: &QueryOptions,
    ) -> Result<TransactionHistory> {
        let started = Instant::now();
        let (start, end) = fetch_window(filters)?;
        let key = QueryCache::key_for("transactions:history", filters, &options.sort);

        let outcome = self
            .cached("get_transaction_history", key, TtlClass::SearchIndex, || async {
                let raw = self.raw_records(Topic::Transactions, start, end).await?;
                let processed = raw.len();
                let sorted = guard("get_transaction_history", || {
                    Ok(filter_and_sort(&raw, &filters.conditions, &options.sort, DATE_FIELD))
                })?;
                Ok::<_, EngineError>((sorted, processed))
            })
            .await;
        self.track("get_transaction_history", started, &outcome);
        let index = outcome?;

        let page_size = options.page_size.unwrap_or(self.config.default_page_size);
        let page = paginate(&index.value, options.page, page_size);

        Ok(TransactionHistory {
            data: page.data,
            pagination: page.pagination,
            performance: QueryPerformance {
                query_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                cached: index.cached,
                records_processed: index.records_processed,
            },
        })
    }

    pub async fn get_statistics(
        &self,
        filters: &TransactionFilters,
    ) -> Result<TransactionStatistics> {
        let started = Instant::now();
        let (start, end) = fetch_window(filters)?;
        let key = QueryCache::key_for("transactions:statistics", filters, &Value::Null);

        let outcome = self
            .cached("get_statistics", key, TtlClass::Aggregate, || async {
                let raw = self.raw_records(Topic::Transactions, start, end).await?;
                let processed = raw.len();
                let stats = guard("get_statistics", || {
                    transaction_statistics(&filter_records(&raw, &filters.conditions))
                })?;
                Ok::<_, EngineError>((stats, processed))
            })
            .await;
        self.track("get_statistics", started, &outcome);
        Ok(outcome?.value)
    }

    /// Cached time series over filtered POS transaction amounts.
    pub async fn transaction_time_series(
        &self,
        filters: &TransactionFilters,
        interval: Interval,
        aggregation: AggregationType,
    ) -> Result<TimeSeries> {
        let started = Instant::now();
        let (start, end) = fetch_window(filters)?;
        let key =
            QueryCache::key_for("transactions:timeseries", filters, &(interval, aggregation));

        let outcome = self
            .cached("transaction_time_series", key, TtlClass::Aggregate, || async {
                let raw = self.raw_records(Topic::Transactions, start, end).await?;
                let processed = raw.len();
                let series = guard("transaction_time_series", || {
                    let filtered = filter_records(&raw, &filters.conditions);
                    aggregate_by_time(&filtered, interval, DATE_FIELD, AMOUNT_FIELD, aggregation)
                })?;
                Ok::<_, EngineError>((series, processed))
            })
            .await;
        self.track("transaction_time_series", started, &outcome);
        Ok(outcome?.value)
    }

    /// Cached pivot of filtered POS transaction amounts.
    pub async fn transaction_pivot(
        &self,
        filters: &TransactionFilters,
        row_field: &str,
        column_field: &str,
        aggregation: AggregationType,
    ) -> Result<PivotTable> {
        let started = Instant::now();
        let (start, end) = fetch_window(filters)?;
        let key = QueryCache::key_for(
            "transactions:pivot",
            filters,
            &(row_field, column_field, aggregation),
        );

        let outcome = self
            .cached("transaction_pivot", key, TtlClass::Aggregate, || async {
                let raw = self.raw_records(Topic::Transactions, start, end).await?;
                let processed = raw.len();
                let pivot = guard("transaction_pivot", || {
                    let filtered = filter_records(&raw, &filters.conditions);
                    create_pivot(&filtered, row_field, column_field, AMOUNT_FIELD, aggregation)
                })?;
                Ok::<_, EngineError>((pivot, processed))
            })
            .await;
        self.track("transaction_pivot", started, &outcome);
        Ok(outcome?.value)
    }

    /// Drops cached entries under `prefix` (e.g. `Topic::Savings.cache_prefix()`),
    /// or everything. Writers must call this after mutating the store.
    pub fn invalidate_cache(&self, prefix: Option<&str>) -> usize {
        let removed = self.cache().invalidate(prefix);
        log::info!(
            "invalidated {removed} cache entries (prefix: {})",
            prefix.unwrap_or("*")
        );
        removed
    }

    /// Explicit sweep of expired entries. Nothing runs on a timer.
    pub fn run_maintenance(&self) -> usize {
        let purged = self.cache().purge_expired();
        if purged > 0 {
            log::info!("maintenance purged {purged} expired cache entries");
        }
        purged
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        let cache_size = self.cache().len();
        self.tracker().metrics(cache_size)
    }

    pub fn reset_performance_metrics(&self) {
        self.tracker().reset();
    }

    /// Current and previous-period snapshots, each served through the cache
    /// under its own key, so chained period reports reuse earlier work. The
    /// report counts as one sample, a hit only when both snapshots were cached.
    async fn category_periods(
        &self,
        operation: &str,
        schema: &CategorySchema,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(CategorySnapshot, CategorySnapshot, CategorySummary)> {
        if start > end {
            return Err(EngineError::config(format!(
                "start date {start} is after end date {end}"
            )));
        }
        let started = Instant::now();
        let (previous_start, previous_end) = previous_period(start, end);

        let outcome = async {
            let current = self.category_snapshot(schema, start, end).await?;
            let previous = self
                .category_snapshot(schema, previous_start, previous_end)
                .await?;
            Ok::<_, EngineError>(Served {
                cached: current.cached && previous.cached,
                records_processed: current.records_processed + previous.records_processed,
                value: (current.value, previous.value),
            })
        }
        .await;
        self.track(operation, started, &outcome);
        let (current, previous) = outcome?.value;

        let summary = CategorySummary {
            period: PeriodRange { start, end },
            previous_period: PeriodRange {
                start: previous_start,
                end: previous_end,
            },
            total_amount: current.total_amount,
            transaction_count: current.transaction_count,
            distinct_entity_count: current.distinct_entity_count,
            previous_total: previous.total_amount,
            growth_percent: growth_percent(current.total_amount, previous.total_amount),
        };
        Ok((current, previous, summary))
    }

    async fn category_snapshot(
        &self,
        schema: &CategorySchema,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Served<CategorySnapshot>> {
        let topic = schema.topic;
        let operation = format!("{}:category", topic.as_str());
        let key = QueryCache::key_for(&operation, &(start, end), &Value::Null);

        self.cached(&operation, key, TtlClass::Aggregate, || async {
            let records = self.source.fetch_by_date_range(topic, start, end)?;
            let snapshot = guard(&operation, || Ok(summarize_categories(&records, schema)))?;
            Ok::<_, EngineError>((snapshot, records.len()))
        })
        .await
    }

    /// Raw snapshot of one topic's records for a date window.
    async fn raw_records(
        &self,
        topic: Topic,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Record>> {
        let operation = format!("{}:raw", topic.as_str());
        let key = QueryCache::key_for(&operation, &(start, end), &Value::Null);

        let served = self
            .cached(&operation, key, TtlClass::RawRecords, || async {
                let records = self.source.fetch_by_date_range(topic, start, end)?;
                let count = records.len();
                Ok::<_, EngineError>((records, count))
            })
            .await?;
        Ok(served.value)
    }

    /// Read-through lookup. On a miss, concurrent callers for the same key
    /// share one computation through a pending cell; the result is stored with
    /// the TTL of `class`. Not sampled by the tracker: public operations are.
    async fn cached<T, F, Fut>(
        &self,
        operation: &str,
        key: String,
        class: TtlClass,
        compute: F,
    ) -> Result<Served<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, usize)>>,
    {
        let hit = self.cache().get_decoded::<Stored<T>>(&key, Instant::now());
        if let Some(stored) = hit {
            log::debug!("cache hit: {key}");
            return Ok(Served {
                value: stored.value,
                cached: true,
                records_processed: stored.records_processed,
            });
        }
        log::debug!("cache miss: {key}");

        let slot = InflightSlot::claim(&self.inflight, &key);
        let ran_here = AtomicBool::new(false);
        let outcome = slot
            .cell
            .get_or_try_init(|| async {
                ran_here.store(true, Ordering::SeqCst);
                let (value, processed) = compute().await?;
                let payload = serde_json::to_value(&value).map_err(|e| {
                    log::error!("failed to encode result of '{operation}': {e}");
                    EngineError::computation(operation)
                })?;
                Ok::<_, EngineError>((payload, processed))
            })
            .await
            .cloned();

        let computed = ran_here.load(Ordering::SeqCst);
        if let (Ok((payload, processed)), true) = (&outcome, computed) {
            let entry = Stored {
                value: payload,
                records_processed: *processed,
            };
            self.cache()
                .insert_encoded(&key, &entry, self.config.ttl_for(class), Instant::now());
        }
        // Released only after the result is visible in the cache.
        drop(slot);

        let (payload, processed) = outcome?;
        let value = serde_json::from_value::<T>(payload).map_err(|e| {
            log::error!("failed to decode result of '{operation}': {e}");
            EngineError::computation(operation)
        })?;

        Ok(Served {
            value,
            cached: !computed,
            records_processed: processed,
        })
    }

    /// One performance sample per public call. Failures count as misses.
    fn track<T>(&self, operation: &str, started: Instant, outcome: &Result<Served<T>>) {
        let (hit, processed) = match outcome {
            Ok(served) => (served.cached, served.records_processed),
            Err(_) => (false, 0),
        };
        self.tracker()
            .record(operation, started.elapsed(), hit, processed);
    }

    fn cache(&self) -> MutexGuard<'_, QueryCache> {
        lock(&self.cache)
    }

    fn tracker(&self) -> MutexGuard<'_, PerformanceTracker> {
        lock(&self.tracker)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs a pure computation, converting faults (including panics) into a coarse
/// `Computation` error after logging the detail.
pub(crate) fn guard<T>(operation: &str, compute: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(compute)) {
        Ok(Err(EngineError::Computation { operation: inner })) => {
            log::error!("computation fault in '{inner}' while serving '{operation}'");
            Err(EngineError::computation(operation))
        }
        Ok(result) => result,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("computation panicked in '{operation}': {detail}");
            Err(EngineError::computation(operation))
        }
    }
}

/// Inclusive fetch window for transaction filters; open ends widen to all time.
fn fetch_window(filters: &TransactionFilters) -> Result<(NaiveDate, NaiveDate)> {
    let start = filters
        .start_date
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN));
    let end = filters
        .end_date
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX));
    if start > end {
        return Err(EngineError::config(format!(
            "start date {start} is after end date {end}"
        )));
    }
    Ok((start, end))
}
