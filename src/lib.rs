pub mod analysis;
pub mod commands;
pub mod error;
pub mod models;

pub use commands::dashboard::DashboardEngine;
pub use commands::db::SqliteDataSource;
pub use commands::settings::{load_engine_config, EngineConfig};
pub use error::{CacheError, DataSourceError, EngineError, Result};
pub use models::record::{DataSource, Record, Topic};

/// Installs the `env_logger` backend, honouring `RUST_LOG` and defaulting to `info`.
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Opens the ledger under `data_dir` and builds an engine from its settings file.
pub fn open_engine(data_dir: &str) -> Result<DashboardEngine<SqliteDataSource>> {
    let config = load_engine_config(data_dir)?;
    let source = SqliteDataSource::open(data_dir)?;
    log::info!(
        "opened ledger at {data_dir} (cache capacity {}, default page size {})",
        config.cache_capacity,
        config.default_page_size
    );
    Ok(DashboardEngine::new(source, config))
}
