use crate::errors::{EngineError, EngineResult};
use crate::state::DbCommand;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type DbPool = Arc<Mutex<Connection>>;

pub fn init_db(data_dir: &Path) -> EngineResult<DbPool> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| EngineError::Database(format!("create dir: {e}")))?;
    let db_path = data_dir.join("painscope.db");
    let conn = Connection::open(&db_path)?;

    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA cache_size=-64000;",
    )?;

    let schema = include_str!("../migrations/001_init.sql");
    conn.execute_batch(schema)?;

    tracing::info!("database initialized at {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// Dedicated DB writer task. Reads commands from bounded channel, executes SQL.
/// This is the ONLY task that touches the database connection for writes.
pub async fn run_db_writer(db: DbPool, mut rx: mpsc::Receiver<DbCommand>) {
    tracing::info!("db writer task started");

    while let Some(cmd) = rx.recv().await {
        let result = execute_command(&db, cmd);
        if let Err(e) = result {
            tracing::error!("db write error: {e}");
        }
    }

    tracing::info!("db writer task shutting down");
}

fn execute_command(db: &DbPool, cmd: DbCommand) -> EngineResult<()> {
    let conn = db
        .lock()
        .map_err(|e| EngineError::Database(format!("lock poisoned: {e}")))?;

    match cmd {
        DbCommand::InsertQuote {
            instrument,
            timestamp,
            price,
        } => {
            conn.execute(
                "INSERT INTO underlying_prices (instrument, timestamp, price) VALUES (?1, ?2, ?3)",
                rusqlite::params![instrument, timestamp, price],
            )?;
        }
        DbCommand::InsertMaxPain {
            instrument,
            expiry_date,
            record_time,
            max_pain_price,
            underlying_price,
            trend,
            distribution_json,
        } => {
            conn.execute(
                "INSERT INTO max_pain_data (instrument, expiry_date, record_time, max_pain_price, underlying_price, trend, distribution_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    instrument,
                    expiry_date,
                    record_time,
                    max_pain_price,
                    underlying_price,
                    trend,
                    distribution_json
                ],
            )?;
        }
    }
    Ok(())
}

// ── Query helpers (for server REST reads -- these DO lock, but only from cold path) ──

pub fn get_max_pain_history(
    db: &DbPool,
    instrument: Option<&str>,
    expiry_date: Option<&str>,
    limit: usize,
) -> EngineResult<Vec<MaxPainRow>> {
    let conn = db
        .lock()
        .map_err(|e| EngineError::Database(format!("lock: {e}")))?;

    let mut sql = String::from(
        "SELECT id, instrument, expiry_date, record_time, max_pain_price, underlying_price, trend FROM max_pain_data",
    );
    let mut clauses: smallvec::SmallVec<[&str; 2]> = smallvec::SmallVec::new();
    let mut params: smallvec::SmallVec<[Box<dyn rusqlite::types::ToSql>; 3]> =
        smallvec::SmallVec::new();
    if let Some(inst) = instrument {
        params.push(Box::new(inst.to_string()));
        clauses.push("instrument = ?");
    }
    if let Some(exp) = expiry_date {
        params.push(Box::new(exp.to_string()));
        clauses.push("expiry_date = ?");
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY record_time DESC LIMIT ?");
    params.push(Box::new(limit as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        Ok(MaxPainRow {
            id: row.get(0)?,
            instrument: row.get(1)?,
            expiry_date: row.get(2)?,
            record_time: row.get(3)?,
            max_pain_price: row.get(4)?,
            underlying_price: row.get(5)?,
            trend: row.get(6)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Latest persisted distribution for one instrument, parsed back to JSON.
pub fn get_latest_distribution(
    db: &DbPool,
    instrument: &str,
) -> EngineResult<Option<DistributionRow>> {
    let conn = db
        .lock()
        .map_err(|e| EngineError::Database(format!("lock: {e}")))?;
    let mut stmt = conn.prepare(
        "SELECT instrument, expiry_date, record_time, max_pain_price, distribution_json
         FROM max_pain_data WHERE instrument = ?1 ORDER BY id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map(rusqlite::params![instrument], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    match rows.next().transpose()? {
        None => Ok(None),
        Some((instrument, expiry_date, record_time, max_pain_price, raw)) => {
            let distribution: serde_json::Value = serde_json::from_str(&raw)?;
            Ok(Some(DistributionRow {
                instrument,
                expiry_date,
                record_time,
                max_pain_price,
                distribution,
            }))
        }
    }
}

pub fn get_recent_quotes(
    db: &DbPool,
    instrument: &str,
    limit: usize,
) -> EngineResult<Vec<(String, f64)>> {
    let conn = db
        .lock()
        .map_err(|e| EngineError::Database(format!("lock: {e}")))?;
    let mut stmt = conn.prepare(
        "SELECT timestamp, price FROM underlying_prices WHERE instrument = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![instrument, limit as i64], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;
    let mut series: Vec<_> = rows.filter_map(|r| r.ok()).collect();
    series.reverse();
    Ok(series)
}

// ── Row types ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct MaxPainRow {
    pub id: i64,
    pub instrument: String,
    pub expiry_date: String,
    pub record_time: String,
    pub max_pain_price: f64,
    pub underlying_price: Option<f64>,
    pub trend: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DistributionRow {
    pub instrument: String,
    pub expiry_date: String,
    pub record_time: String,
    pub max_pain_price: f64,
    pub distribution: serde_json::Value,
}
