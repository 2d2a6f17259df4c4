use crate::error::ValidationError;
use crate::record::ResultRecord;
use rusqlite::{Connection, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Key-value store for result records, keyed by record id.
///
/// Implementations must be safe to share between concurrent validations.
/// A second `put` for the same id replaces the first.
pub trait ResultStore: Send + Sync {
    /// Persist `record` and return where it was written.
    fn put(&self, record: &ResultRecord) -> Result<String, ValidationError>;

    fn get(&self, record_id: &str) -> Result<Option<ResultRecord>, ValidationError>;
}

/// Record ids become path segments, so they must not escape the store root.
pub(crate) fn check_record_id(record_id: &str) -> Result<(), ValidationError> {
    let bad = record_id.is_empty()
        || record_id == "."
        || record_id == ".."
        || record_id.contains(['/', '\\'])
        || record_id.chars().any(char::is_control);
    if bad {
        return Err(ValidationError::Input(format!(
            "record_id '{record_id}' is not a valid identifier"
        )));
    }
    Ok(())
}

/// Writes `{root}/{record_id}/processed/result.json`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, record_id: &str) -> PathBuf {
        self.root.join(record_id).join("processed").join("result.json")
    }
}

impl ResultStore for JsonFileStore {
    fn put(&self, record: &ResultRecord) -> Result<String, ValidationError> {
        check_record_id(&record.record_id)?;
        let path = self.path_for(&record.record_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(record)?)?;
        info!(record_id = %record.record_id, path = %path.display(), "Result written");
        Ok(path.display().to_string())
    }

    fn get(&self, record_id: &str) -> Result<Option<ResultRecord>, ValidationError> {
        check_record_id(record_id)?;
        let path = self.path_for(record_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// Summary row for listing stored results.
#[derive(Debug)]
pub struct StoredResult {
    pub record_id: String,
    pub status: String,
    pub delivery_quantity: f64,
    pub matched_quantity: Option<f64>,
    pub scorer_status: String,
    pub processed_at: String,
}

/// SQLite-backed history of every result. One connection behind one lock;
/// throughput here is a handful of validations, not a hot path.
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Open (or create) the result database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, ValidationError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, ValidationError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, ValidationError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS validation_results (
                record_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                delivery_quantity REAL NOT NULL,
                matched_quantity REAL,
                scorer_status TEXT NOT NULL,
                payload TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_results_status ON validation_results(status)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_results_processed_at ON validation_results(processed_at)",
            [],
        )?;

        info!("Result database initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ValidationError> {
        self.conn
            .lock()
            .map_err(|_| ValidationError::Config("result database lock poisoned".into()))
    }

    /// Most recent results first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<StoredResult>, ValidationError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, status, delivery_quantity, matched_quantity, scorer_status, processed_at
             FROM validation_results
             ORDER BY processed_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(StoredResult {
                record_id: row.get(0)?,
                status: row.get(1)?,
                delivery_quantity: row.get(2)?,
                matched_quantity: row.get(3)?,
                scorer_status: row.get(4)?,
                processed_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// (total, passed)
    pub fn get_counts(&self) -> Result<(usize, usize), ValidationError> {
        let conn = self.conn()?;
        let total: usize =
            conn.query_row("SELECT COUNT(*) FROM validation_results", [], |row| row.get(0))?;
        let passed: usize = conn.query_row(
            "SELECT COUNT(*) FROM validation_results WHERE status = 'success'",
            [],
            |row| row.get(0),
        )?;
        Ok((total, passed))
    }
}

impl ResultStore for SqliteResultStore {
    fn put(&self, record: &ResultRecord) -> Result<String, ValidationError> {
        let payload = serde_json::to_string(record)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO validation_results
                (record_id, status, delivery_quantity, matched_quantity, scorer_status, payload, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(record_id) DO UPDATE SET
                status = excluded.status,
                delivery_quantity = excluded.delivery_quantity,
                matched_quantity = excluded.matched_quantity,
                scorer_status = excluded.scorer_status,
                payload = excluded.payload,
                processed_at = excluded.processed_at",
            params![
                record.record_id,
                record.status.as_str(),
                record.delivery_quantity,
                record.matched_quantity,
                record.scorer_status,
                payload,
                record.processed_at,
            ],
        )?;
        info!(record_id = %record.record_id, "Result stored");
        Ok(format!("sqlite:validation_results/{}", record.record_id))
    }

    fn get(&self, record_id: &str) -> Result<Option<ResultRecord>, ValidationError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT payload FROM validation_results WHERE record_id = ?1")?;
        let mut rows = stmt.query(params![record_id])?;
        match rows.next()? {
            Some(row) => {
                let payload: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }
}
