//! SQLite storage implementation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use crate::{Error, Result};
use super::backend::{
    BackingStore, PropertyFilter, Record, RecursionDepth, DEFAULT_GRAPH, DEFAULT_MAX_HOPS, expand_references,
};
use super::schema;

/// How long a statement waits on a locked database before failing
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed record store
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
    graph: String,
    busy_timeout: Duration,
    max_hops: usize,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Self::connect(path, DEFAULT_BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            graph: DEFAULT_GRAPH.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            max_hops: DEFAULT_MAX_HOPS,
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            path: None,
            graph: DEFAULT_GRAPH.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            max_hops: DEFAULT_MAX_HOPS,
        })
    }

    fn connect(path: &Path, busy_timeout: Duration) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // readers keep their snapshot while a writer commits
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        initialize_schema(&conn)?;
        Ok(conn)
    }

    /// Change how long writers wait on a locked database
    pub fn set_busy_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        self.busy_timeout = timeout;
        Ok(())
    }

    /// Path of the database file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========== Record Operations ==========

    /// Run `read` inside one deferred transaction so that every statement
    /// it issues sees the same committed state
    fn read_snapshot<T>(&self, read: impl FnOnce() -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = read()?;
        tx.commit()?;
        Ok(value)
    }

    fn load_document(&self, uri: &str) -> Result<Option<Value>> {
        let doc: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM records WHERE graph = ?1 AND uri = ?2",
                params![self.graph, uri],
                |row| row.get(0),
            )
            .optional()?;

        match doc {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn load_properties(&self, uri: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM record_properties WHERE graph = ?1 AND uri = ?2",
        )?;

        let properties = stmt
            .query_map(params![self.graph, uri], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<String, String>>>()?;

        Ok(properties)
    }

    /// Helper to turn a row of (uri, type_name, document) into a Record
    fn row_to_record(&self, uri: String, type_name: String, document: &str) -> Result<Record> {
        Ok(Record {
            properties: self.load_properties(&uri)?,
            document: serde_json::from_str(document)?,
            uri,
            type_name,
        })
    }

    fn expand(&self, record: &mut Record, depth: RecursionDepth) -> Result<()> {
        let mut path = vec![record.uri.clone()];
        expand_references(&mut record.document, depth, self.max_hops, &mut path, &mut |uri: &str| {
            self.load_document(uri)
        })
    }

    /// Count records in the working graph
    pub fn count_records(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE graph = ?1",
            [&self.graph],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Names of all graphs holding at least one record
    pub fn list_graphs(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT graph FROM records ORDER BY graph")?;
        let graphs = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(graphs)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let by_type = {
            let mut stmt = self.conn.prepare(
                "SELECT type_name, COUNT(*) FROM records WHERE graph = ?1 GROUP BY type_name ORDER BY type_name",
            )?;
            stmt.query_map([&self.graph], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get(0)?, count as usize))
            })?
            .collect::<rusqlite::Result<Vec<(String, usize)>>>()?
        };

        Ok(StoreStats {
            graph: self.graph.clone(),
            records: self.count_records()?,
            by_type,
            graphs: self.list_graphs()?.len(),
        })
    }
}

impl BackingStore for SqliteStore {
    fn find(&self, type_name: &str, filter: &PropertyFilter, depth: RecursionDepth) -> Result<Vec<Record>> {
        let mut sql = String::from(
            "SELECT r.uri, r.type_name, r.document FROM records r WHERE r.graph = ?1 AND r.type_name = ?2",
        );
        let mut values = vec![self.graph.clone(), type_name.to_string()];

        for (key, value) in filter.iter() {
            let k = values.len() + 1;
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM record_properties p WHERE p.graph = r.graph AND p.uri = r.uri AND p.key = ?{} AND p.value = ?{})",
                k,
                k + 1
            ));
            values.push(key.clone());
            values.push(value.clone());
        }
        sql.push_str(" ORDER BY r.uri");

        let records = self.read_snapshot(|| {
            let rows = {
                let mut stmt = self.conn.prepare(&sql)?;
                stmt.query_map(params_from_iter(values.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut records = Vec::with_capacity(rows.len());
            for (uri, type_name, document) in rows {
                let mut record = self.row_to_record(uri, type_name, &document)?;
                self.expand(&mut record, depth)?;
                records.push(record);
            }
            Ok(records)
        })?;

        tracing::debug!(
            "find {} {} (depth {:?}) in graph '{}': {} records",
            type_name,
            filter,
            depth,
            self.graph,
            records.len()
        );
        Ok(records)
    }

    fn get(&self, uri: &str) -> Result<Record> {
        self.read_snapshot(|| {
            let row: Option<(String, String)> = self
                .conn
                .query_row(
                    "SELECT type_name, document FROM records WHERE graph = ?1 AND uri = ?2",
                    params![self.graph, uri],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let (type_name, document) = row.ok_or_else(|| Error::RecordNotFound(uri.to_string()))?;
            self.row_to_record(uri.to_string(), type_name, &document)
        })
    }

    fn commit(&mut self, records: &[Record]) -> Result<()> {
        let graph = self.graph.clone();
        let tx = self.conn.transaction()?;

        for record in records {
            let document = serde_json::to_string(&record.document)?;
            tx.execute(
                r#"
                INSERT OR REPLACE INTO records (graph, uri, type_name, document)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![graph, record.uri, record.type_name, document],
            )?;
            tx.execute(
                "DELETE FROM record_properties WHERE graph = ?1 AND uri = ?2",
                params![graph, record.uri],
            )?;
            for (key, value) in &record.properties {
                tx.execute(
                    "INSERT INTO record_properties (graph, uri, key, value) VALUES (?1, ?2, ?3, ?4)",
                    params![graph, record.uri, key, value],
                )?;
            }
        }

        // dropping an uncommitted transaction rolls it back
        tx.commit()?;
        tracing::info!("Committed {} records to graph '{}'", records.len(), graph);
        Ok(())
    }

    fn set_working_graph(&mut self, name: &str) {
        self.graph = name.to_string();
    }

    fn set_working_db_path(&mut self, path: &Path) -> Result<()> {
        self.conn = Self::connect(path, self.busy_timeout)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn working_graph(&self) -> &str {
        &self.graph
    }

    fn set_max_hops(&mut self, max_hops: usize) {
        self.max_hops = max_hops;
    }
}

/// Initialize the database schema
fn initialize_schema(conn: &Connection) -> Result<()> {
    for stmt in schema::all_schema_statements() {
        conn.execute(stmt, [])?;
    }
    Ok(())
}

/// Database statistics for the working graph
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub graph: String,
    pub records: usize,
    pub by_type: Vec<(String, usize)>,
    pub graphs: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Graph: {}", self.graph)?;
        writeln!(f, "  Records: {}", self.records)?;
        for (type_name, count) in &self.by_type {
            writeln!(f, "    {}: {}", type_name, count)?;
        }
        writeln!(f, "  Graphs: {}", self.graphs)
    }
}
