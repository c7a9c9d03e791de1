use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::parser::record::Record;
use crate::parser::{Outcome, ProcessedDocument};

pub const DEFAULT_DB_PATH: &str = "data/europarl.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_documents_visited ON documents(visited);

        CREATE TABLE IF NOT EXISTS document_data (
            id          INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL REFERENCES documents(id),
            url         TEXT NOT NULL,
            content     BLOB,
            status      INTEGER,
            error       TEXT,
            latency_ms  INTEGER,
            fetched_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_document_data_url ON document_data(url);

        -- One record per source URL; later duplicates are ignored
        CREATE TABLE IF NOT EXISTS records (
            url              TEXT PRIMARY KEY,
            text             TEXT NOT NULL,
            source           TEXT NOT NULL,
            document_data_id INTEGER NOT NULL REFERENCES document_data(id),
            created_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_records_data ON records(document_data_id);

        CREATE TABLE IF NOT EXISTS rejections (
            document_data_id INTEGER PRIMARY KEY REFERENCES document_data(id),
            url              TEXT NOT NULL,
            reason           TEXT NOT NULL,
            created_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Fetching ──

pub fn insert_documents(conn: &Connection, urls: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO documents (url) VALUES (?1)")?;
        for url in urls {
            count += stmt.execute(rusqlite::params![url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT id, url FROM documents WHERE visited = 0 ORDER BY id LIMIT {}",
            n
        ),
        None => "SELECT id, url FROM documents WHERE visited = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct FetchRow {
    pub document_id: i64,
    pub url: String,
    pub content: Option<Vec<u8>>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Store one fetch result and mark its URL visited, whatever the outcome.
pub fn save_fetch(conn: &Connection, row: &FetchRow) -> Result<()> {
    let mut insert = conn.prepare_cached(
        "INSERT INTO document_data (document_id, url, content, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut update = conn.prepare_cached(
        "UPDATE documents SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;
    insert.execute(rusqlite::params![
        row.document_id, row.url, row.content, row.status, row.error, row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.document_id])?;
    Ok(())
}

// ── Processing ──

pub struct StoredDocument {
    pub document_data_id: i64,
    pub url: String,
    pub content: Vec<u8>,
}

/// Fetched documents that have neither a record nor a rejection yet.
pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredDocument>> {
    let sql = format!(
        "SELECT dd.id, dd.url, dd.content
         FROM document_data dd
         LEFT JOIN records r ON r.document_data_id = dd.id
         LEFT JOIN rejections x ON x.document_data_id = dd.id
         WHERE dd.content IS NOT NULL AND r.url IS NULL AND x.document_data_id IS NULL
         ORDER BY dd.id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredDocument {
                document_data_id: row.get(0)?,
                url: row.get(1)?,
                content: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Persist a batch of processing outcomes. Returns (records inserted, rejections).
pub fn save_processed(conn: &Connection, results: &[ProcessedDocument]) -> Result<(usize, usize)> {
    let tx = conn.unchecked_transaction()?;
    let mut saved = 0;
    let mut rejected = 0;
    {
        let mut r_stmt = tx.prepare(
            "INSERT OR IGNORE INTO records (url, text, source, document_data_id)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut x_stmt = tx.prepare(
            "INSERT OR REPLACE INTO rejections (document_data_id, url, reason)
             VALUES (?1, ?2, ?3)",
        )?;
        for p in results {
            match &p.outcome {
                Outcome::Record(r) => {
                    let n = r_stmt.execute(rusqlite::params![
                        r.url, r.text, r.source, p.document_data_id,
                    ])?;
                    if n == 0 {
                        // Same URL already has a record from an earlier fetch.
                        x_stmt.execute(rusqlite::params![p.document_data_id, p.url, "duplicate"])?;
                    }
                    saved += n;
                }
                Outcome::Rejected(reason) => {
                    x_stmt.execute(rusqlite::params![p.document_data_id, p.url, reason])?;
                    rejected += 1;
                }
            }
        }
    }
    tx.commit()?;
    Ok((saved, rejected))
}

// ── Records ──

pub fn fetch_records(conn: &Connection) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare("SELECT url, text, source FROM records ORDER BY created_at, url")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Record {
                url: row.get(0)?,
                text: row.get(1)?,
                source: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_record(conn: &Connection, url: &str) -> Result<Option<Record>> {
    let record = conn
        .query_row(
            "SELECT url, text, source FROM records WHERE url = ?1",
            [url],
            |row| {
                Ok(Record {
                    url: row.get(0)?,
                    text: row.get(1)?,
                    source: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub errors: usize,
    pub records: usize,
    pub rejected: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM documents WHERE visited = 1", [], |r| r.get(0))?;
    let fetched: usize = conn.query_row("SELECT COUNT(*) FROM document_data", [], |r| r.get(0))?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM document_data WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let records: usize = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
    let rejected: usize = conn.query_row("SELECT COUNT(*) FROM rejections", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        fetched,
        errors,
        records,
        rejected,
    })
}
