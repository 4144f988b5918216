//! SQLite implementation of cache generation storage.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheStore, CachedResponse};
use crate::http::{CacheKey, Response, ResponseType};

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per cache generation; rowid gives creation order
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Captured responses, keyed by digest of method + URL
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    request_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    response_url TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(key_hash);
"#;

const ENTRY_COLUMNS: &str = "e.status, e.response_type, e.response_url, e.headers, e.body, e.cached_at";

/// Raw row as read from `cache_entries`.
type EntryRow = (u16, String, String, String, Vec<u8>, String);

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
  ))
}

fn decode_entry(row: EntryRow) -> Result<CachedResponse> {
  let (status, response_type, url, headers, body, cached_at) = row;

  let response_type = ResponseType::parse(&response_type)
    .ok_or_else(|| eyre!("Unknown response type '{}' in cache", response_type))?;
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;

  Ok(CachedResponse {
    response: Response::new(status, response_type, url, headers, body),
    cached_at: parse_datetime(&cached_at)?,
  })
}

fn ensure_generation(conn: &Connection, name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;
  Ok(())
}

fn insert_entry(tx: &Transaction<'_>, name: &str, key: &CacheKey, response: &Response) -> Result<()> {
  let headers = serde_json::to_string(response.headers())
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  tx.execute(
    "INSERT OR REPLACE INTO cache_entries
       (cache_name, key_hash, method, request_url, status, response_type, response_url, headers, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      name,
      key.digest(),
      key.method(),
      key.url(),
      response.status(),
      response.response_type().as_str(),
      response.url(),
      headers,
      response.body(),
    ],
  )
  .map_err(|e| eyre!("Failed to store {} in {}: {}", key, name, e))?;

  Ok(())
}

impl CacheStore for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_generation(&conn, name)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE cache_name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM cache_generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_in(&self, name: &str, key: &CacheKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!(
          "SELECT {} FROM cache_entries e WHERE e.cache_name = ? AND e.key_hash = ?",
          ENTRY_COLUMNS
        ),
        params![name, key.digest()],
        read_entry,
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", key, name, e))?;

    row.map(decode_entry).transpose()
  }

  fn match_any(&self, key: &CacheKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!(
          "SELECT {} FROM cache_entries e
           INNER JOIN cache_generations g ON g.name = e.cache_name
           WHERE e.key_hash = ?
           ORDER BY g.rowid
           LIMIT 1",
          ENTRY_COLUMNS
        ),
        params![key.digest()],
        read_entry,
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    row.map(decode_entry).transpose()
  }

  fn put(&self, name: &str, key: &CacheKey, response: Response) -> Result<()> {
    self.put_all(name, vec![(key.clone(), response)])
  }

  fn put_all(&self, name: &str, entries: Vec<(CacheKey, Response)>) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_generation(&tx, name)?;
    for (key, response) in &entries {
      insert_entry(&tx, name, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn entry_count(&self, name: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?",
        params![name],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", name, e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  fn key(path: &str) -> CacheKey {
    let url = Url::parse("https://partyticket.ng").unwrap().join(path).unwrap();
    CacheKey::new(&Method::GET, &url)
  }

  fn page(body: &str) -> Response {
    Response::new(
      200,
      ResponseType::Basic,
      "https://partyticket.ng/",
      vec![("content-type".into(), "text/html".into())],
      body.as_bytes().to_vec(),
    )
  }

  #[test]
  fn test_put_and_match() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("partyticket-v1", &key("/events"), page("events")).unwrap();

    let cached = storage.match_in("partyticket-v1", &key("/events")).unwrap().unwrap();
    assert_eq!(cached.response.status(), 200);
    assert_eq!(cached.response.response_type(), ResponseType::Basic);
    assert_eq!(cached.response.body(), b"events");
    assert_eq!(cached.response.header("Content-Type"), Some("text/html"));

    assert!(storage.match_in("partyticket-v1", &key("/blog")).unwrap().is_none());
    assert!(storage.match_in("partyticket-v2", &key("/events")).unwrap().is_none());
  }

  #[test]
  fn test_put_overwrites() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("v1", &key("/"), page("old")).unwrap();
    storage.put("v1", &key("/"), page("new")).unwrap();

    assert_eq!(storage.entry_count("v1").unwrap(), 1);
    let cached = storage.match_any(&key("/")).unwrap().unwrap();
    assert_eq!(cached.response.body(), b"new");
  }

  #[test]
  fn test_keys_in_creation_order() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open("v2").unwrap();
    storage.open("v1").unwrap();
    storage.open("v2").unwrap();

    assert_eq!(storage.keys().unwrap(), vec!["v2", "v1"]);
  }

  #[test]
  fn test_match_any_prefers_oldest_generation() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("v1", &key("/blog"), page("first")).unwrap();
    storage.put("v2", &key("/blog"), page("second")).unwrap();

    let cached = storage.match_any(&key("/blog")).unwrap().unwrap();
    assert_eq!(cached.response.body(), b"first");
  }

  #[test]
  fn test_delete_removes_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("v1", &key("/"), page("home")).unwrap();
    storage.put("v2", &key("/"), page("home")).unwrap();

    assert!(storage.delete("v1").unwrap());
    assert!(!storage.delete("v1").unwrap());
    assert_eq!(storage.keys().unwrap(), vec!["v2"]);
    assert_eq!(storage.entry_count("v1").unwrap(), 0);
    assert_eq!(storage.entry_count("v2").unwrap(), 1);
  }

  #[test]
  fn test_put_all_stores_every_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put_all(
        "partyticket-v1",
        vec![
          (key("/"), page("home")),
          (key("/events"), page("events")),
          (key("/offline"), page("offline")),
        ],
      )
      .unwrap();

    assert_eq!(storage.entry_count("partyticket-v1").unwrap(), 3);
    assert_eq!(storage.keys().unwrap(), vec!["partyticket-v1"]);
  }

  #[test]
  fn test_open_persists_to_file() {
    let dir = std::env::temp_dir().join(format!("ticketcache-test-{}", std::process::id()));
    let path = dir.join("cache.db");

    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage.put("v1", &key("/offline"), page("offline")).unwrap();
    }

    let reopened = SqliteStorage::open(&path).unwrap();
    let cached = reopened.match_in("v1", &key("/offline")).unwrap().unwrap();
    assert_eq!(cached.response.body(), b"offline");

    let _ = std::fs::remove_dir_all(&dir);
  }
}
