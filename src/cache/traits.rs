//! Core traits and types for cache generation storage.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{CacheKey, Response};

/// A stored response together with when it was written.
#[derive(Debug)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// A store holds named cache generations, each a mapping from [`CacheKey`]
/// to a captured [`Response`]. Every method is individually atomic; callers
/// get no ordering guarantee between concurrent calls.
pub trait CacheStore: Send + Sync {
  /// Create the named generation if it does not exist.
  fn open(&self, name: &str) -> Result<()>;

  /// Names of all generations, oldest first.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a generation and all its entries. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Look up a key in one generation.
  fn match_in(&self, name: &str, key: &CacheKey) -> Result<Option<CachedResponse>>;

  /// Look up a key across all generations, oldest first.
  fn match_any(&self, key: &CacheKey) -> Result<Option<CachedResponse>>;

  /// Store a response, replacing any entry under the same key.
  /// Creates the generation if needed.
  fn put(&self, name: &str, key: &CacheKey, response: Response) -> Result<()>;

  /// Store several responses as one unit: either all are written or none.
  fn put_all(&self, name: &str, entries: Vec<(CacheKey, Response)>) -> Result<()>;

  /// Number of entries in a generation (0 if it does not exist).
  fn entry_count(&self, name: &str) -> Result<usize>;
}
