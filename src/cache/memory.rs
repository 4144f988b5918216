//! In-memory cache storage, used for ephemeral runs and tests.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheStore, CachedResponse};
use crate::http::{CacheKey, Response};

/// Generations kept in creation order.
type Generations = Vec<(String, HashMap<CacheKey, (Response, DateTime<Utc>)>)>;

/// Storage implementation that keeps everything in process memory.
/// Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
  generations: Mutex<Generations>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Generations>> {
    self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn generation_mut<'a>(
  generations: &'a mut Generations,
  name: &str,
) -> &'a mut HashMap<CacheKey, (Response, DateTime<Utc>)> {
  let index = match generations.iter().position(|(n, _)| n == name) {
    Some(index) => index,
    None => {
      generations.push((name.to_string(), HashMap::new()));
      generations.len() - 1
    }
  };
  &mut generations[index].1
}

fn copy_entry(entry: &(Response, DateTime<Utc>)) -> CachedResponse {
  CachedResponse {
    response: entry.0.duplicate(),
    cached_at: entry.1,
  }
}

impl CacheStore for MemoryStorage {
  fn open(&self, name: &str) -> Result<()> {
    let mut generations = self.lock()?;
    generation_mut(&mut generations, name);
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let generations = self.lock()?;
    Ok(generations.iter().map(|(name, _)| name.clone()).collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut generations = self.lock()?;
    let before = generations.len();
    generations.retain(|(n, _)| n != name);
    Ok(generations.len() != before)
  }

  fn match_in(&self, name: &str, key: &CacheKey) -> Result<Option<CachedResponse>> {
    let generations = self.lock()?;
    Ok(
      generations
        .iter()
        .find(|(n, _)| n == name)
        .and_then(|(_, entries)| entries.get(key))
        .map(copy_entry),
    )
  }

  fn match_any(&self, key: &CacheKey) -> Result<Option<CachedResponse>> {
    let generations = self.lock()?;
    Ok(
      generations
        .iter()
        .find_map(|(_, entries)| entries.get(key))
        .map(copy_entry),
    )
  }

  fn put(&self, name: &str, key: &CacheKey, response: Response) -> Result<()> {
    let mut generations = self.lock()?;
    generation_mut(&mut generations, name).insert(key.clone(), (response, Utc::now()));
    Ok(())
  }

  fn put_all(&self, name: &str, entries: Vec<(CacheKey, Response)>) -> Result<()> {
    // A single lock acquisition makes the batch visible all at once
    let mut generations = self.lock()?;
    let now = Utc::now();
    let generation = generation_mut(&mut generations, name);
    for (key, response) in entries {
      generation.insert(key, (response, now));
    }
    Ok(())
  }

  fn entry_count(&self, name: &str) -> Result<usize> {
    let generations = self.lock()?;
    Ok(
      generations
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, entries)| entries.len())
        .unwrap_or(0),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::ResponseType;
  use reqwest::Method;
  use url::Url;

  fn key(path: &str) -> CacheKey {
    let url = Url::parse("https://partyticket.ng").unwrap().join(path).unwrap();
    CacheKey::new(&Method::GET, &url)
  }

  fn body(text: &str) -> Response {
    Response::new(200, ResponseType::Basic, "", Vec::new(), text.as_bytes().to_vec())
  }

  #[test]
  fn test_match_returns_independent_copies() {
    let storage = MemoryStorage::new();
    storage.put("v1", &key("/"), body("home")).unwrap();

    let first = storage.match_any(&key("/")).unwrap().unwrap();
    let second = storage.match_any(&key("/")).unwrap().unwrap();
    assert_eq!(first.response.into_body(), second.response.into_body());
    assert_eq!(storage.entry_count("v1").unwrap(), 1);
  }

  #[test]
  fn test_delete_and_keys() {
    let storage = MemoryStorage::new();
    storage.open("v1").unwrap();
    storage.open("v2").unwrap();
    storage.put("v3", &key("/"), body("home")).unwrap();

    assert_eq!(storage.keys().unwrap(), vec!["v1", "v2", "v3"]);
    assert!(storage.delete("v2").unwrap());
    assert!(!storage.delete("v2").unwrap());
    assert_eq!(storage.keys().unwrap(), vec!["v1", "v3"]);
  }

  #[test]
  fn test_match_in_is_scoped() {
    let storage = MemoryStorage::new();
    storage.put("v1", &key("/blog"), body("blog")).unwrap();

    assert!(storage.match_in("v1", &key("/blog")).unwrap().is_some());
    assert!(storage.match_in("v2", &key("/blog")).unwrap().is_none());
    assert_eq!(storage.entry_count("v2").unwrap(), 0);
  }
}
