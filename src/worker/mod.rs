//! Offline cache manager: the worker that sits between the page and the network.
//!
//! The worker reacts to independent events (install, activate, fetch,
//! message, push, notification click, sync). Only the lifecycle imposes an
//! order: install stores the manifest, activate evicts older generations,
//! and fetches are served cache-first from whatever generation holds a match.
//!
//! Storage, network and display are injected, so the same worker runs
//! against SQLite and HTTP in the binary and against in-memory fakes in tests.

mod events;
mod state;

use color_eyre::{eyre::eyre, Report, Result};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStore, CachedResponse};
use crate::http::{CacheKey, Network, Request, Response};
use crate::manifest::{CACHE_NAME, MANIFEST, OFFLINE_PAGE, ROOT_PAGE, SYNC_EVENTS_TAG};
use crate::notify::{Clients, Notification};

pub use events::{ControlMessage, EventOutcome, FetchResult, FetchSource, WorkerEvent};
pub use state::{ActivationReport, GenerationState, WorkerState};

/// Mutable lifecycle bookkeeping, shared by all handlers.
struct Lifecycle {
  state: WorkerState,
  skip_waiting: bool,
  /// Generations removed by this worker's activation sweeps
  swept: HashSet<String>,
}

/// The offline cache manager.
pub struct OfflineCacheManager<S: CacheStore, N: Network, C: Clients> {
  store: S,
  network: N,
  clients: C,
  origin: Url,
  cache_name: String,
  manifest: Vec<String>,
  lifecycle: Mutex<Lifecycle>,
}

impl<S: CacheStore, N: Network, C: Clients> OfflineCacheManager<S, N, C> {
  /// Create a worker for `origin` using the compiled-in version tag and manifest.
  pub fn new(origin: Url, store: S, network: N, clients: C) -> Self {
    Self {
      store,
      network,
      clients,
      origin,
      cache_name: CACHE_NAME.to_string(),
      manifest: MANIFEST.iter().map(|p| p.to_string()).collect(),
      lifecycle: Mutex::new(Lifecycle {
        state: WorkerState::Parsed,
        skip_waiting: false,
        swept: HashSet::new(),
      }),
    }
  }

  /// Use a different version tag.
  #[cfg(test)]
  pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
    self.cache_name = name.into();
    self
  }

  /// Use a different precache manifest.
  #[cfg(test)]
  pub fn with_manifest<I, P>(mut self, paths: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<String>,
  {
    self.manifest = paths.into_iter().map(Into::into).collect();
    self
  }

  pub fn cache_name(&self) -> &str {
    &self.cache_name
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn state(&self) -> Result<WorkerState> {
    Ok(self.lifecycle()?.state)
  }

  /// Resolve a page path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }

  fn lifecycle(&self) -> Result<MutexGuard<'_, Lifecycle>> {
    self
      .lifecycle
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn set_state(&self, state: WorkerState) -> Result<()> {
    let mut lifecycle = self.lifecycle()?;
    debug!(from = %lifecycle.state, to = %state, "worker state");
    lifecycle.state = state;
    Ok(())
  }

  /// Route an event to its handler.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    debug!(event = %event, "dispatching");

    match event {
      WorkerEvent::Install => {
        self.install().await?;
        Ok(EventOutcome::Installed)
      }
      WorkerEvent::Activate => Ok(EventOutcome::Activated(self.activate().await?)),
      WorkerEvent::Fetch(request) => Ok(EventOutcome::Responded(self.handle_fetch(request).await?)),
      WorkerEvent::Message(message) => Ok(EventOutcome::Message(self.handle_message(&message).await?)),
      WorkerEvent::Push(payload) => Ok(EventOutcome::Notified(
        self.handle_push(payload.as_deref())?,
      )),
      WorkerEvent::NotificationClick(mut notification) => {
        self.handle_notification_click(&mut notification)?;
        Ok(EventOutcome::Clicked(notification))
      }
      WorkerEvent::Sync(tag) => Ok(EventOutcome::Synced(self.handle_sync(&tag).await?)),
    }
  }

  /// Store every manifest entry in the current generation, or nothing at all.
  ///
  /// All manifest fetches must succeed with an OK status before anything is
  /// written. On failure the worker becomes redundant and the generation is
  /// left as it was. A skip-waiting request received earlier activates the
  /// worker as soon as the install completes.
  pub async fn install(&self) -> Result<()> {
    {
      let mut lifecycle = self.lifecycle()?;
      match lifecycle.state {
        WorkerState::Parsed | WorkerState::Redundant => lifecycle.state = WorkerState::Installing,
        other => return Err(eyre!("Cannot install while {}", other)),
      }
    }

    info!(cache = %self.cache_name, entries = self.manifest.len(), "installing");

    match self.precache().await {
      Ok(()) => {
        info!(cache = %self.cache_name, "opened cache");
        let skip_waiting = {
          let mut lifecycle = self.lifecycle()?;
          lifecycle.state = WorkerState::Installed;
          lifecycle.skip_waiting
        };

        if skip_waiting {
          info!("skip waiting pending, activating now");
          self.activate().await?;
        }
        Ok(())
      }
      Err(e) => {
        warn!(cache = %self.cache_name, error = %e, "install failed");
        self.set_state(WorkerState::Redundant)?;
        Err(e)
      }
    }
  }

  async fn precache(&self) -> Result<()> {
    let requests = self
      .manifest
      .iter()
      .map(|path| self.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>>>()?;

    let entries = futures::future::try_join_all(requests.into_iter().map(|request| async move {
      let key = request.cache_key();
      let response = self
        .network
        .fetch(request)
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", key.url(), e))?;

      if !response.is_ok() {
        return Err(eyre!(
          "Failed to precache {}: status {}",
          key.url(),
          response.status()
        ));
      }

      Ok::<_, Report>((key, response))
    }))
    .await?;

    self.store.open(&self.cache_name)?;
    self.store.put_all(&self.cache_name, entries)
  }

  /// Delete every generation not named by the current version tag.
  ///
  /// The current generation must already be installed: sweeping without it
  /// would leave no offline cache at all. Each deletion stands alone: a
  /// failure is recorded in the report and the sweep moves on.
  pub async fn activate(&self) -> Result<ActivationReport> {
    let previous = {
      let mut lifecycle = self.lifecycle()?;
      let previous = lifecycle.state;
      match previous {
        WorkerState::Installing | WorkerState::Activating => {
          return Err(eyre!("Cannot activate while {}", previous));
        }
        WorkerState::Redundant => return Err(eyre!("Cannot activate a redundant worker")),
        _ => lifecycle.state = WorkerState::Activating,
      }
      previous
    };

    let names = match self.store.keys() {
      Ok(names) => names,
      Err(e) => {
        self.set_state(previous)?;
        return Err(e);
      }
    };

    if !names.iter().any(|n| *n == self.cache_name) {
      self.set_state(previous)?;
      return Err(eyre!(
        "Cannot activate: cache {} is not installed",
        self.cache_name
      ));
    }

    let mut report = ActivationReport::default();
    for name in names {
      if name == self.cache_name {
        report.kept.push(name);
        continue;
      }

      match self.store.delete(&name) {
        Ok(_) => {
          info!(cache = %name, "deleted stale cache");
          report.deleted.push(name);
        }
        Err(e) => {
          warn!(cache = %name, error = %e, "failed to delete stale cache");
          report.failed.push((name, e.to_string()));
        }
      }
    }

    {
      let mut lifecycle = self.lifecycle()?;
      lifecycle.swept.extend(report.deleted.iter().cloned());
      lifecycle.state = WorkerState::Activated;
    }

    info!(
      cache = %self.cache_name,
      deleted = report.deleted.len(),
      failed = report.failed.len(),
      "activated"
    );
    Ok(report)
  }

  /// Answer a page request.
  ///
  /// Non-GET requests go straight to the network. GET requests are served
  /// from cache when any generation holds a match, without touching the
  /// network. On a miss the response is fetched, and a 200 `basic` response
  /// is copied into the current generation. When the network fails,
  /// navigations get the offline page and other requests get a cached copy
  /// if one appeared in the meantime; otherwise the network error is returned.
  pub async fn handle_fetch(&self, request: Request) -> Result<FetchResult> {
    if *request.method() != Method::GET {
      debug!(method = %request.method(), url = %request.url(), "passthrough");
      let response = self.network.fetch(request).await?;
      return Ok(FetchResult::passthrough(response));
    }

    let key = request.cache_key();
    if let Some(cached) = self.lookup(&key) {
      debug!(%key, "cache hit");
      return Ok(FetchResult::from_cache(
        cached.response,
        cached.cached_at,
        FetchSource::Cache,
      ));
    }

    debug!(%key, "cache miss");

    // The original stays behind for the fallback lookup
    match self.network.fetch(request.duplicate()).await {
      Ok(response) => {
        if response.is_cacheable() {
          self.store_copy(&key, response.duplicate());
        } else {
          debug!(
            %key,
            status = response.status(),
            response_type = %response.response_type(),
            "not caching"
          );
        }
        Ok(FetchResult::from_network(response))
      }
      Err(error) => self.recover(&request, &key, error),
    }
  }

  fn recover(&self, request: &Request, key: &CacheKey, error: Report) -> Result<FetchResult> {
    if request.is_navigation() {
      let offline_key = CacheKey::new(&Method::GET, &self.resolve(OFFLINE_PAGE)?);
      return match self.lookup(&offline_key) {
        Some(cached) => {
          info!(%key, error = %error, "network failed, serving offline page");
          Ok(FetchResult::from_cache(
            cached.response,
            cached.cached_at,
            FetchSource::OfflinePage,
          ))
        }
        None => Err(error.wrap_err(format!("{} is not cached", OFFLINE_PAGE))),
      };
    }

    match self.lookup(key) {
      Some(cached) => {
        info!(%key, error = %error, "network failed, serving cached copy");
        Ok(FetchResult::from_cache(
          cached.response,
          cached.cached_at,
          FetchSource::CacheFallback,
        ))
      }
      None => Err(error),
    }
  }

  /// Cache reads never fail a fetch; a broken store behaves like a miss.
  fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
    match self.store.match_any(key) {
      Ok(cached) => cached,
      Err(e) => {
        warn!(%key, error = %e, "cache lookup failed");
        None
      }
    }
  }

  /// Caching is best-effort: a failed write is logged and the response is
  /// still returned to the page.
  fn store_copy(&self, key: &CacheKey, response: Response) {
    match self.store.put(&self.cache_name, key, response) {
      Ok(()) => debug!(%key, cache = %self.cache_name, "cached"),
      Err(e) => warn!(%key, cache = %self.cache_name, error = %e, "failed to cache response"),
    }
  }

  /// Handle a message posted by a page. Returns whether it was recognized.
  ///
  /// `{"action": "skipWaiting"}` activates an installed, waiting worker
  /// immediately. Received earlier, it takes effect when the install completes.
  pub async fn handle_message(&self, message: &Value) -> Result<bool> {
    let Some(control) = ControlMessage::parse(message) else {
      debug!(%message, "ignoring message");
      return Ok(false);
    };

    match control {
      ControlMessage::SkipWaiting => {
        let waiting = {
          let mut lifecycle = self.lifecycle()?;
          lifecycle.skip_waiting = true;
          lifecycle.state == WorkerState::Installed
        };

        if waiting {
          info!("skip waiting requested, activating now");
          self.activate().await?;
        }
      }
    }

    Ok(true)
  }

  /// Whether a page asked this worker to skip the waiting phase.
  pub fn skip_waiting_requested(&self) -> Result<bool> {
    Ok(self.lifecycle()?.skip_waiting)
  }

  /// Show the site notification for a push, using the payload as text.
  pub fn handle_push(&self, payload: Option<&[u8]>) -> Result<Notification> {
    let body = payload
      .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
      .unwrap_or_default();

    let notification = Notification::site(body);
    self.clients.show_notification(&notification)?;
    Ok(notification)
  }

  /// Close the notification and open the site root.
  pub fn handle_notification_click(&self, notification: &mut Notification) -> Result<()> {
    notification.close();
    self.clients.open_window(ROOT_PAGE)
  }

  /// Run background sync for the `sync-events` tag. Returns whether the tag
  /// was handled. An error asks the platform to retry later.
  pub async fn handle_sync(&self, tag: &str) -> Result<bool> {
    if tag != SYNC_EVENTS_TAG {
      debug!(tag, "ignoring sync tag");
      return Ok(false);
    }

    self.sync_events().await?;
    Ok(true)
  }

  async fn sync_events(&self) -> Result<()> {
    debug!("background sync: nothing queued");
    Ok(())
  }

  /// Where a named generation stands from this worker's point of view.
  pub fn generation_state(&self, name: &str) -> Result<GenerationState> {
    let lifecycle = self.lifecycle()?;

    if name == self.cache_name && lifecycle.state == WorkerState::Installing {
      return Ok(GenerationState::Installing);
    }

    let names = self.store.keys()?;
    if names.iter().any(|n| n == name) {
      // An older generation is only superseded once the current one exists
      let current_present = names.iter().any(|n| *n == self.cache_name);
      return Ok(if name != self.cache_name && current_present {
        GenerationState::Superseded
      } else {
        GenerationState::Installed
      });
    }

    if lifecycle.swept.contains(name) {
      Ok(GenerationState::Deleted)
    } else {
      Ok(GenerationState::Absent)
    }
  }
}
