//! Events the worker reacts to and what it produces for each.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use super::state::ActivationReport;
use crate::http::{Request, Response};
use crate::notify::Notification;

/// Everything the hosting runtime can deliver to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  /// JSON message posted by a page
  Message(Value),
  /// Raw push payload, if the push carried one
  Push(Option<Vec<u8>>),
  NotificationClick(Notification),
  /// Background sync registration tag
  Sync(String),
}

impl WorkerEvent {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Install => "install",
      Self::Activate => "activate",
      Self::Fetch(_) => "fetch",
      Self::Message(_) => "message",
      Self::Push(_) => "push",
      Self::NotificationClick(_) => "notificationclick",
      Self::Sync(_) => "sync",
    }
  }
}

impl fmt::Display for WorkerEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.kind())
  }
}

/// Result of dispatching a [`WorkerEvent`].
#[derive(Debug)]
pub enum EventOutcome {
  Installed,
  Activated(ActivationReport),
  Responded(FetchResult),
  /// Whether the message was recognized
  Message(bool),
  Notified(Notification),
  /// The clicked notification, now closed
  Clicked(Notification),
  /// Whether the tag was handled
  Synced(bool),
}

/// Control messages understood by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action")]
pub enum ControlMessage {
  /// Activate a waiting worker without waiting for old clients to close
  #[serde(rename = "skipWaiting")]
  SkipWaiting,
}

impl ControlMessage {
  /// Recognize a message; anything unknown yields `None`.
  pub fn parse(message: &Value) -> Option<Self> {
    Self::deserialize(message).ok()
  }
}

/// Where a fetch response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
  /// Fresh from the network
  Network,
  /// Served from cache without touching the network
  Cache,
  /// Network failed; served the offline page
  OfflinePage,
  /// Network failed; served a cached copy of the same request
  CacheFallback,
  /// Non-GET request forwarded untouched
  Passthrough,
}

impl fmt::Display for FetchSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::OfflinePage => "offline-page",
      Self::CacheFallback => "cache-fallback",
      Self::Passthrough => "passthrough",
    };
    f.write_str(s)
  }
}

/// Response handed back to the page, with metadata about its source.
#[derive(Debug)]
pub struct FetchResult {
  pub response: Response,
  pub source: FetchSource,
  /// When the response was cached (if served from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl FetchResult {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: FetchSource::Network,
      cached_at: None,
    }
  }

  pub fn passthrough(response: Response) -> Self {
    Self {
      response,
      source: FetchSource::Passthrough,
      cached_at: None,
    }
  }

  pub fn from_cache(response: Response, cached_at: DateTime<Utc>, source: FetchSource) -> Self {
    Self {
      response,
      source,
      cached_at: Some(cached_at),
    }
  }

  pub fn is_offline(&self) -> bool {
    matches!(self.source, FetchSource::OfflinePage | FetchSource::CacheFallback)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_skip_waiting() {
    assert_eq!(
      ControlMessage::parse(&json!({ "action": "skipWaiting" })),
      Some(ControlMessage::SkipWaiting)
    );
    assert_eq!(
      ControlMessage::parse(&json!({ "action": "skipWaiting", "from": "banner" })),
      Some(ControlMessage::SkipWaiting)
    );
  }

  #[test]
  fn test_parse_unknown_messages() {
    assert_eq!(ControlMessage::parse(&json!({ "action": "reload" })), None);
    assert_eq!(ControlMessage::parse(&json!({ "type": "skipWaiting" })), None);
    assert_eq!(ControlMessage::parse(&json!("skipWaiting")), None);
    assert_eq!(ControlMessage::parse(&Value::Null), None);
  }

  #[test]
  fn test_event_kinds() {
    assert_eq!(WorkerEvent::Install.kind(), "install");
    assert_eq!(WorkerEvent::Sync("sync-events".into()).to_string(), "sync");
    assert_eq!(WorkerEvent::Push(None).kind(), "push");
  }
}
