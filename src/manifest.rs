//! Compiled-in cache version and precache manifest.
//!
//! Bump [`CACHE_NAME`] whenever [`MANIFEST`] or the caching policy changes:
//! activation deletes every generation with a different name.

/// Current cache generation.
pub const CACHE_NAME: &str = "partyticket-v1";

/// Served for navigations when the network is unreachable.
pub const OFFLINE_PAGE: &str = "/offline";

pub const ROOT_PAGE: &str = "/";

/// Paths stored on install, in order.
pub const MANIFEST: &[&str] = &[
  ROOT_PAGE,
  "/static/css/style.css",
  "/static/js/script.js",
  "/static/images/logo.png",
  "/static/images/favicon.png",
  OFFLINE_PAGE,
  "/events",
  "/blog",
];

pub const NOTIFICATION_TITLE: &str = "PartyTicket Notification";
pub const NOTIFICATION_ICON: &str = "/static/images/logo.png";
pub const NOTIFICATION_BADGE: &str = "/static/images/favicon.png";

/// Background sync registration handled by the worker.
pub const SYNC_EVENTS_TAG: &str = "sync-events";

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_manifest_contains_offline_page() {
    assert!(MANIFEST.contains(&OFFLINE_PAGE));
    assert!(MANIFEST.contains(&ROOT_PAGE));
  }

  #[test]
  fn test_manifest_has_no_duplicates() {
    let mut paths = MANIFEST.to_vec();
    paths.sort_unstable();
    paths.dedup();
    assert_eq!(paths.len(), MANIFEST.len());
  }

  #[test]
  fn test_notification_images_are_precached() {
    assert!(MANIFEST.contains(&NOTIFICATION_ICON));
    assert!(MANIFEST.contains(&NOTIFICATION_BADGE));
  }
}
