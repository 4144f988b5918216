//! User-facing notifications and client windows.

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::manifest::{NOTIFICATION_BADGE, NOTIFICATION_ICON, NOTIFICATION_TITLE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOptions {
  pub body: String,
  pub icon: String,
  pub badge: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  #[serde(flatten)]
  pub options: NotificationOptions,
  #[serde(skip)]
  closed: bool,
}

impl Notification {
  pub fn new(title: impl Into<String>, options: NotificationOptions) -> Self {
    Self {
      title: title.into(),
      options,
      closed: false,
    }
  }

  /// The site's standard notification carrying a push message body.
  pub fn site(body: impl Into<String>) -> Self {
    Self::new(
      NOTIFICATION_TITLE,
      NotificationOptions {
        body: body.into(),
        icon: NOTIFICATION_ICON.to_string(),
        badge: NOTIFICATION_BADGE.to_string(),
      },
    )
  }

  pub fn close(&mut self) {
    self.closed = true;
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }
}

/// Display collaborator: shows notifications and opens client windows.
pub trait Clients: Send + Sync {
  fn show_notification(&self, notification: &Notification) -> Result<()>;

  fn open_window(&self, path: &str) -> Result<()>;
}

/// Reports notifications and window requests through the log.
pub struct LogClients {
  origin: Url,
}

impl LogClients {
  pub fn new(origin: Url) -> Self {
    Self { origin }
  }
}

impl Clients for LogClients {
  fn show_notification(&self, notification: &Notification) -> Result<()> {
    info!(
      title = %notification.title,
      body = %notification.options.body,
      icon = %notification.options.icon,
      "showing notification"
    );
    Ok(())
  }

  fn open_window(&self, path: &str) -> Result<()> {
    let url = self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid window path '{}': {}", path, e))?;
    info!(%url, "opening client window");
    Ok(())
  }
}
