use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Site the worker fronts, e.g. https://partyticket.ng
  #[serde(default, deserialize_with = "deserialize_origin")]
  pub origin: Option<Url>,
  /// SQLite file holding cache generations (defaults to the data directory)
  pub cache_path: Option<PathBuf>,
  /// Network requests exceeding this are treated as failed
  pub request_timeout_secs: Option<u64>,
  pub user_agent: Option<String>,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Directory for log files (defaults to the data directory)
  pub directory: Option<PathBuf>,
  /// tracing filter directive, overridden by TICKETCACHE_LOG
  pub filter: Option<String>,
}

fn deserialize_origin<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let raw: Option<String> = Option::deserialize(deserializer)?;
  raw
    .map(|s| parse_origin(&s).map_err(serde::de::Error::custom))
    .transpose()
}

/// Parse an http(s) origin, discarding any path, query or fragment.
pub fn parse_origin(s: &str) -> Result<Url> {
  let mut url = Url::parse(s.trim()).map_err(|e| eyre!("Invalid origin '{}': {}", s, e))?;

  if !matches!(url.scheme(), "http" | "https") {
    return Err(eyre!("Origin '{}' must use http or https", s));
  }

  url.set_path("/");
  url.set_query(None);
  url.set_fragment(None);
  Ok(url)
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ticketcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ticketcache/config.yaml
  ///
  /// A missing file is not an error: the origin can still come from the
  /// command line or the environment.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ticketcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ticketcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Resolve the origin: command line first, then TICKETCACHE_ORIGIN, then the file.
  pub fn resolve_origin(&mut self, cli_origin: Option<&str>) -> Result<Url> {
    let origin = match cli_origin {
      Some(s) => parse_origin(s)?,
      None => match std::env::var("TICKETCACHE_ORIGIN") {
        Ok(s) => parse_origin(&s)?,
        Err(_) => self.origin.clone().ok_or_else(|| {
          eyre!(
            "No origin configured. Pass --origin, set TICKETCACHE_ORIGIN, or add `origin:` \
             to ~/.config/ticketcache/config.yaml"
          )
        })?,
      },
    };

    self.origin = Some(origin.clone());
    Ok(origin)
  }

  pub fn request_timeout(&self) -> Option<Duration> {
    self.request_timeout_secs.map(Duration::from_secs)
  }

  pub fn user_agent(&self) -> String {
    self
      .user_agent
      .clone()
      .unwrap_or_else(|| format!("ticketcache/{}", env!("CARGO_PKG_VERSION")))
  }

  /// Get the data directory for the cache database and logs.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("ticketcache"))
  }

  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache_path {
      Some(p) => Ok(p.clone()),
      None => Ok(Self::data_dir()?.join("cache.db")),
    }
  }

  pub fn log_dir(&self) -> Result<PathBuf> {
    match &self.log.directory {
      Some(p) => Ok(p.clone()),
      None => Self::data_dir(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_full_config() {
    let config = Config::parse(
      r#"
origin: https://partyticket.ng/some/page?x=1
cache_path: /tmp/ticketcache.db
request_timeout_secs: 15
user_agent: partyticket-offline
log:
  filter: debug
"#,
    )
    .unwrap();

    assert_eq!(
      config.origin.as_ref().map(Url::as_str),
      Some("https://partyticket.ng/")
    );
    assert_eq!(config.cache_path().unwrap(), PathBuf::from("/tmp/ticketcache.db"));
    assert_eq!(config.request_timeout(), Some(Duration::from_secs(15)));
    assert_eq!(config.user_agent(), "partyticket-offline");
    assert_eq!(config.log.filter.as_deref(), Some("debug"));
  }

  #[test]
  fn test_parse_empty_config() {
    let config = Config::parse("{}").unwrap();
    assert!(config.origin.is_none());
    assert!(config.request_timeout().is_none());
    assert!(config.user_agent().starts_with("ticketcache/"));
  }

  #[test]
  fn test_rejects_non_http_origin() {
    assert!(Config::parse("origin: ftp://partyticket.ng").is_err());
    assert!(parse_origin("not a url").is_err());
  }

  #[test]
  fn test_cli_origin_wins() {
    let mut config = Config::parse("origin: https://partyticket.ng").unwrap();
    let origin = config.resolve_origin(Some("http://localhost:5000")).unwrap();
    assert_eq!(origin.as_str(), "http://localhost:5000/");
    assert_eq!(config.origin, Some(origin));
  }

  #[test]
  fn test_missing_explicit_file_is_error() {
    let err = Config::load(Some(Path::new("/nonexistent/ticketcache.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
