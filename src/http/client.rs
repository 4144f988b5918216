//! Network access for the worker, backed by reqwest.

use color_eyre::{eyre::eyre, Result};
use tracing::debug;
use url::Url;

use crate::config::Config;

use super::types::{Request, RequestMode, Response, ResponseType};
use super::Network;

/// HTTP client that issues page requests against the real origin.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(config: &Config, origin: Url) -> Result<Self> {
    let mut builder = reqwest::Client::builder().user_agent(config.user_agent());
    if let Some(timeout) = config.request_timeout() {
      builder = builder.timeout(timeout);
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: Request) -> Result<Response> {
    let mode = request.mode();
    let (method, url, body) = request.into_parts();

    let mut builder = self.client.request(method.clone(), url.clone());
    if !body.is_empty() {
      builder = builder.body(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {} {}: {}", method, url, e))?;

    let final_url = response.url().clone();
    let response_type = classify(&self.origin, mode, &final_url)
      .ok_or_else(|| eyre!("Cross-origin response for same-origin request {}", url))?;

    if response_type == ResponseType::Opaque {
      debug!(url = %final_url, "opaque response, discarding body");
      return Ok(Response::opaque(final_url.as_str()));
    }

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", final_url, e))?
      .to_vec();

    debug!(%method, url = %final_url, status, %response_type, bytes = body.len(), "network response");

    Ok(Response::new(status, response_type, final_url.as_str(), headers, body))
  }
}

/// Classify a response by where it finally came from.
///
/// Returns `None` when a same-origin request ended up cross-origin, which the
/// page treats as a network error.
fn classify(origin: &Url, mode: RequestMode, final_url: &Url) -> Option<ResponseType> {
  if final_url.origin() == origin.origin() {
    return Some(ResponseType::Basic);
  }

  match mode {
    RequestMode::SameOrigin => None,
    RequestMode::NoCors => Some(ResponseType::Opaque),
    RequestMode::Cors | RequestMode::Navigate => Some(ResponseType::Cors),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_same_origin_is_basic() {
    let origin = url("https://partyticket.ng/");
    for mode in [
      RequestMode::Navigate,
      RequestMode::SameOrigin,
      RequestMode::NoCors,
      RequestMode::Cors,
    ] {
      assert_eq!(
        classify(&origin, mode, &url("https://partyticket.ng/events?page=2")),
        Some(ResponseType::Basic)
      );
    }
  }

  #[test]
  fn test_cross_origin_by_mode() {
    let origin = url("https://partyticket.ng/");
    let cdn = url("https://cdn.jsdelivr.net/npm/bootstrap.css");
    assert_eq!(classify(&origin, RequestMode::NoCors, &cdn), Some(ResponseType::Opaque));
    assert_eq!(classify(&origin, RequestMode::Cors, &cdn), Some(ResponseType::Cors));
    assert_eq!(classify(&origin, RequestMode::SameOrigin, &cdn), None);
  }

  #[test]
  fn test_port_is_part_of_origin() {
    let origin = url("http://localhost:5000/");
    assert_eq!(
      classify(&origin, RequestMode::Cors, &url("http://localhost:8080/")),
      Some(ResponseType::Cors)
    );
  }
}
