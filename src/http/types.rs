//! Request and response values that flow through the offline cache.
//!
//! Neither [`Request`] nor [`Response`] implements `Clone`. Their bodies are
//! treated as single-read: a value handed to the network or to the store is
//! consumed. Any path that needs to both forward and keep a value must call
//! `duplicate()` first and hand over the copy.

use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// How a request was initiated by the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Full document load
  Navigate,
  SameOrigin,
  NoCors,
  #[default]
  Cors,
}

/// Response classification, as seen by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin response with readable status, headers and body
  Basic,
  /// Cross-origin response obtained in cors mode
  Cors,
  /// Cross-origin response in no-cors mode; status and body are hidden
  Opaque,
  OpaqueRedirect,
  Error,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
      Self::OpaqueRedirect => "opaqueredirect",
      Self::Error => "error",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(Self::Basic),
      "cors" => Some(Self::Cors),
      "opaque" => Some(Self::Opaque),
      "opaqueredirect" => Some(Self::OpaqueRedirect),
      "error" => Some(Self::Error),
      _ => None,
    }
  }
}

impl fmt::Display for ResponseType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Normalized lookup key for a cache entry: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  method: String,
  url: String,
}

impl CacheKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_string(),
      url: url.to_string(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable, fixed-length digest used as the storage key.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// An outgoing request issued by the page.
#[derive(Debug)]
pub struct Request {
  method: Method,
  url: Url,
  mode: RequestMode,
  body: Vec<u8>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      mode: RequestMode::default(),
      body: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_body(mut self, body: Vec<u8>) -> Self {
    self.body = body;
    self
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn mode(&self) -> RequestMode {
    self.mode
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  pub fn cache_key(&self) -> CacheKey {
    CacheKey::new(&self.method, &self.url)
  }

  /// Independent copy of this request, including its body.
  pub fn duplicate(&self) -> Self {
    Self {
      method: self.method.clone(),
      url: self.url.clone(),
      mode: self.mode,
      body: self.body.clone(),
    }
  }

  /// Consume the request, yielding method, URL and body.
  pub fn into_parts(self) -> (Method, Url, Vec<u8>) {
    (self.method, self.url, self.body)
  }
}

/// A captured response: status, classification, headers and full body.
#[derive(Debug)]
pub struct Response {
  status: u16,
  response_type: ResponseType,
  url: String,
  headers: Vec<(String, String)>,
  body: Vec<u8>,
}

impl Response {
  pub fn new(
    status: u16,
    response_type: ResponseType,
    url: impl Into<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
  ) -> Self {
    Self {
      status,
      response_type,
      url: url.into(),
      headers,
      body,
    }
  }

  /// Opaque responses expose no status, headers or body to the page.
  pub fn opaque(url: impl Into<String>) -> Self {
    Self::new(0, ResponseType::Opaque, url, Vec::new(), Vec::new())
  }

  pub fn status(&self) -> u16 {
    self.status
  }

  pub fn response_type(&self) -> ResponseType {
    self.response_type
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn headers(&self) -> &[(String, String)] {
    &self.headers
  }

  /// First header value with the given name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn body(&self) -> &[u8] {
    &self.body
  }

  pub fn into_body(self) -> Vec<u8> {
    self.body
  }

  /// Status in the 200-299 range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only plain same-origin 200 responses may enter the cache.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.response_type == ResponseType::Basic
  }

  /// Independent copy of this response, including its body.
  pub fn duplicate(&self) -> Self {
    Self {
      status: self.status,
      response_type: self.response_type,
      url: self.url.clone(),
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_cache_key_drops_fragment() {
    let a = CacheKey::new(&Method::GET, &url("https://partyticket.ng/events#top"));
    let b = CacheKey::new(&Method::GET, &url("https://partyticket.ng/events"));
    assert_eq!(a, b);
    assert_eq!(a.digest(), b.digest());
  }

  #[test]
  fn test_cache_key_distinguishes_method() {
    let get = CacheKey::new(&Method::GET, &url("https://partyticket.ng/events"));
    let post = CacheKey::new(&Method::POST, &url("https://partyticket.ng/events"));
    assert_ne!(get, post);
    assert_ne!(get.digest(), post.digest());
  }

  #[test]
  fn test_cache_key_keeps_query() {
    let a = CacheKey::new(&Method::GET, &url("https://partyticket.ng/events?page=1"));
    let b = CacheKey::new(&Method::GET, &url("https://partyticket.ng/events?page=2"));
    assert_ne!(a, b);
  }

  #[test]
  fn test_cacheable_requires_200_basic() {
    let ok = Response::new(200, ResponseType::Basic, "/", Vec::new(), Vec::new());
    let created = Response::new(201, ResponseType::Basic, "/", Vec::new(), Vec::new());
    let cors = Response::new(200, ResponseType::Cors, "/", Vec::new(), Vec::new());
    assert!(ok.is_cacheable());
    assert!(!created.is_cacheable());
    assert!(created.is_ok());
    assert!(!cors.is_cacheable());
    assert!(!Response::opaque("https://cdn.example/x.js").is_cacheable());
  }

  #[test]
  fn test_duplicate_is_independent() {
    let original = Response::new(
      200,
      ResponseType::Basic,
      "https://partyticket.ng/",
      vec![("Content-Type".into(), "text/html".into())],
      b"<html>".to_vec(),
    );
    let copy = original.duplicate();
    assert_eq!(original.into_body(), copy.body());
    assert_eq!(copy.header("content-type"), Some("text/html"));
  }

  #[test]
  fn test_response_type_parse() {
    for ty in [
      ResponseType::Basic,
      ResponseType::Cors,
      ResponseType::Opaque,
      ResponseType::OpaqueRedirect,
      ResponseType::Error,
    ] {
      assert_eq!(ResponseType::parse(ty.as_str()), Some(ty));
    }
    assert_eq!(ResponseType::parse("bogus"), None);
  }
}
