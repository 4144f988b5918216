//! Page-facing HTTP primitives and the network seam the worker fetches through.

mod client;
mod types;

use color_eyre::Result;
use std::future::Future;

pub use client::HttpNetwork;
pub use types::{CacheKey, Request, RequestMode, Response, ResponseType};

/// Network collaborator.
///
/// `fetch` consumes the request. It fails on connectivity or protocol errors;
/// HTTP error statuses are successful fetches.
pub trait Network: Send + Sync {
  fn fetch(&self, request: Request) -> impl Future<Output = Result<Response>> + Send;
}
