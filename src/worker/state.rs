//! Lifecycle states for the worker and its cache generations.

use std::fmt;

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Constructed, install not yet attempted
  Parsed,
  Installing,
  /// Manifest stored; waiting to take over from the previous worker
  Installed,
  Activating,
  /// Controlling pages
  Activated,
  /// Install failed; a new install attempt is required
  Redundant,
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Parsed => "parsed",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Activated => "activated",
      Self::Redundant => "redundant",
    };
    f.write_str(s)
  }
}

/// State of one named cache generation, as seen by this worker.
///
/// `Absent -> Installing -> Installed -> Superseded -> Deleted`. A failed
/// install goes back to `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
  Absent,
  Installing,
  /// Present and in use: the current version tag, or an older tag while the
  /// current one is not installed yet
  Installed,
  /// Present under an older name after the current generation was
  /// installed, awaiting the next activation sweep
  Superseded,
  /// Removed by an activation sweep of this worker
  Deleted,
}

impl fmt::Display for GenerationState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Absent => "absent",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Superseded => "superseded",
      Self::Deleted => "deleted",
    };
    f.write_str(s)
  }
}

/// Outcome of an activation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Generations left in place (the current one, if present)
  pub kept: Vec<String>,
  pub deleted: Vec<String>,
  /// Stale generations whose deletion failed, with the error message
  pub failed: Vec<(String, String)>,
}

impl ActivationReport {
  pub fn is_clean(&self) -> bool {
    self.failed.is_empty()
  }
}
