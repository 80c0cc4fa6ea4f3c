//! # Error Handling
//!
//! Errors surfaced by both ports of a backpressure pipe.
//!
//! ## Overview
//!
//! A single failure is terminal for the whole pipe instance. Whichever side
//! observes it first records a [`PipeError`] in the shared coordinator; the
//! Sink then rejects the call in flight and every later call with that error,
//! and the Source yields it exactly once before ending.
//!
//! ## Error Types
//!
//! - **Transform**: the transform operation failed for a given chunk
//! - **Flush**: the flush operation failed; the Source never reports a clean end
//! - **Downstream**: the Source was destroyed or dropped by the consumer
//! - **UpstreamAbort**: the Sink was aborted or dropped before input closed normally
//! - **Closed**: a chunk was written after input was closed
//!
//! Because the same failure is reported on two ports, the underlying cause is
//! held as a [`SharedError`] and `PipeError` is cheap to clone.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by transform and flush operations.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Reference-counted error shared between the Sink and the Source.
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// A simple error type that wraps a string message.
///
/// Used as the cause when a port is dropped without an explicit reason.
#[derive(Debug, Clone, PartialEq)]
pub struct StringError(pub String);

impl fmt::Display for StringError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Error for StringError {}

/// Context information about when and where an error occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
  /// The timestamp when the error occurred.
  pub timestamp: chrono::DateTime<chrono::Utc>,
  /// The name of the pipe that encountered the error.
  pub component_name: String,
}

impl ErrorContext {
  /// Creates a context for `component_name` stamped with the current time.
  pub fn new(component_name: String) -> Self {
    Self {
      timestamp: chrono::Utc::now(),
      component_name,
    }
  }
}

/// Terminal failure of a backpressure pipe.
#[derive(Debug, Clone, Error)]
pub enum PipeError {
  /// The transform operation failed.
  #[error("transform failed in {} on chunk {chunk_index}: {source}", .context.component_name)]
  Transform {
    /// Where and when the failure happened.
    context: ErrorContext,
    /// Zero-based index of the input chunk being transformed.
    chunk_index: u64,
    /// The error returned by the transform.
    #[source]
    source: SharedError,
  },
  /// The flush operation failed.
  #[error("flush failed in {}: {source}", .context.component_name)]
  Flush {
    /// Where and when the failure happened.
    context: ErrorContext,
    /// The error returned by the flush.
    #[source]
    source: SharedError,
  },
  /// The consumer destroyed the read-facing port.
  #[error("downstream of {} failed: {source}", .context.component_name)]
  Downstream {
    /// Where and when the failure happened.
    context: ErrorContext,
    /// Why the consumer gave up.
    #[source]
    source: SharedError,
  },
  /// The producer destroyed the write-facing port before closing it.
  #[error("upstream of {} aborted: {source}", .context.component_name)]
  UpstreamAbort {
    /// Where and when the failure happened.
    context: ErrorContext,
    /// Why the producer gave up.
    #[source]
    source: SharedError,
  },
  /// A chunk was written, or the input closed, after input was already closed.
  #[error("write after end")]
  Closed,
}

impl PipeError {
  pub(crate) fn transform(component_name: String, chunk_index: u64, source: BoxError) -> Self {
    Self::Transform {
      context: ErrorContext::new(component_name),
      chunk_index,
      source: Arc::from(source),
    }
  }

  pub(crate) fn flush(component_name: String, source: BoxError) -> Self {
    Self::Flush {
      context: ErrorContext::new(component_name),
      source: Arc::from(source),
    }
  }

  pub(crate) fn downstream(component_name: String, source: BoxError) -> Self {
    Self::Downstream {
      context: ErrorContext::new(component_name),
      source: Arc::from(source),
    }
  }

  pub(crate) fn upstream_abort(component_name: String, source: BoxError) -> Self {
    Self::UpstreamAbort {
      context: ErrorContext::new(component_name),
      source: Arc::from(source),
    }
  }

  /// Returns the error context, if this error carries one.
  pub fn context(&self) -> Option<&ErrorContext> {
    match self {
      Self::Transform { context, .. }
      | Self::Flush { context, .. }
      | Self::Downstream { context, .. }
      | Self::UpstreamAbort { context, .. } => Some(context),
      Self::Closed => None,
    }
  }

  /// Returns the cause shared by both ports, if any.
  pub fn cause(&self) -> Option<&SharedError> {
    match self {
      Self::Transform { source, .. }
      | Self::Flush { source, .. }
      | Self::Downstream { source, .. }
      | Self::UpstreamAbort { source, .. } => Some(source),
      Self::Closed => None,
    }
  }
}
