//! # Source
//!
//! The read-facing port of a backpressure pipe.
//!
//! A [`Source`] is a [`Stream`] of transformed chunks. Every poll that leaves
//! the buffer below the high-water mark is the drain signal: it releases a
//! producer parked in [`Sink::accept`](crate::Sink::accept). A consumer that
//! stops polling therefore stops the producer after at most one buffer's worth
//! of output.
//!
//! The stream ends with `None` after the flush stage completes. If the pipe
//! fails, it yields exactly one `Err` and then `None`, never a clean end.

use crate::coordinator::{PipeStats, Shared};
use crate::error::{BoxError, PipeError, StringError};
use futures::Stream;
use futures::stream::FusedStream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Read-facing port of a backpressure pipe.
///
/// Dropping a Source before it is exhausted destroys the pipe: the Sink then
/// fails with [`PipeError::Downstream`].
pub struct Source<O> {
  shared: Shared<O>,
}

impl<O> Source<O> {
  pub(crate) fn new(shared: Shared<O>) -> Self {
    Self { shared }
  }

  /// Destroys the pipe from the consumer side.
  ///
  /// Buffered chunks are discarded, a producer waiting for a drain is released
  /// with [`PipeError::Downstream`] and every later `accept` fails with it.
  /// Has no effect once the pipe has closed or failed.
  pub fn destroy(&mut self, reason: impl Into<BoxError>) {
    self.shared.lock().fail_downstream(reason.into());
  }

  /// Returns a snapshot of the pipe's counters.
  pub fn stats(&self) -> PipeStats {
    self.shared.lock().stats()
  }
}

impl<O> Stream for Source<O> {
  type Item = Result<O, PipeError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.shared.lock().poll_next(cx)
  }
}

impl<O> FusedStream for Source<O> {
  fn is_terminated(&self) -> bool {
    self.shared.lock().is_terminated()
  }
}

impl<O> Drop for Source<O> {
  fn drop(&mut self) {
    let reason = StringError("source dropped".to_string());
    self.shared.lock().fail_downstream(Box::new(reason));
  }
}
