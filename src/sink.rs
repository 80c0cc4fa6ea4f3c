//! # Sink
//!
//! The write-facing port of a backpressure pipe.
//!
//! The producer hands chunks to [`Sink::accept`] one at a time. Each call runs
//! the transform, pushes its output to the Source and resolves only once the
//! pipe is ready for the next chunk: immediately when the Source still has
//! capacity (or the chunk was dropped), otherwise after the consumer drains the
//! Source below its high-water mark.
//!
//! `accept` and `close` take `&mut self`, so a second transform can never start
//! while the previous one is still in flight.

use crate::coordinator::{PipeStats, Shared};
use crate::error::{BoxError, PipeError, StringError};
use crate::transformer::ChunkTransformer;
use futures::{Stream, StreamExt};
use std::pin::pin;
use tracing::{debug, trace};

/// Write-facing port of a backpressure pipe.
///
/// Dropping a Sink before [`close`](Sink::close) completes aborts the pipe: the
/// Source then yields a [`PipeError::UpstreamAbort`] instead of a clean end.
pub struct Sink<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  shared: Shared<O>,
  transformer: Box<dyn ChunkTransformer<I, O>>,
  name: String,
}

impl<I, O> Sink<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  pub(crate) fn new(shared: Shared<O>, transformer: Box<dyn ChunkTransformer<I, O>>) -> Self {
    let name = shared.lock().name().to_string();
    Self {
      shared,
      transformer,
      name,
    }
  }

  /// Transforms `chunk` and resolves once the pipe can take the next one.
  ///
  /// # Errors
  ///
  /// Returns the pipe's terminal error if the transform fails, if either port
  /// is torn down while this call is in flight, or if the pipe had already
  /// failed. Returns [`PipeError::Closed`] after [`close`](Sink::close).
  ///
  /// # Cancellation
  ///
  /// Dropping the returned future while it waits for a drain leaves its chunk
  /// buffered; the next call discards the stale wait. Dropping it while the
  /// transform runs loses that chunk, and [`stats`](Sink::stats) keeps
  /// reporting [`PipeState::Transforming`](crate::PipeState::Transforming)
  /// until the next call.
  pub async fn accept(&mut self, chunk: I) -> Result<(), PipeError> {
    let index = {
      let mut coordinator = self.shared.lock();
      coordinator.check_writable()?;
      coordinator.begin_transform()
    };
    trace!(pipe = %self.name, chunk_index = index, "transforming chunk");

    let output = self.transformer.transform(chunk).await;

    let drained = {
      let mut coordinator = self.shared.lock();
      // The Source may have been destroyed while the transform ran.
      coordinator.check_not_errored()?;
      match output {
        Err(source) => {
          let error = PipeError::transform(self.name.clone(), index, source);
          coordinator.fail(error.clone());
          return Err(error);
        }
        Ok(None) => {
          coordinator.record_drop();
          trace!(pipe = %self.name, chunk_index = index, "chunk dropped");
          return Ok(());
        }
        Ok(Some(output)) => {
          if !coordinator.emit(output) {
            return Ok(());
          }
          coordinator.suspend()
        }
      }
    };

    match drained.await {
      Ok(()) => Ok(()),
      Err(_) => Err(self.shared.lock().terminal_error()),
    }
  }

  /// Signals end-of-input, runs the flush stage and ends the Source.
  ///
  /// # Errors
  ///
  /// Returns the flush failure, the pipe's earlier terminal error, or
  /// [`PipeError::Closed`] if input was already closed.
  ///
  /// Dropping the returned future before the flush settles aborts the pipe,
  /// so the Source reports [`PipeError::UpstreamAbort`] instead of waiting
  /// for an end that will never come.
  pub async fn close(&mut self) -> Result<(), PipeError> {
    {
      let mut coordinator = self.shared.lock();
      coordinator.check_writable()?;
      coordinator.begin_flush();
    }
    debug!(pipe = %self.name, "input closed, flushing");

    let mut guard = FlushGuard {
      shared: self.shared.clone(),
      armed: true,
    };
    let output = self.transformer.flush().await;
    // Disarm before locking; the guard locks on drop.
    guard.armed = false;

    let mut coordinator = self.shared.lock();
    coordinator.check_not_errored()?;
    match output {
      Err(source) => {
        let error = PipeError::flush(self.name.clone(), source);
        coordinator.fail(error.clone());
        Err(error)
      }
      Ok(output) => {
        // Nothing follows the trailing chunk, so saturation is irrelevant here.
        if let Some(output) = output {
          coordinator.emit(output);
        }
        coordinator.end();
        Ok(())
      }
    }
  }

  /// Feeds every chunk of `input` through the pipe, then closes it.
  ///
  /// Stops at the first failure and returns it.
  pub async fn pump<S>(&mut self, input: S) -> Result<(), PipeError>
  where
    S: Stream<Item = I>,
  {
    let mut input = pin!(input);
    while let Some(chunk) = input.next().await {
      self.accept(chunk).await?;
    }
    self.close().await
  }

  /// Like [`pump`](Sink::pump), for producers that can fail.
  ///
  /// An `Err` item from `input` aborts the pipe and is reported as
  /// [`PipeError::UpstreamAbort`].
  pub async fn try_pump<S, E>(&mut self, input: S) -> Result<(), PipeError>
  where
    S: Stream<Item = Result<I, E>>,
    E: Into<BoxError>,
  {
    let mut input = pin!(input);
    while let Some(item) = input.next().await {
      match item {
        Ok(chunk) => self.accept(chunk).await?,
        Err(reason) => {
          self.abort(reason);
          return Err(self.shared.lock().terminal_error());
        }
      }
    }
    self.close().await
  }

  /// Destroys the pipe from the producer side.
  ///
  /// No flush runs; the Source yields [`PipeError::UpstreamAbort`]. Has no
  /// effect once the pipe has closed or failed.
  pub fn abort(&mut self, reason: impl Into<BoxError>) {
    self.shared.lock().fail_upstream(reason.into());
  }

  /// Returns `true` once input was closed or the pipe failed.
  pub fn is_closed(&self) -> bool {
    self.shared.lock().state().is_terminal()
  }

  /// Returns a snapshot of the pipe's counters.
  pub fn stats(&self) -> PipeStats {
    self.shared.lock().stats()
  }
}

impl<I, O> Drop for Sink<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  fn drop(&mut self) {
    let reason = StringError("sink dropped before close".to_string());
    self.shared.lock().fail_upstream(Box::new(reason));
  }
}

/// Aborts the pipe if a `close` call is dropped while its flush is in flight.
struct FlushGuard<O> {
  shared: Shared<O>,
  armed: bool,
}

impl<O> Drop for FlushGuard<O> {
  fn drop(&mut self) {
    if self.armed {
      let reason = StringError("close cancelled during flush".to_string());
      self.shared.lock().fail_upstream(Box::new(reason));
    }
  }
}
