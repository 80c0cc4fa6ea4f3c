//! Shared state behind the Sink and Source handles.
//!
//! The [`Coordinator`] owns the Source buffer, the lifecycle state and the
//! single suspended-acceptance slot. Both ports hold a [`Shared`] handle to
//! the same coordinator; neither port references the other directly.
//!
//! Locks are taken only for bookkeeping and are never held across an `.await`.

use crate::config::PipeConfig;
use crate::error::{BoxError, PipeError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Lifecycle state of a pipe instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
  /// Ready to accept the next chunk.
  Idle,
  /// A transform is in flight.
  Transforming,
  /// The last emit saturated the Source; the producer waits for a drain.
  AwaitingDrain,
  /// Input closed; the flush operation is in flight.
  Flushing,
  /// Flush finished and end-of-output was signaled.
  Closed,
  /// A failure tore the pipe down.
  Errored,
}

impl PipeState {
  /// Returns `true` once no further transitions are possible.
  pub fn is_terminal(self) -> bool {
    matches!(self, PipeState::Closed | PipeState::Errored)
  }
}

/// Point-in-time counters for a pipe instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeStats {
  /// Current lifecycle state.
  pub state: PipeState,
  /// Input chunks handed to the transform.
  pub accepted: u64,
  /// Chunks pushed to the Source, including the flush output.
  pub emitted: u64,
  /// Chunks that produced no output: the transform returned `None`, or the
  /// sizer measured the output as zero.
  pub dropped: u64,
  /// Chunks buffered in the Source and not yet read.
  pub buffered_chunks: usize,
  /// Buffered size as measured by the configured sizer.
  pub buffered_size: usize,
}

pub(crate) struct Coordinator<O> {
  config: PipeConfig<O>,
  name: String,
  state: PipeState,
  error: Option<PipeError>,
  error_delivered: bool,
  buffer: VecDeque<(O, usize)>,
  buffered_size: usize,
  suspended: Option<oneshot::Sender<()>>,
  reader: Option<Waker>,
  accepted: u64,
  emitted: u64,
  dropped: u64,
}

/// Handle to a coordinator shared by both ports.
pub(crate) struct Shared<O>(Arc<Mutex<Coordinator<O>>>);

impl<O> Clone for Shared<O> {
  fn clone(&self) -> Self {
    Self(self.0.clone())
  }
}

impl<O> Shared<O> {
  pub(crate) fn new(config: PipeConfig<O>) -> Self {
    Self(Arc::new(Mutex::new(Coordinator::new(config))))
  }

  // A panic inside a sizer must not wedge the other port.
  pub(crate) fn lock(&self) -> MutexGuard<'_, Coordinator<O>> {
    self.0.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl<O> Coordinator<O> {
  fn new(config: PipeConfig<O>) -> Self {
    let name = config.name();
    Self {
      config,
      name,
      state: PipeState::Idle,
      error: None,
      error_delivered: false,
      buffer: VecDeque::new(),
      buffered_size: 0,
      suspended: None,
      reader: None,
      accepted: 0,
      emitted: 0,
      dropped: 0,
    }
  }

  pub(crate) fn name(&self) -> &str {
    &self.name
  }

  pub(crate) fn state(&self) -> PipeState {
    self.state
  }

  /// Fails unless the write-facing port may start a transform or flush.
  pub(crate) fn check_writable(&mut self) -> Result<(), PipeError> {
    match self.state {
      PipeState::Errored => Err(self.terminal_error()),
      PipeState::Flushing | PipeState::Closed => Err(PipeError::Closed),
      PipeState::AwaitingDrain => {
        // The previous accept future was dropped while it waited for a drain.
        self.suspended = None;
        Ok(())
      }
      PipeState::Idle | PipeState::Transforming => Ok(()),
    }
  }

  /// Returns the error every later call on either port reports.
  pub(crate) fn terminal_error(&self) -> PipeError {
    self.error.clone().unwrap_or(PipeError::Closed)
  }

  /// Returns the recorded failure if the pipe was torn down.
  pub(crate) fn check_not_errored(&self) -> Result<(), PipeError> {
    match &self.error {
      Some(error) => Err(error.clone()),
      None => Ok(()),
    }
  }

  /// Marks a transform as in flight and returns the chunk's index.
  pub(crate) fn begin_transform(&mut self) -> u64 {
    let index = self.accepted;
    self.accepted += 1;
    self.state = PipeState::Transforming;
    index
  }

  pub(crate) fn begin_flush(&mut self) {
    self.state = PipeState::Flushing;
  }

  /// Records a chunk that produced no output.
  pub(crate) fn record_drop(&mut self) {
    self.dropped += 1;
    if self.state == PipeState::Transforming {
      self.state = PipeState::Idle;
    }
  }

  /// Appends a chunk for the consumer and reports whether the Source is now
  /// saturated.
  ///
  /// A chunk the sizer measures as zero is discarded and counted as dropped;
  /// it would otherwise occupy the buffer without moving it toward the mark.
  pub(crate) fn emit(&mut self, chunk: O) -> bool {
    let size = self.config.measure(&chunk);
    if size == 0 {
      trace!(pipe = %self.name, "discarding zero-size chunk");
      self.record_drop();
      return false;
    }
    self.buffer.push_back((chunk, size));
    self.buffered_size += size;
    self.emitted += 1;
    self.wake_reader();

    let saturated = self.buffered_size >= self.config.high_water_mark;
    if self.state == PipeState::Transforming {
      self.state = PipeState::Idle;
    }
    trace!(
      pipe = %self.name,
      buffered = self.buffered_size,
      high_water_mark = self.config.high_water_mark,
      saturated,
      "emitted chunk"
    );
    saturated
  }

  /// Parks the producer until the next drain signal.
  ///
  /// The slot holds at most one continuation; a stale one left behind by a
  /// cancelled accept is replaced.
  pub(crate) fn suspend(&mut self) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    self.suspended = Some(tx);
    self.state = PipeState::AwaitingDrain;
    debug!(pipe = %self.name, buffered = self.buffered_size, "source saturated, awaiting drain");
    rx
  }

  /// Resolves the suspended acceptance, if any.
  fn signal_drain(&mut self) {
    if let Some(continuation) = self.suspended.take() {
      trace!(pipe = %self.name, buffered = self.buffered_size, "source drained");
      self.state = PipeState::Idle;
      // The receiver is gone if the waiting accept was cancelled.
      let _ = continuation.send(());
    }
  }

  /// Marks end-of-output after the flush stage.
  pub(crate) fn end(&mut self) {
    self.state = PipeState::Closed;
    debug!(pipe = %self.name, emitted = self.emitted, "end of output");
    self.wake_reader();
  }

  /// Tears the pipe down with `error`.
  ///
  /// The first failure wins; returns `false` if the pipe had already reached a
  /// terminal state. A suspended producer is released unresolved, so its
  /// accept call reports `error` instead of hanging.
  pub(crate) fn fail(&mut self, error: PipeError) -> bool {
    if self.state.is_terminal() {
      return false;
    }
    warn!(pipe = %self.name, error = %error, "pipe torn down");
    self.state = PipeState::Errored;
    self.error = Some(error);
    self.suspended = None;
    self.buffer.clear();
    self.buffered_size = 0;
    self.wake_reader();
    true
  }

  pub(crate) fn fail_downstream(&mut self, reason: BoxError) -> bool {
    let error = PipeError::downstream(self.name.clone(), reason);
    self.fail(error)
  }

  pub(crate) fn fail_upstream(&mut self, reason: BoxError) -> bool {
    let error = PipeError::upstream_abort(self.name.clone(), reason);
    self.fail(error)
  }

  /// Consumer-side poll: yields the next chunk, the terminal error once, or end.
  pub(crate) fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<O, PipeError>>> {
    if self.state == PipeState::Errored {
      if self.error_delivered {
        return Poll::Ready(None);
      }
      self.error_delivered = true;
      return Poll::Ready(Some(Err(self.terminal_error())));
    }

    if let Some((chunk, size)) = self.buffer.pop_front() {
      self.buffered_size -= size;
      if self.buffered_size < self.config.high_water_mark {
        self.signal_drain();
      }
      return Poll::Ready(Some(Ok(chunk)));
    }

    if self.state == PipeState::Closed {
      return Poll::Ready(None);
    }

    // Empty buffer: the consumer is asking for more.
    self.signal_drain();
    self.reader = Some(cx.waker().clone());
    Poll::Pending
  }

  /// Returns `true` once the Source will never yield another item.
  pub(crate) fn is_terminated(&self) -> bool {
    match self.state {
      PipeState::Errored => self.error_delivered,
      PipeState::Closed => self.buffer.is_empty(),
      _ => false,
    }
  }

  pub(crate) fn stats(&self) -> PipeStats {
    PipeStats {
      state: self.state,
      accepted: self.accepted,
      emitted: self.emitted,
      dropped: self.dropped,
      buffered_chunks: self.buffer.len(),
      buffered_size: self.buffered_size,
    }
  }

  fn wake_reader(&mut self) {
    if let Some(waker) = self.reader.take() {
      waker.wake();
    }
  }
}
