//! # Backpressure Transform
//!
//! [`BackpressureTransform`] builds a connected `(Sink, Source)` pair around a
//! [`ChunkTransformer`].
//!
//! ## Example
//!
//! ```rust
//! use futures::{StreamExt, stream};
//! use streamweave_backpressure::{BackpressureTransform, BoxError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut sink, source) = BackpressureTransform::new(|chunk: String| async move {
//!   Ok::<_, BoxError>(Some(chunk.to_uppercase()))
//! })
//! .with_flush(|| async { Ok::<_, BoxError>(Some(" The end.".to_string())) })
//! .with_high_water_mark(4)
//! .build();
//!
//! let producer = tokio::spawn(async move {
//!   sink.pump(stream::iter(vec!["Hello, world.".to_string()])).await
//! });
//! let output: Vec<_> = source.collect().await;
//! producer.await??;
//!
//! assert_eq!(output.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::config::PipeConfig;
use crate::coordinator::Shared;
use crate::error::BoxError;
use crate::sink::Sink;
use crate::source::Source;
use crate::transformer::{ChunkTransformer, FnTransformer, Identity, WithFlush};
use bytes::Bytes;
use std::future::Future;
use tracing::debug;

/// Builder for a backpressure-aware transform pipe.
///
/// The transform defaults to identity (see [`passthrough`](Self::passthrough)),
/// the flush stage to a no-op and the configuration to [`PipeConfig::default`].
pub struct BackpressureTransform<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  transformer: Box<dyn ChunkTransformer<I, O>>,
  config: PipeConfig<O>,
}

impl<C> BackpressureTransform<C, C>
where
  C: Send + 'static,
{
  /// Creates a pipe that forwards chunks unchanged, still honoring backpressure.
  pub fn passthrough() -> Self {
    Self::from_transformer(Identity)
  }
}

impl BackpressureTransform<Bytes, Bytes> {
  /// Creates a byte pipe whose Source saturates by buffered byte count, with
  /// the [`PipeConfig::bytes`] defaults.
  pub fn for_bytes<F, Fut, E>(transform: F) -> Self
  where
    F: FnMut(Bytes) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<Bytes>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    Self::new(transform).with_config(PipeConfig::bytes())
  }
}

impl<I, O> BackpressureTransform<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  /// Creates a pipe that runs `transform` on every chunk.
  ///
  /// Returning `Ok(None)` drops the chunk from the output.
  pub fn new<F, Fut, E>(transform: F) -> Self
  where
    F: FnMut(I) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<O>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    Self::from_transformer(FnTransformer::new(transform))
  }

  /// Creates a pipe driving an existing transformer.
  pub fn from_transformer<T>(transformer: T) -> Self
  where
    T: ChunkTransformer<I, O> + 'static,
  {
    Self {
      transformer: Box::new(transformer),
      config: PipeConfig::default(),
    }
  }

  /// Runs `flush` once after input ends; `Some` output becomes the last chunk.
  pub fn with_flush<F, Fut, E>(self, flush: F) -> Self
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<O>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    Self {
      transformer: Box::new(WithFlush::new(self.transformer, flush)),
      config: self.config,
    }
  }

  /// Replaces the whole configuration.
  pub fn with_config(mut self, config: PipeConfig<O>) -> Self {
    self.config = config;
    self
  }

  /// Sets the high-water mark at or above which the Source reports saturation.
  pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
    self.config = self.config.with_high_water_mark(high_water_mark);
    self
  }

  /// Sets the name used in logs and error context.
  pub fn with_name(mut self, name: String) -> Self {
    self.config = self.config.with_name(name);
    self
  }

  /// Returns the current configuration.
  pub fn config(&self) -> &PipeConfig<O> {
    &self.config
  }

  /// Creates the connected write-facing and read-facing ports.
  pub fn build(self) -> (Sink<I, O>, Source<O>) {
    debug!(
      pipe = %self.config.name(),
      high_water_mark = self.config.high_water_mark,
      "building backpressure transform"
    );
    let shared = Shared::new(self.config);
    (Sink::new(shared.clone(), self.transformer), Source::new(shared))
  }
}
