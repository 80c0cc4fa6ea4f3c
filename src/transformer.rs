//! # Chunk Transformer Trait
//!
//! This module defines [`ChunkTransformer`], the per-chunk operation a
//! backpressure pipe drives, along with adapters for building one from plain
//! async closures.
//!
//! ## Overview
//!
//! A transformer has two operations:
//!
//! - **transform**: maps one input chunk to `Some(output)` or `None` (drop)
//! - **flush**: runs once after input ends, may return one trailing chunk
//!
//! The pipe never calls either operation concurrently with itself or the
//! other, so implementations may keep plain mutable state.
//!
//! ## Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use streamweave_backpressure::{BoxError, ChunkTransformer};
//!
//! /// Counts bytes and reports the total as a trailer.
//! struct ByteCounter {
//!   seen: usize,
//! }
//!
//! #[async_trait]
//! impl ChunkTransformer<Vec<u8>, Vec<u8>> for ByteCounter {
//!   async fn transform(&mut self, chunk: Vec<u8>) -> Result<Option<Vec<u8>>, BoxError> {
//!     self.seen += chunk.len();
//!     Ok(Some(chunk))
//!   }
//!
//!   async fn flush(&mut self) -> Result<Option<Vec<u8>>, BoxError> {
//!     Ok(Some(format!("\n{} bytes", self.seen).into_bytes()))
//!   }
//! }
//! ```

use crate::error::BoxError;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;

/// Result of one transform or flush call.
pub type ChunkResult<O> = Result<Option<O>, BoxError>;

type TransformFn<I, O> = Box<dyn FnMut(I) -> BoxFuture<'static, ChunkResult<O>> + Send>;
type FlushFn<O> = Box<dyn FnMut() -> BoxFuture<'static, ChunkResult<O>> + Send>;

fn into_chunk_result<O, E: Into<BoxError>>(result: Result<Option<O>, E>) -> ChunkResult<O> {
  result.map_err(Into::into)
}

/// Asynchronous per-chunk operation driven by a backpressure pipe.
///
/// `transform` is invoked exactly once per accepted chunk, and `flush` exactly
/// once after the last transform settles. Returning `Ok(None)` drops the chunk
/// from the output without stalling the producer. Returning `Err` tears the
/// whole pipe down; nothing is retried.
#[async_trait]
pub trait ChunkTransformer<I, O>: Send
where
  I: Send + 'static,
  O: Send + 'static,
{
  /// Transforms one input chunk.
  async fn transform(&mut self, chunk: I) -> ChunkResult<O>;

  /// Produces an optional trailing chunk after input has ended.
  async fn flush(&mut self) -> ChunkResult<O> {
    Ok(None)
  }
}

/// Transformer that passes every chunk through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

#[async_trait]
impl<C> ChunkTransformer<C, C> for Identity
where
  C: Send + 'static,
{
  async fn transform(&mut self, chunk: C) -> ChunkResult<C> {
    Ok(Some(chunk))
  }
}

/// Transformer backed by an async closure.
///
/// The flush stage is a no-op; see [`WithFlush`] to attach one.
pub struct FnTransformer<I, O> {
  transform: TransformFn<I, O>,
}

impl<I, O> FnTransformer<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  /// Wraps `transform` so it can be driven by a pipe.
  pub fn new<F, Fut, E>(mut transform: F) -> Self
  where
    F: FnMut(I) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<O>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    Self {
      transform: Box::new(move |chunk| transform(chunk).map(into_chunk_result).boxed()),
    }
  }
}

#[async_trait]
impl<I, O> ChunkTransformer<I, O> for FnTransformer<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  async fn transform(&mut self, chunk: I) -> ChunkResult<O> {
    (self.transform)(chunk).await
  }
}

/// Replaces the flush stage of another transformer with an async closure.
pub struct WithFlush<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  inner: Box<dyn ChunkTransformer<I, O>>,
  flush: FlushFn<O>,
}

impl<I, O> WithFlush<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  /// Runs `inner` for every chunk and `flush` once input has ended.
  pub fn new<F, Fut, E>(inner: Box<dyn ChunkTransformer<I, O>>, mut flush: F) -> Self
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<O>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    Self {
      inner,
      flush: Box::new(move || flush().map(into_chunk_result).boxed()),
    }
  }
}

#[async_trait]
impl<I, O> ChunkTransformer<I, O> for WithFlush<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  async fn transform(&mut self, chunk: I) -> ChunkResult<O> {
    self.inner.transform(chunk).await
  }

  async fn flush(&mut self) -> ChunkResult<O> {
    (self.flush)().await
  }
}
