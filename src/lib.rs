//! # StreamWeave Backpressure
//!
//! A transform pipe that propagates the consumer's demand back through an
//! asynchronous per-chunk operation.
//!
//! A naive composition of "read chunk, await transform, push result" throttles
//! its input only while the transform runs; once results pile up downstream
//! nothing stops the producer. A [`BackpressureTransform`] closes that gap: it
//! hands out a write-facing [`Sink`] and a read-facing [`Source`] sharing one
//! coordinator, and a chunk accepted by the Sink is only acknowledged once the
//! Source has room for more output.
//!
//! ## Key Features
//!
//! - **Bounded memory**: the producer runs at most one buffer ahead of the consumer
//! - **Strictly sequential**: one transform (or the flush) in flight at a time
//! - **Order preserving**: output order equals input order, flush output last
//! - **Drop support**: a transform returning `None` drops the chunk
//! - **Two-way teardown**: a failure on either port ends both
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::{StreamExt, stream};
//! use streamweave_backpressure::{BackpressureTransform, BoxError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut sink, mut source) = BackpressureTransform::new(|line: String| async move {
//!   Ok::<_, BoxError>(Some(line.to_uppercase()))
//! })
//! .build();
//!
//! tokio::spawn(async move { sink.pump(stream::iter(vec!["a".to_string()])).await });
//! while let Some(chunk) = source.next().await {
//!   println!("{}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Pipe configuration: high-water mark, chunk sizing and naming.
pub mod config;
/// Shared coordinator state and pipe statistics.
pub mod coordinator;
/// Errors reported by both ports.
pub mod error;
/// Builder connecting a transformer to a Sink/Source pair.
pub mod pipe;
/// Write-facing port.
pub mod sink;
/// Read-facing port.
pub mod source;
/// The per-chunk transform operation and closure adapters.
pub mod transformer;

pub use config::{DEFAULT_BYTE_HIGH_WATER_MARK, DEFAULT_HIGH_WATER_MARK, PipeConfig};
pub use coordinator::{PipeState, PipeStats};
pub use error::{BoxError, ErrorContext, PipeError, SharedError, StringError};
pub use pipe::BackpressureTransform;
pub use sink::Sink;
pub use source::Source;
pub use transformer::{ChunkResult, ChunkTransformer, FnTransformer, Identity, WithFlush};

#[cfg(test)]
mod pipe_test;
