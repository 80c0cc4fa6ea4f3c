//! # Pipe Configuration
//!
//! [`PipeConfig`] holds the knobs a [`BackpressureTransform`](crate::BackpressureTransform)
//! consults when deciding whether the read-facing port is saturated:
//!
//! - **High-water mark**: the buffered size at or above which the Source reports saturation
//! - **Sizer**: how much of the high-water mark a single chunk consumes
//! - **Name**: identifies the pipe in logs and error context
//!
//! The default configuration counts every chunk as one unit against a high-water
//! mark of [`DEFAULT_HIGH_WATER_MARK`]. Byte-oriented pipes should start from
//! [`PipeConfig::bytes`], which measures chunks by length against
//! [`DEFAULT_BYTE_HIGH_WATER_MARK`].
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use streamweave_backpressure::PipeConfig;
//!
//! let config = PipeConfig::<Bytes>::bytes()
//!   .with_high_water_mark(1024)
//!   .with_name("gzip".to_string());
//!
//! assert_eq!(config.measure(&Bytes::from_static(b"abcd")), 4);
//! ```

use std::fmt;
use std::sync::Arc;

/// High-water mark used when chunks are counted one unit each.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;

/// High-water mark used by [`PipeConfig::bytes`].
pub const DEFAULT_BYTE_HIGH_WATER_MARK: usize = 16 * 1024;

// Measures how much of the high-water mark one chunk consumes.
type Sizer<C> = Arc<dyn Fn(&C) -> usize + Send + Sync>;

/// Configuration for a backpressure pipe whose output chunks are of type `C`.
pub struct PipeConfig<C> {
  /// Buffered size at or above which the Source reports saturation.
  pub high_water_mark: usize,
  /// Optional name for identifying this pipe in logs and errors.
  pub name: Option<String>,
  sizer: Sizer<C>,
}

impl<C: 'static> Default for PipeConfig<C> {
  fn default() -> Self {
    Self {
      high_water_mark: DEFAULT_HIGH_WATER_MARK,
      name: None,
      sizer: Arc::new(|_: &C| 1),
    }
  }
}

impl<C> Clone for PipeConfig<C> {
  fn clone(&self) -> Self {
    Self {
      high_water_mark: self.high_water_mark,
      name: self.name.clone(),
      sizer: self.sizer.clone(),
    }
  }
}

impl<C> fmt::Debug for PipeConfig<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PipeConfig")
      .field("high_water_mark", &self.high_water_mark)
      .field("name", &self.name)
      .finish_non_exhaustive()
  }
}

impl<C> PipeConfig<C> {
  /// Sets the high-water mark.
  ///
  /// A high-water mark of zero makes every emitted chunk saturate the Source,
  /// so the producer advances only as the consumer polls.
  pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
    self.high_water_mark = high_water_mark;
    self
  }

  /// Sets the name for this pipe.
  ///
  /// # Arguments
  ///
  /// * `name` - The name to assign to this pipe.
  pub fn with_name(mut self, name: String) -> Self {
    self.name = Some(name);
    self
  }

  /// Returns the size `chunk` contributes to the Source buffer.
  pub fn measure(&self, chunk: &C) -> usize {
    (self.sizer)(chunk)
  }

  /// Returns the configured name, or a generic one when unset.
  pub fn name(&self) -> String {
    self
      .name
      .clone()
      .unwrap_or_else(|| "backpressure_transform".to_string())
  }
}

impl<C: 'static> PipeConfig<C> {
  /// Replaces the function used to measure chunks against the high-water mark.
  ///
  /// The sizer runs while the pipe's shared state is locked, so it must not
  /// call back into either port (for example `stats()`), or it deadlocks.
  /// Chunks it measures as zero are discarded instead of buffered.
  pub fn with_sizer<F>(mut self, sizer: F) -> Self
  where
    F: Fn(&C) -> usize + Send + Sync + 'static,
  {
    self.sizer = Arc::new(sizer);
    self
  }
}

impl<C: AsRef<[u8]> + 'static> PipeConfig<C> {
  /// Creates a configuration that measures chunks by byte length, with a
  /// high-water mark of [`DEFAULT_BYTE_HIGH_WATER_MARK`].
  pub fn bytes() -> Self {
    Self::default()
      .with_high_water_mark(DEFAULT_BYTE_HIGH_WATER_MARK)
      .with_byte_size()
  }

  /// Measures chunks by byte length, keeping the current high-water mark.
  pub fn with_byte_size(self) -> Self {
    self.with_sizer(|chunk: &C| chunk.as_ref().len())
  }
}
