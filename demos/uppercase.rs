//! Upper-cases stdin line by line through a backpressure pipe.
//!
//! Blank lines are dropped and a line-count trailer is written once input ends.
//! Logs go to stderr.
//!
//! ```text
//! cat Cargo.toml | cargo run --example uppercase
//! ```

use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use streamweave_backpressure::{BackpressureTransform, BoxError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::LinesStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_writer(std::io::stderr)
    .init();

  let lines = Arc::new(AtomicUsize::new(0));
  let counted = lines.clone();

  let (mut sink, mut source) = BackpressureTransform::new(move |line: String| {
    counted.fetch_add(1, Ordering::Relaxed);
    async move {
      if line.trim().is_empty() {
        return Ok::<_, BoxError>(None);
      }
      Ok(Some(format!("{}\n", line.to_uppercase())))
    }
  })
  .with_flush(move || {
    let total = lines.load(Ordering::Relaxed);
    async move { Ok::<_, BoxError>(Some(format!("-- {} lines --\n", total))) }
  })
  .with_high_water_mark(8)
  .with_name("uppercase".to_string())
  .build();

  let input = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
  let producer = tokio::spawn(async move { sink.try_pump(input).await });

  let mut stdout = tokio::io::stdout();
  while let Some(chunk) = source.next().await {
    stdout.write_all(chunk?.as_bytes()).await?;
  }
  stdout.flush().await?;

  producer.await??;
  Ok(())
}
