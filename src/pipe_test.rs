//! # Backpressure Transform Test Suite
//!
//! End-to-end behavior of a built pipe: output order, drop semantics, the
//! flush stage and teardown after a failed transform.

use crate::error::{BoxError, PipeError, StringError};
use crate::{BackpressureTransform, ChunkTransformer, ChunkResult, PipeConfig, PipeState};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::TRACE)
    .with_test_writer()
    .try_init();
}

fn uppercase(chunk: String) -> impl std::future::Future<Output = Result<Option<String>, BoxError>> {
  async move { Ok(Some(chunk.to_uppercase())) }
}

#[tokio::test]
async fn test_transforms_a_stream() {
  init_tracing();
  let (mut sink, source) = BackpressureTransform::new(uppercase).build();

  let producer = tokio::spawn(async move {
    sink
      .pump(stream::iter(vec!["Hello, world.".to_string()]))
      .await
  });

  let output: Vec<String> = source.map(|chunk| chunk.unwrap()).collect().await;
  producer.await.unwrap().unwrap();

  assert_eq!(output.concat(), "HELLO, WORLD.");
}

#[tokio::test]
async fn test_performs_a_flush() {
  init_tracing();
  let (mut sink, source) = BackpressureTransform::new(uppercase)
    .with_flush(|| async { Ok::<_, BoxError>(Some(" The end.".to_string())) })
    .build();

  let producer = tokio::spawn(async move {
    sink
      .pump(stream::iter(vec!["Hello, world.".to_string()]))
      .await
  });

  let output: Vec<String> = source.map(|chunk| chunk.unwrap()).collect().await;
  producer.await.unwrap().unwrap();

  assert_eq!(output, vec!["HELLO, WORLD.", " The end."]);
  assert_eq!(output.concat(), "HELLO, WORLD. The end.");
}

#[tokio::test]
async fn test_output_order_matches_input_order() {
  let (mut sink, source) = BackpressureTransform::new(|x: u32| async move {
    // Later chunks finish faster; order must still follow input.
    tokio::time::sleep(std::time::Duration::from_millis(u64::from(10 - x))).await;
    Ok::<_, BoxError>(Some(x * 2))
  })
  .with_high_water_mark(3)
  .build();

  let producer = tokio::spawn(async move { sink.pump(stream::iter(0..10)).await });

  let output: Vec<u32> = source.map(|chunk| chunk.unwrap()).collect().await;
  producer.await.unwrap().unwrap();

  assert_eq!(output, (0..10).map(|x| x * 2).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_dropped_chunks_do_not_stall_the_producer() {
  let (mut sink, source) = BackpressureTransform::new(|x: i32| async move {
    Ok::<_, BoxError>(if x % 2 == 0 { Some(x) } else { None })
  })
  .with_high_water_mark(1)
  .build();

  let producer = tokio::spawn(async move {
    let result = sink.pump(stream::iter(1..=9)).await;
    (result, sink.stats())
  });

  let output: Vec<i32> = source.map(|chunk| chunk.unwrap()).collect().await;
  let (result, stats) = producer.await.unwrap();

  result.unwrap();
  assert_eq!(output, vec![2, 4, 6, 8]);
  assert_eq!(stats.accepted, 9);
  assert_eq!(stats.dropped, 5);
  assert_eq!(stats.emitted, 4);
  assert_eq!(stats.state, PipeState::Closed);
}

#[tokio::test]
async fn test_passthrough_forwards_chunks_unchanged() {
  let (mut sink, source) = BackpressureTransform::<Vec<u8>, Vec<u8>>::passthrough()
    .with_config(PipeConfig::bytes().with_high_water_mark(8))
    .build();

  let producer = tokio::spawn(async move {
    sink
      .pump(stream::iter(vec![vec![1u8; 5], vec![2u8; 5], vec![3u8; 5]]))
      .await
  });

  let output: Vec<Vec<u8>> = source.map(|chunk| chunk.unwrap()).collect().await;
  producer.await.unwrap().unwrap();

  assert_eq!(output, vec![vec![1u8; 5], vec![2u8; 5], vec![3u8; 5]]);
}

#[tokio::test]
async fn test_zero_high_water_mark_still_makes_progress() {
  let (mut sink, source) = BackpressureTransform::<i32, i32>::passthrough()
    .with_high_water_mark(0)
    .build();

  let producer = tokio::spawn(async move { sink.pump(stream::iter(0..5)).await });

  let output: Vec<i32> = source.map(|chunk| chunk.unwrap()).collect().await;
  producer.await.unwrap().unwrap();

  assert_eq!(output, vec![0, 1, 2, 3, 4]);
}

/// Records every transform and flush call, and fails on a chosen chunk.
struct Recorder {
  log: Arc<Mutex<Vec<String>>>,
  fail_on: Option<u32>,
}

#[async_trait]
impl ChunkTransformer<u32, u32> for Recorder {
  async fn transform(&mut self, chunk: u32) -> ChunkResult<u32> {
    self.log.lock().unwrap().push(format!("start {}", chunk));
    tokio::task::yield_now().await;
    self.log.lock().unwrap().push(format!("end {}", chunk));
    if self.fail_on == Some(chunk) {
      return Err(StringError(format!("cannot transform {}", chunk)).into());
    }
    Ok(Some(chunk))
  }

  async fn flush(&mut self) -> ChunkResult<u32> {
    self.log.lock().unwrap().push("flush".to_string());
    Ok(Some(100))
  }
}

#[tokio::test]
async fn test_transforms_never_overlap_and_flush_runs_last() {
  let log = Arc::new(Mutex::new(Vec::new()));
  let (mut sink, source) = BackpressureTransform::from_transformer(Recorder {
    log: log.clone(),
    fail_on: None,
  })
  .with_high_water_mark(1)
  .build();

  let producer = tokio::spawn(async move { sink.pump(stream::iter(0..4)).await });

  let output: Vec<u32> = source.map(|chunk| chunk.unwrap()).collect().await;
  producer.await.unwrap().unwrap();

  assert_eq!(output, vec![0, 1, 2, 3, 100]);
  assert_eq!(
    *log.lock().unwrap(),
    vec![
      "start 0", "end 0", "start 1", "end 1", "start 2", "end 2", "start 3", "end 3", "flush",
    ]
  );
}

#[tokio::test]
async fn test_failed_transform_tears_down_the_pipe() {
  let log = Arc::new(Mutex::new(Vec::new()));
  let (mut sink, mut source) = BackpressureTransform::from_transformer(Recorder {
    log: log.clone(),
    fail_on: Some(2),
  })
  .with_name("recorder".to_string())
  .build();

  let result = sink.pump(stream::iter(0..5)).await;

  match result {
    Err(PipeError::Transform {
      chunk_index,
      context,
      ..
    }) => {
      assert_eq!(chunk_index, 2);
      assert_eq!(context.component_name, "recorder");
    }
    other => panic!("Expected transform failure, got {:?}", other),
  }
  assert_eq!(
    *log.lock().unwrap(),
    vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
  );

  // Exactly one error, then nothing: no chunks and no clean end.
  let first = source.next().await;
  assert!(matches!(first, Some(Err(PipeError::Transform { .. }))));
  assert!(source.next().await.is_none());
  assert!(source.next().await.is_none());

  // Later writes report the same failure.
  assert!(matches!(
    sink.accept(9).await,
    Err(PipeError::Transform { chunk_index: 2, .. })
  ));
  assert!(matches!(
    sink.close().await,
    Err(PipeError::Transform { .. })
  ));
  assert!(!log.lock().unwrap().contains(&"flush".to_string()));
}

#[tokio::test]
async fn test_flush_runs_exactly_once() {
  let flushes = Arc::new(AtomicUsize::new(0));
  let counter = flushes.clone();
  let (mut sink, source) = BackpressureTransform::<i32, i32>::passthrough()
    .with_flush(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async { Ok::<_, BoxError>(None) }
    })
    .build();

  let producer = tokio::spawn(async move {
    let first = sink.pump(stream::iter(0..3)).await;
    let second = sink.close().await;
    (first, second)
  });

  let output: Vec<i32> = source.map(|chunk| chunk.unwrap()).collect().await;
  let (first, second) = producer.await.unwrap();

  first.unwrap();
  assert!(matches!(second, Err(PipeError::Closed)));
  assert_eq!(output, vec![0, 1, 2]);
  assert_eq!(flushes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_flush_reports_error_instead_of_end() {
  let (mut sink, mut source) = BackpressureTransform::<String, String>::passthrough()
    .with_flush(|| async { Err::<Option<String>, _>(StringError("disk full".to_string())) })
    .build();

  sink.accept("body".to_string()).await.unwrap();
  assert_eq!(source.next().await.unwrap().unwrap(), "body");

  let error = sink.close().await.unwrap_err();
  assert!(matches!(error, PipeError::Flush { .. }));
  assert!(error.to_string().contains("disk full"));

  assert!(matches!(source.next().await, Some(Err(PipeError::Flush { .. }))));
  assert!(source.next().await.is_none());
}

#[tokio::test]
async fn test_empty_input_still_flushes_and_ends() {
  let (mut sink, source) = BackpressureTransform::<String, String>::passthrough()
    .with_flush(|| async { Ok::<_, BoxError>(Some("only".to_string())) })
    .build();

  sink.pump(stream::empty()).await.unwrap();

  let output: Vec<String> = source.map(|chunk| chunk.unwrap()).collect().await;
  assert_eq!(output, vec!["only"]);
}
