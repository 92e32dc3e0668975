//! End-to-end tests of ExecService against a simulated runner that talks
//! over an in-memory queue.

use std::sync::Arc;
use std::time::Duration;

use judgeline_engine::wire::{DispatchRequest, encode_result};
use judgeline_engine::{EngineConfig, ExecError, ExecService, ValidationError};
use judgeline_lang::StaticLanguageRegistry;
use judgeline_queue::{MemoryQueue, MessageQueue, QueueError};
use judgeline_store::{ExecutionStore, MemoryStore};
use judgeline_types::{
  Event, EventKey, Execution, ResourceParams, RunData, Stage, Submission, TestFile,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
  service: ExecService,
  queue: Arc<MemoryQueue>,
  store: Arc<MemoryStore>,
  cancel: CancellationToken,
}

impl Harness {
  fn new(config: EngineConfig) -> Self {
    let queue = Arc::new(MemoryQueue::default());
    let store = Arc::new(MemoryStore::new());
    let service = ExecService::new(
      config,
      Arc::new(StaticLanguageRegistry::builtin()),
      queue.clone(),
      store.clone(),
    );
    let cancel = CancellationToken::new();
    service.spawn_listener(cancel.clone());

    Self {
      service,
      queue,
      store,
      cancel,
    }
  }

  fn with_defaults() -> Self {
    Self::new(test_config())
  }

  fn submission_queue(&self) -> String {
    self.service.config().submission_queue.clone()
  }
}

impl Drop for Harness {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

fn test_config() -> EngineConfig {
  EngineConfig {
    receive_wait: Duration::from_millis(20),
    receive_error_backoff: Duration::from_millis(10),
    dispatch_backoff: Duration::from_millis(1),
    execution_timeout: None,
    ..EngineConfig::default()
  }
}

fn submission(lang_id: &str) -> Submission {
  Submission {
    code: "a, b = map(int, input().split())\nprint(a + b)".to_string(),
    lang_id: lang_id.to_string(),
  }
}

fn tests(count: usize) -> Vec<TestFile> {
  (1..=count)
    .map(|i| TestFile::inline(format!("{} {}", i, i), format!("{}", 2 * i)))
    .collect()
}

fn params() -> ResourceParams {
  ResourceParams {
    cpu_ms: 1000,
    mem_kib: 256 * 1024,
    checker: None,
    interactor: None,
  }
}

/// Reports of a run where every test passes.
fn full_run(request: &DispatchRequest) -> Vec<Event> {
  let mut events = vec![Event::ReceivedSubmission {
    sys_info: "simulated runner".to_string(),
    started_at: None,
  }];
  if request.language.compile_cmd.is_some() {
    events.push(Event::StartedCompiling);
    events.push(Event::FinishedCompiling {
      runtime_data: Some(RunData {
        wall_ms: 900,
        ..RunData::default()
      }),
    });
  }
  events.push(Event::StartedTesting);
  for test in &request.tests {
    events.push(Event::ReachedTest {
      test_id: test.id,
      input: test.file.in_content.clone(),
      answer: test.file.ans_content.clone(),
    });
    events.push(Event::FinishedTest {
      test_id: test.id,
      submission: Some(RunData {
        stdout: test.file.ans_content.clone().unwrap_or_default(),
        cpu_ms: 4,
        ..RunData::default()
      }),
      checker: None,
    });
  }
  events.push(Event::FinishedTesting);
  events
}

/// Take the next run request off the submission queue.
async fn next_request(queue: &MemoryQueue, submission_queue: &str) -> DispatchRequest {
  loop {
    let batch = queue
      .receive(submission_queue, 1, Duration::from_millis(50))
      .await
      .unwrap();
    if let Some(delivery) = batch.into_iter().next() {
      queue.ack(submission_queue, &delivery.receipt).await.unwrap();
      return DispatchRequest::decode(&delivery.body).unwrap();
    }
  }
}

async fn report(queue: &MemoryQueue, request: &DispatchRequest, events: &[Event]) {
  for event in events {
    let body = encode_result(request.exec_id, event).unwrap();
    queue.send(&request.res_queue, body).await.unwrap();
  }
}

/// Shuffle with a fixed seed and deliver every other report twice.
fn scramble(events: Vec<Event>, seed: u64) -> Vec<Event> {
  let mut scrambled: Vec<Event> = events.iter().step_by(2).cloned().collect();
  scrambled.extend(events);
  scrambled.shuffle(&mut StdRng::seed_from_u64(seed));
  scrambled
}

async fn collect(mut events: mpsc::Receiver<Event>) -> Vec<Event> {
  tokio::time::timeout(TIMEOUT, async move {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
      collected.push(event);
    }
    collected
  })
  .await
  .expect("event stream did not close")
}

fn keys(events: &[Event]) -> Vec<EventKey> {
  events.iter().map(Event::key).collect()
}

async fn get(harness: &Harness, exec_id: Uuid) -> Execution {
  tokio::time::timeout(TIMEOUT, harness.service.get(exec_id, &CancellationToken::new()))
    .await
    .expect("get did not return")
    .unwrap()
}

#[tokio::test]
async fn test_interpreted_execution_streams_seven_events() {
  let harness = Harness::with_defaults();
  let exec_id = harness
    .service
    .enqueue(submission("python3.11"), tests(2), params())
    .await
    .unwrap();
  let events = harness.service.listen(exec_id).unwrap();

  let request = next_request(&harness.queue, &harness.submission_queue()).await;
  assert_eq!(request.exec_id, exec_id);
  assert_eq!(request.res_queue, "judgeline-results");
  report(&harness.queue, &request, &full_run(&request)).await;

  let events = collect(events).await;
  assert_eq!(
    keys(&events),
    vec![
      EventKey::ReceivedSubmission,
      EventKey::StartedTesting,
      EventKey::ReachedTest(1),
      EventKey::FinishedTest(1),
      EventKey::ReachedTest(2),
      EventKey::FinishedTest(2),
      EventKey::FinishedTesting,
    ]
  );

  let execution = get(&harness, exec_id).await;
  assert_eq!(execution.stage, Stage::Finished);
  assert!(execution.test_results.iter().all(|t| t.reached && t.finished && !t.ignored));
  assert!(execution.error_msg.is_none());
  assert_eq!(execution.sys_info.as_deref(), Some("simulated runner"));
}

#[tokio::test]
async fn test_compiled_execution_reorders_scrambled_reports() {
  let harness = Harness::with_defaults();
  let exec_id = harness
    .service
    .enqueue(submission("cpp17"), tests(2), params())
    .await
    .unwrap();
  let events = harness.service.listen(exec_id).unwrap();

  let request = next_request(&harness.queue, &harness.submission_queue()).await;
  assert_eq!(request.language.compiled_filename.as_deref(), Some("main"));
  let canonical = full_run(&request);
  report(&harness.queue, &request, &scramble(canonical.clone(), 11)).await;

  let events = collect(events).await;
  assert_eq!(events.len(), 9);
  assert_eq!(events, canonical);
  assert_eq!(
    keys(&events[..4]),
    vec![
      EventKey::ReceivedSubmission,
      EventKey::StartedCompiling,
      EventKey::FinishedCompiling,
      EventKey::StartedTesting,
    ]
  );

  let execution = get(&harness, exec_id).await;
  assert_eq!(execution.stage, Stage::Finished);
  assert_eq!(execution.compile_data.map(|d| d.wall_ms), Some(900));
}

#[tokio::test]
async fn test_redelivered_reports_are_emitted_once() {
  let harness = Harness::with_defaults();
  let exec_id = harness
    .service
    .enqueue(submission("go1.21"), tests(3), params())
    .await
    .unwrap();
  let events = harness.service.listen(exec_id).unwrap();

  let request = next_request(&harness.queue, &harness.submission_queue()).await;
  let canonical = full_run(&request);
  let mut twice = canonical.clone();
  twice.extend(canonical.clone());
  report(&harness.queue, &request, &twice).await;

  assert_eq!(collect(events).await, canonical);
}

#[tokio::test]
async fn test_get_blocks_until_persisted() {
  let harness = Harness::with_defaults();
  let exec_id = harness
    .service
    .enqueue(submission("java21"), tests(3), params())
    .await
    .unwrap();

  let queue = harness.queue.clone();
  let submission_queue = harness.submission_queue();
  tokio::spawn(async move {
    let request = next_request(&queue, &submission_queue).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    report(&queue, &request, &scramble(full_run(&request), 3)).await;
  });

  assert!(matches!(
    harness.store.get(exec_id).await,
    Err(judgeline_store::Error::NotFound(_))
  ));

  let execution = get(&harness, exec_id).await;
  assert_eq!(execution.stage, Stage::Finished);

  let independent = harness.store.get(exec_id).await.unwrap();
  assert_eq!(execution, independent);
  assert!(!harness.service.is_live(exec_id));
}

#[tokio::test]
async fn test_memory_limit_rejected_before_dispatch() {
  let harness = Harness::with_defaults();
  let mut params = params();
  params.mem_kib = 2 * 1024 * 1024;

  let err = harness
    .service
    .enqueue(submission("cpp17"), tests(1), params)
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    ExecError::Validation(ValidationError::MemoryLimit { .. })
  ));
  assert_eq!(harness.queue.len(&harness.submission_queue()), 0);
  assert_eq!(harness.service.registry().live_count(), 0);
}

#[tokio::test]
async fn test_compilation_error_ends_execution() {
  let harness = Harness::with_defaults();
  let exec_id = harness
    .service
    .enqueue(submission("cpp17"), tests(4), params())
    .await
    .unwrap();
  let events = harness.service.listen(exec_id).unwrap();

  let request = next_request(&harness.queue, &harness.submission_queue()).await;
  let reports = vec![
    Event::CompilationError {
      error_msg: Some("main.cpp:1:1: error: 'a' does not name a type".to_string()),
    },
    Event::FinishedCompiling { runtime_data: None },
    Event::StartedCompiling,
    Event::ReceivedSubmission {
      sys_info: "simulated runner".to_string(),
      started_at: None,
    },
  ];
  report(&harness.queue, &request, &reports).await;

  let events = collect(events).await;
  assert_eq!(
    keys(&events),
    vec![
      EventKey::ReceivedSubmission,
      EventKey::StartedCompiling,
      EventKey::FinishedCompiling,
      EventKey::CompilationError,
    ]
  );

  let execution = get(&harness, exec_id).await;
  assert_eq!(execution.stage, Stage::CompileError);
  assert!(execution.error_msg.unwrap().contains("does not name a type"));
  assert!(execution.test_results.iter().all(|t| !t.reached));
}

#[tokio::test]
async fn test_protocol_error_forces_internal_error() {
  let harness = Harness::with_defaults();
  let exec_id = harness
    .service
    .enqueue(submission("python3.11"), tests(2), params())
    .await
    .unwrap();
  let events = harness.service.listen(exec_id).unwrap();

  let request = next_request(&harness.queue, &harness.submission_queue()).await;
  let reports = vec![
    Event::ReceivedSubmission {
      sys_info: "simulated runner".to_string(),
      started_at: None,
    },
    Event::IgnoredTest { test_id: 5 },
  ];
  report(&harness.queue, &request, &reports).await;

  let events = collect(events).await;
  assert!(matches!(
    events.last(),
    Some(Event::InternalServerError { .. })
  ));

  let execution = get(&harness, exec_id).await;
  assert_eq!(execution.stage, Stage::InternalError);
  assert!(execution.error_msg.unwrap().contains("out of range"));
}

#[tokio::test]
async fn test_unrecognized_report_forces_internal_error() {
  let harness = Harness::with_defaults();
  let exec_id = harness
    .service
    .enqueue(submission("python3.11"), tests(2), params())
    .await
    .unwrap();
  let events = harness.service.listen(exec_id).unwrap();

  let request = next_request(&harness.queue, &harness.submission_queue()).await;
  let body = serde_json::json!({"exec_id": exec_id.to_string(), "msg_type": "exploded"});
  harness
    .queue
    .send(&request.res_queue, body.to_string())
    .await
    .unwrap();

  let events = collect(events).await;
  assert!(matches!(
    events.last(),
    Some(Event::InternalServerError { .. })
  ));

  let execution = get(&harness, exec_id).await;
  assert_eq!(execution.stage, Stage::InternalError);
  assert!(execution.error_msg.unwrap().contains("exploded"));
  assert!(!harness.service.is_live(exec_id));

  tokio::time::timeout(TIMEOUT, async {
    while harness.queue.len(&request.res_queue) > 0 {
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  })
  .await
  .expect("report was not acked");
}

#[tokio::test]
async fn test_reports_for_unknown_execution_are_dropped() {
  let harness = Harness::with_defaults();
  let body = encode_result(Uuid::now_v7(), &Event::StartedTesting).unwrap();
  harness.queue.send("judgeline-results", body).await.unwrap();

  tokio::time::timeout(TIMEOUT, async {
    while harness.queue.len("judgeline-results") > 0 {
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  })
  .await
  .expect("report was not acked");
}

#[tokio::test]
async fn test_listen_is_single_use() {
  let harness = Harness::with_defaults();
  let exec_id = harness
    .service
    .enqueue(submission("python3.11"), tests(1), params())
    .await
    .unwrap();

  let events = harness.service.listen(exec_id).unwrap();
  assert!(matches!(
    harness.service.listen(exec_id),
    Err(ExecError::AlreadyListening(id)) if id == exec_id
  ));

  let request = next_request(&harness.queue, &harness.submission_queue()).await;
  report(&harness.queue, &request, &full_run(&request)).await;
  collect(events).await;
  get(&harness, exec_id).await;

  assert!(matches!(
    harness.service.listen(exec_id),
    Err(ExecError::UnknownExecution(_))
  ));
}

#[tokio::test]
async fn test_get_cancellation() {
  let harness = Harness::with_defaults();
  let exec_id = harness
    .service
    .enqueue(submission("python3.11"), tests(1), params())
    .await
    .unwrap();

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.cancel();
  });

  let result = harness.service.get(exec_id, &cancel).await;
  assert!(matches!(result, Err(ExecError::Cancelled)));
  assert!(harness.service.is_live(exec_id));
}

#[tokio::test]
async fn test_get_unknown_execution() {
  let harness = Harness::with_defaults();
  let id = Uuid::now_v7();
  let result = harness.service.get(id, &CancellationToken::new()).await;
  assert!(matches!(result, Err(ExecError::NotFound(missing)) if missing == id));
}

#[tokio::test]
async fn test_silent_runner_times_out() {
  let harness = Harness::new(EngineConfig {
    execution_timeout: Some(Duration::from_millis(100)),
    ..test_config()
  });
  let exec_id = harness
    .service
    .enqueue(submission("python3.11"), tests(1), params())
    .await
    .unwrap();

  let execution = get(&harness, exec_id).await;
  assert_eq!(execution.stage, Stage::InternalError);
  assert!(execution.error_msg.is_some());
}

#[tokio::test]
async fn test_external_enqueue() {
  let harness = Harness::new(EngineConfig {
    external_api_key: Some("partner-key".to_string()),
    external_result_queue: Some("partner-results".to_string()),
    ..test_config()
  });
  let external = harness.service.external_result_listener().unwrap();
  tokio::spawn(external.run(harness.cancel.clone()));

  let err = harness
    .service
    .enqueue_external("wrong", submission("python3.11"), tests(1), params())
    .await
    .unwrap_err();
  assert!(matches!(err, ExecError::InvalidApiKey));
  assert_eq!(harness.queue.len(&harness.submission_queue()), 0);

  let exec_id = harness
    .service
    .enqueue_external("partner-key", submission("python3.11"), tests(1), params())
    .await
    .unwrap();
  let request = next_request(&harness.queue, &harness.submission_queue()).await;
  assert_eq!(request.res_queue, "partner-results");
  report(&harness.queue, &request, &full_run(&request)).await;

  let execution = get(&harness, exec_id).await;
  assert_eq!(execution.stage, Stage::Finished);
}

#[tokio::test]
async fn test_external_enqueue_disabled_without_key() {
  let harness = Harness::with_defaults();
  let err = harness
    .service
    .enqueue_external("", submission("python3.11"), tests(1), params())
    .await
    .unwrap_err();
  assert!(matches!(err, ExecError::InvalidApiKey));
}

#[tokio::test]
async fn test_dispatch_failure_rolls_back() {
  let harness = Harness::with_defaults();
  harness.queue.close();

  let err = harness
    .service
    .enqueue(submission("python3.11"), tests(1), params())
    .await
    .unwrap_err();

  assert!(matches!(err, ExecError::Dispatch { attempts: 3, .. }));
  assert_eq!(harness.service.registry().live_count(), 0);
}

/// Tests whose plain request exceeds the 256 KiB queue payload limit.
fn bulky_tests() -> Vec<TestFile> {
  (0..40)
    .map(|_| TestFile::inline("1 2 3 4 5 6 7 8\n".repeat(1000), "36\n".repeat(100)))
    .collect()
}

#[tokio::test]
async fn test_compressed_dispatch_fits_payload_limit() {
  let harness = Harness::with_defaults();
  assert!(harness.service.config().compress);

  let exec_id = harness
    .service
    .enqueue(submission("python3.11"), bulky_tests(), params())
    .await
    .unwrap();

  let request = next_request(&harness.queue, &harness.submission_queue()).await;
  assert_eq!(request.exec_id, exec_id);
  assert_eq!(request.tests.len(), 40);
  report(&harness.queue, &request, &full_run(&request)).await;
  assert_eq!(get(&harness, exec_id).await.stage, Stage::Finished);
}

#[tokio::test]
async fn test_uncompressed_dispatch_exceeds_payload_limit() {
  let harness = Harness::new(EngineConfig {
    compress: false,
    ..test_config()
  });

  let err = harness
    .service
    .enqueue(submission("python3.11"), bulky_tests(), params())
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    ExecError::Dispatch {
      attempts: 1,
      source: QueueError::PayloadTooLarge { .. }
    }
  ));
  assert_eq!(harness.service.registry().live_count(), 0);
}

#[tokio::test]
async fn test_concurrent_executions_are_isolated() {
  let harness = Harness::with_defaults();
  let mut ids = Vec::new();
  for lang in ["python3.11", "cpp17", "go1.21"] {
    ids.push(
      harness
        .service
        .enqueue(submission(lang), tests(3), params())
        .await
        .unwrap(),
    );
  }

  let mut requests = Vec::new();
  for _ in 0..ids.len() {
    requests.push(next_request(&harness.queue, &harness.submission_queue()).await);
  }
  for (seed, request) in requests.iter().enumerate() {
    report(&harness.queue, request, &scramble(full_run(request), seed as u64)).await;
  }

  for exec_id in ids {
    let execution = get(&harness, exec_id).await;
    assert_eq!(execution.id, exec_id);
    assert_eq!(execution.stage, Stage::Finished);
    assert_eq!(execution.test_results.len(), 3);
  }
  assert_eq!(harness.service.registry().live_count(), 0);
}
