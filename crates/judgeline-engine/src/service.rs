//! Execution service facade.

use std::sync::Arc;

use judgeline_lang::LanguageRegistry;
use judgeline_organizer::StreamOrganizer;
use judgeline_queue::MessageQueue;
use judgeline_store::ExecutionStore;
use judgeline_types::{Event, Execution, ResourceParams, Submission, TestFile};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::error::ExecError;
use crate::lifecycle::ExecutionTask;
use crate::listener::ResultListener;
use crate::registry::LiveRegistry;
use crate::validate::validate_request;
use crate::wire::DispatchRequest;

/// Entry point for running submissions on the remote runner.
///
/// # Usage
///
/// ```ignore
/// let service = ExecService::new(config, languages, queue, store);
/// let cancel = CancellationToken::new();
/// service.spawn_listener(cancel.clone());
///
/// let id = service.enqueue(submission, tests, params).await?;
/// let mut events = service.listen(id)?;
/// while let Some(event) = events.recv().await {
///   // canonical order, ends when the channel closes
/// }
/// let execution = service.get(id, &cancel).await?;
/// ```
pub struct ExecService {
  config: EngineConfig,
  languages: Arc<dyn LanguageRegistry>,
  queue: Arc<dyn MessageQueue>,
  store: Arc<dyn ExecutionStore>,
  registry: Arc<LiveRegistry>,
  dispatcher: Dispatcher,
}

impl ExecService {
  pub fn new(
    config: EngineConfig,
    languages: Arc<dyn LanguageRegistry>,
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn ExecutionStore>,
  ) -> Self {
    let dispatcher = Dispatcher::new(
      Arc::clone(&queue),
      config.submission_queue.clone(),
      config.dispatch_attempts,
      config.dispatch_backoff,
    );

    Self {
      config,
      languages,
      queue,
      store,
      registry: Arc::new(LiveRegistry::new()),
      dispatcher,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn registry(&self) -> &Arc<LiveRegistry> {
    &self.registry
  }

  /// Validate, register and dispatch an execution. Returns its id.
  pub async fn enqueue(
    &self,
    submission: Submission,
    tests: Vec<TestFile>,
    params: ResourceParams,
  ) -> Result<Uuid, ExecError> {
    self.start(submission, tests, params, false).await
  }

  /// Like [`enqueue`](Self::enqueue) for external partners: requires the
  /// configured api key and routes reports to the external result queue.
  pub async fn enqueue_external(
    &self,
    api_key: &str,
    submission: Submission,
    tests: Vec<TestFile>,
    params: ResourceParams,
  ) -> Result<Uuid, ExecError> {
    match &self.config.external_api_key {
      Some(expected) if expected == api_key => {}
      _ => {
        warn!(lang_id = %submission.lang_id, "external_enqueue_rejected");
        return Err(ExecError::InvalidApiKey);
      }
    }
    self.start(submission, tests, params, true).await
  }

  #[instrument(
    name = "exec_enqueue",
    skip(self, submission, tests, params),
    fields(lang_id = %submission.lang_id, tests = tests.len())
  )]
  async fn start(
    &self,
    submission: Submission,
    tests: Vec<TestFile>,
    params: ResourceParams,
    external: bool,
  ) -> Result<Uuid, ExecError> {
    let language = validate_request(
      self.languages.as_ref(),
      &self.config.limits,
      &submission,
      &tests,
      &params,
    )?;

    let exec_id = Uuid::now_v7();
    let organizer = StreamOrganizer::new(language.has_compilation(), tests.len())?;
    let reply_queue = self.config.reply_queue(external);
    let body = DispatchRequest::new(exec_id, &submission, &language, &tests, &params, reply_queue)
      .encode(self.config.compress)?;

    let (handler_tx, handler_rx) = mpsc::channel(self.config.handler_buffer);
    let (notify_tx, notify_rx) = mpsc::channel(self.config.notify_buffer);
    let (gate_tx, gate_rx) = watch::channel(false);
    self
      .registry
      .register(exec_id, handler_tx, notify_rx, gate_rx);

    if let Err(e) = self.dispatcher.send(exec_id, body).await {
      error!(exec_id = %exec_id, error = %e, "dispatch_failed");
      self.registry.rollback(exec_id);
      return Err(e);
    }

    let task = ExecutionTask {
      execution: Execution::new(exec_id, language, params, tests.len()),
      organizer,
      inbound: handler_rx,
      notify: notify_tx,
      gate: gate_tx,
      registry: Arc::clone(&self.registry),
      store: Arc::clone(&self.store),
      persist_timeout: self.config.persist_timeout,
      execution_timeout: self.config.execution_timeout,
    };
    tokio::spawn(task.run());

    info!(
      exec_id = %exec_id,
      lang_id = %submission.lang_id,
      tests = tests.len(),
      reply_queue = %reply_queue,
      "execution_enqueued"
    );
    Ok(exec_id)
  }

  /// Take the live event stream of an execution.
  ///
  /// The stream yields the canonical event sequence and closes when the
  /// execution completes. Each execution's stream can be taken once.
  pub fn listen(&self, exec_id: Uuid) -> Result<mpsc::Receiver<Event>, ExecError> {
    self.registry.take_notifier(exec_id)
  }

  /// Final snapshot of an execution.
  ///
  /// Waits for a live execution to complete first, unless `cancel` fires.
  pub async fn get(
    &self,
    exec_id: Uuid,
    cancel: &CancellationToken,
  ) -> Result<Execution, ExecError> {
    if let Some(mut gate) = self.registry.gate(exec_id) {
      tokio::select! {
        _ = cancel.cancelled() => return Err(ExecError::Cancelled),
        _ = gate.wait_for(|released| *released) => {}
      }
    }

    match self.store.get(exec_id).await {
      Ok(execution) => Ok(execution),
      Err(judgeline_store::Error::NotFound(_)) => Err(ExecError::NotFound(exec_id)),
      Err(e) => Err(e.into()),
    }
  }

  /// Whether an execution is still receiving reports.
  pub fn is_live(&self, exec_id: Uuid) -> bool {
    self.registry.is_live(exec_id)
  }

  /// Build a listener for the default result queue.
  pub fn result_listener(&self) -> ResultListener {
    self.listener_for(self.config.result_queue.clone())
  }

  /// Build a listener for the external result queue, if one is configured.
  pub fn external_result_listener(&self) -> Option<ResultListener> {
    self
      .config
      .external_result_queue
      .clone()
      .map(|queue| self.listener_for(queue))
  }

  /// Spawn a listener on the default result queue.
  pub fn spawn_listener(&self, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(self.result_listener().run(cancel))
  }

  fn listener_for(&self, queue_name: String) -> ResultListener {
    ResultListener::new(Arc::clone(&self.queue), queue_name, Arc::clone(&self.registry))
      .with_polling(
        self.config.receive_batch,
        self.config.receive_wait,
        self.config.receive_error_backoff,
      )
  }
}
