use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use judgeline_engine::wire::{DispatchRequest, encode_result};
use judgeline_engine::{EngineConfig, ExecService, validate_request};
use judgeline_lang::{LanguageRegistry, StaticLanguageRegistry};
use judgeline_organizer::StreamOrganizer;
use judgeline_queue::{MemoryQueue, MessageQueue};
use judgeline_store::{ExecutionStore, MemoryStore, SqliteStore};
use judgeline_types::{Event, Execution, ResourceParams, RunData, Submission, TestFile};

/// Judgeline - execution core of a code judging platform
#[derive(Parser)]
#[command(name = "judgeline")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.judgeline)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Language catalog file (default: <data-dir>/languages.json, else built-in)
  #[arg(long, global = true)]
  catalog: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// List the language catalog
  Languages,

  /// Validate an execution request and print the payload that would be dispatched
  Validate {
    /// Path to the request file (JSON)
    request_file: PathBuf,
  },

  /// Feed recorded runner reports through a stream organizer
  Replay {
    /// Path to the reports file, one JSON report per line (default: stdin)
    reports_file: Option<PathBuf>,

    /// Language id of the recorded execution
    #[arg(long)]
    lang: String,

    /// Number of tests of the recorded execution
    #[arg(long)]
    tests: usize,
  },

  /// Run an execution request end to end against a simulated runner
  Simulate {
    /// Path to the request file (JSON)
    request_file: PathBuf,

    /// Seed for the order the simulated runner reports in
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Persist the result to <data-dir>/judgeline.db
    #[arg(long)]
    persist: bool,
  },
}

/// Execution request file: submission, limits and tests in one object.
#[derive(Deserialize)]
struct RequestFile {
  #[serde(flatten)]
  submission: Submission,
  #[serde(flatten)]
  params: ResourceParams,
  #[serde(default)]
  tests: Vec<TestFile>,
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".judgeline"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Languages) => rt.block_on(list_languages(cli.catalog, &data_dir)),
    Some(Commands::Validate { request_file }) => {
      rt.block_on(validate(request_file, cli.catalog, &data_dir))
    }
    Some(Commands::Replay {
      reports_file,
      lang,
      tests,
    }) => rt.block_on(replay(reports_file, lang, tests, cli.catalog, &data_dir)),
    Some(Commands::Simulate {
      request_file,
      seed,
      persist,
    }) => rt.block_on(simulate(request_file, seed, persist, cli.catalog, &data_dir)),
    None => {
      println!("judgeline - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

async fn load_catalog(catalog: Option<PathBuf>, data_dir: &Path) -> Result<StaticLanguageRegistry> {
  let path = match catalog {
    Some(path) => path,
    None => {
      let default = data_dir.join("languages.json");
      if !tokio::fs::try_exists(&default).await.unwrap_or(false) {
        return Ok(StaticLanguageRegistry::builtin());
      }
      default
    }
  };

  StaticLanguageRegistry::load(&path)
    .await
    .with_context(|| format!("failed to load language catalog: {}", path.display()))
}

async fn read_request(request_file: &Path) -> Result<RequestFile> {
  let content = tokio::fs::read_to_string(request_file)
    .await
    .with_context(|| format!("failed to read request file: {}", request_file.display()))?;

  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse request file: {}", request_file.display()))
}

async fn list_languages(catalog: Option<PathBuf>, data_dir: &Path) -> Result<()> {
  let registry = load_catalog(catalog, data_dir).await?;

  for lang in registry.list() {
    let compile = lang.compile_cmd.as_deref().unwrap_or("-");
    println!("{:<12} {:<16} {:<40} {}", lang.id, lang.name, compile, lang.exec_cmd);
  }

  Ok(())
}

async fn validate(request_file: PathBuf, catalog: Option<PathBuf>, data_dir: &Path) -> Result<()> {
  let request = read_request(&request_file).await?;
  let registry = load_catalog(catalog, data_dir).await?;
  let config = EngineConfig::from_env();

  let language = validate_request(
    &registry,
    &config.limits,
    &request.submission,
    &request.tests,
    &request.params,
  )
  .context("request rejected")?;

  eprintln!(
    "Request is valid: {} with {} test(s)",
    language.name,
    request.tests.len()
  );

  let dispatch = DispatchRequest::new(
    Uuid::now_v7(),
    &request.submission,
    &language,
    &request.tests,
    &request.params,
    config.reply_queue(false),
  );
  let body = dispatch.encode(config.compress)?;
  eprintln!(
    "Dispatch body: {} bytes{}",
    body.len(),
    if config.compress { " (zstd, base64)" } else { "" }
  );
  println!("{}", serde_json::to_string_pretty(&dispatch)?);

  Ok(())
}

async fn replay(
  reports_file: Option<PathBuf>,
  lang_id: String,
  num_tests: usize,
  catalog: Option<PathBuf>,
  data_dir: &Path,
) -> Result<()> {
  let registry = load_catalog(catalog, data_dir).await?;
  let language = registry
    .get(&lang_id)
    .with_context(|| format!("unknown language '{}'", lang_id))?;

  let content = match &reports_file {
    Some(path) => tokio::fs::read_to_string(path)
      .await
      .with_context(|| format!("failed to read reports file: {}", path.display()))?,
    None => read_stdin()?,
  };

  let organizer = StreamOrganizer::new(language.has_compilation(), num_tests)?;
  let params = ResourceParams {
    cpu_ms: 0,
    mem_kib: 0,
    checker: None,
    interactor: None,
  };
  let mut execution = Execution::new(Uuid::now_v7(), language, params, num_tests);
  let mut ignored_lines = 0;

  for (index, line) in content.lines().enumerate() {
    let line_no = index + 1;
    if line.trim().is_empty() {
      continue;
    }
    if organizer.has_finished() {
      ignored_lines += 1;
      continue;
    }

    let event: Event = serde_json::from_str(line)
      .with_context(|| format!("failed to parse report on line {}", line_no))?;

    match organizer.add(event) {
      Ok(ready) => {
        for event in ready {
          println!("{:>5}  {}", line_no, event.key());
          execution.apply(&event);
        }
      }
      Err(e) => {
        eprintln!("Protocol error on line {}: {}", line_no, e);
        execution.apply(&Event::InternalServerError {
          error_msg: Some(e.to_string()),
        });
        break;
      }
    }
  }

  if ignored_lines > 0 {
    eprintln!("{} report(s) after the terminal event were ignored", ignored_lines);
  }
  if !execution.stage.is_terminal() {
    eprintln!("Stream did not reach a terminal event");
  }
  println!("stage: {}", execution.stage);

  Ok(())
}

async fn simulate(
  request_file: PathBuf,
  seed: u64,
  persist: bool,
  catalog: Option<PathBuf>,
  data_dir: &Path,
) -> Result<()> {
  let request = read_request(&request_file).await?;
  let languages = Arc::new(load_catalog(catalog, data_dir).await?);

  let store: Arc<dyn ExecutionStore> = if persist {
    Arc::new(open_sqlite(data_dir).await?)
  } else {
    Arc::new(MemoryStore::new())
  };

  let queue = Arc::new(MemoryQueue::default());
  let config = EngineConfig {
    receive_wait: Duration::from_millis(50),
    ..EngineConfig::from_env()
  };
  let submission_queue = config.submission_queue.clone();
  let service = ExecService::new(config, languages, queue.clone(), store);

  let cancel = CancellationToken::new();
  let listener = service.spawn_listener(cancel.clone());

  let exec_id = service
    .enqueue(request.submission, request.tests, request.params)
    .await
    .context("enqueue failed")?;
  eprintln!("Enqueued execution: {}", exec_id);

  let mut events = service.listen(exec_id)?;
  let runner = tokio::spawn(simulated_runner(queue, submission_queue, seed));

  while let Some(event) = events.recv().await {
    eprintln!("  {}", event.key());
  }

  let execution = service.get(exec_id, &cancel).await?;
  println!("{}", serde_json::to_string_pretty(&execution)?);

  cancel.cancel();
  listener.await?;
  runner.await??;

  Ok(())
}

async fn open_sqlite(data_dir: &Path) -> Result<SqliteStore> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let db_path = data_dir.join("judgeline.db");
  let options = SqliteConnectOptions::new()
    .filename(&db_path)
    .create_if_missing(true);
  let pool = SqlitePoolOptions::new()
    .connect_with(options)
    .await
    .with_context(|| format!("failed to open database: {}", db_path.display()))?;

  let store = SqliteStore::new(pool);
  store.migrate().await.context("failed to run migrations")?;
  Ok(store)
}

/// Answer one request with passing reports, shuffled and partly duplicated
/// the way an at-least-once queue may deliver them.
async fn simulated_runner(
  queue: Arc<MemoryQueue>,
  submission_queue: String,
  seed: u64,
) -> Result<()> {
  let delivery = loop {
    let batch = queue
      .receive(&submission_queue, 1, Duration::from_millis(100))
      .await?;
    if let Some(delivery) = batch.into_iter().next() {
      break delivery;
    }
  };
  queue.ack(&submission_queue, &delivery.receipt).await?;
  let request = DispatchRequest::decode(&delivery.body)?;

  let mut reports = vec![Event::ReceivedSubmission {
    sys_info: format!("simulated runner (seed {})", seed),
    started_at: None,
  }];
  if request.language.compile_cmd.is_some() {
    reports.push(Event::StartedCompiling);
    reports.push(Event::FinishedCompiling {
      runtime_data: Some(RunData::default()),
    });
  }
  reports.push(Event::StartedTesting);
  for test in &request.tests {
    reports.push(Event::ReachedTest {
      test_id: test.id,
      input: test.file.in_content.clone(),
      answer: test.file.ans_content.clone(),
    });
    reports.push(Event::FinishedTest {
      test_id: test.id,
      submission: Some(RunData {
        stdout: test.file.ans_content.clone().unwrap_or_default(),
        ..RunData::default()
      }),
      checker: None,
    });
  }
  reports.push(Event::FinishedTesting);

  let mut rng = StdRng::seed_from_u64(seed);
  let duplicates: Vec<Event> = reports.iter().step_by(3).cloned().collect();
  reports.extend(duplicates);
  reports.shuffle(&mut rng);

  for event in &reports {
    queue
      .send(&request.res_queue, encode_result(request.exec_id, event)?)
      .await?;
  }

  Ok(())
}

fn read_stdin() -> Result<String> {
  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read reports from stdin")?;

  if input.trim().is_empty() {
    bail!("no reports on stdin");
  }
  Ok(input)
}
