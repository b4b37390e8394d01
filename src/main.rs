use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gcpbatch::config::Config;
use gcpbatch::gcp::auth;
use gcpbatch::gcp::client::GcpClient;
use gcpbatch::requests::{BatchTransport, MakeRequests, ProgressTracker, RequestStream};
use gcpbatch::resource::{ApiRequest, Catalog, Method};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

const DEFAULT_API: &str = "compute";

/// Batched Google Cloud API requests with operation polling
#[derive(Parser, Debug)]
#[command(name = "gcpbatch", version = gcpbatch::VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// GCP project to use when a request does not name one
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Batch endpoint override
    #[arg(long, global = true)]
    batch_url: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Print "Created [...]" style lines when operations complete
    #[arg(long, global = true)]
    log_result: bool,

    /// Poll operations with `get` and client-side backoff instead of `wait`
    #[arg(long, global = true)]
    client_side_polling: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a JSON file of requests and wait for their operations
    Run {
        /// JSON array of {"service", "method", "params"} objects
        file: PathBuf,
    },
    /// List resources of one service
    List {
        service: String,

        /// Use aggregatedList across all scopes
        #[arg(long)]
        aggregated: bool,

        #[arg(long, conflicts_with = "region")]
        zone: Option<String>,

        #[arg(long)]
        region: Option<String>,

        /// Server-side filter expression
        #[arg(long)]
        filter: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// One entry of a `run` request file
#[derive(Debug, Deserialize)]
struct RequestEntry {
    #[serde(default = "default_api")]
    api: String,
    service: String,
    method: String,
    #[serde(default)]
    params: Map<String, Value>,
    /// Alternate resource name for the final GET
    #[serde(default)]
    followup: Option<String>,
}

fn default_api() -> String {
    DEFAULT_API.to_string()
}

/// Dots on stderr while operations are pending
struct StderrProgress;

impl ProgressTracker for StderrProgress {
    fn tick(&self) {
        eprint!(".");
        let _ = std::io::stderr().flush();
    }

    fn status(&self, message: &str) {
        eprintln!("{}", message);
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcpbatch {} started with log level: {:?}", gcpbatch::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gcpbatch").join("gcpbatch.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gcpbatch").join("gcpbatch.log");
    }
    PathBuf::from("gcpbatch.log")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level)?;

    let mut config = Config::load();
    if args.log_result {
        config.log_result = true;
    }
    if args.client_side_polling {
        config.poll.use_wait = false;
    }

    let project = config
        .effective_project(args.project.as_deref())
        .context("No GCP project configured. Set GOOGLE_CLOUD_PROJECT or use --project flag")?;
    if !auth::validate_project_id(&project) {
        anyhow::bail!("Invalid project ID: {}", project);
    }
    tracing::info!("Using project: {}", project);

    let catalog = Catalog::builtin();
    let batch_url = config
        .effective_batch_url(args.batch_url.as_deref(), catalog, DEFAULT_API)
        .context("No batch endpoint known for the compute API")?;

    let client = GcpClient::new(&project).await?;

    let ok = match args.command {
        Command::Run { file } => {
            run_file(&client, catalog, &config, &batch_url, &project, &file).await?
        }
        Command::List {
            service,
            aggregated,
            zone,
            region,
            filter,
        } => {
            let request = list_request(
                catalog,
                &project,
                &service,
                aggregated,
                zone,
                region,
                filter,
            )?;
            let stream = MakeRequests::new(&client, catalog, &batch_url)
                .max_batch_size(config.max_batch_size)
                .list(vec![request])?;
            drain(stream).await?
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run_file<T: BatchTransport + ?Sized>(
    transport: &T,
    catalog: &Catalog,
    config: &Config,
    batch_url: &str,
    project: &str,
    file: &Path,
) -> Result<bool> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let entries: Vec<RequestEntry> = serde_json::from_str(&content)
        .with_context(|| format!("{:?} is not a JSON array of requests", file))?;

    let mut requests = Vec::with_capacity(entries.len());
    let mut followups = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut params = entry.params;
        params
            .entry("project")
            .or_insert_with(|| Value::String(project.to_string()));
        let method = Method::from(entry.method.as_str());
        let request = catalog.request(&entry.api, &entry.service, method, params)?;
        requests.push(request);
        followups.push(entry.followup);
    }
    if followups.iter().all(Option::is_none) {
        followups.clear();
    }

    let progress = StderrProgress;
    let stream = MakeRequests::new(transport, catalog, batch_url)
        .max_batch_size(config.max_batch_size)
        .poll_settings(config.poll.clone())
        .log_result(config.log_result)
        .followup_overrides(followups)
        .progress(&progress)
        .run(requests)?;
    drain(stream).await
}

fn list_request(
    catalog: &Catalog,
    project: &str,
    service: &str,
    aggregated: bool,
    zone: Option<String>,
    region: Option<String>,
    filter: Option<String>,
) -> Result<ApiRequest> {
    let method = if aggregated {
        Method::AggregatedList
    } else {
        Method::List
    };

    let service_def = catalog
        .require_service(DEFAULT_API, service)
        .with_context(|| {
            format!(
                "Known services: {}",
                catalog.service_names(DEFAULT_API).join(", ")
            )
        })?;
    let path_params = service_def
        .method_config(&method)
        .map(|c| c.path_params())
        .unwrap_or_default();

    let mut params = Map::new();
    params.insert("project".into(), Value::String(project.to_string()));
    if path_params.contains(&"zone") {
        if let Some(zone) = zone.or_else(auth::get_default_zone) {
            params.insert("zone".into(), Value::String(zone));
        }
    }
    if path_params.contains(&"region") {
        if let Some(region) = region.or_else(auth::get_default_region) {
            params.insert("region".into(), Value::String(region));
        }
    }
    if let Some(filter) = filter {
        params.insert("filter".into(), Value::String(filter));
    }

    Ok(catalog.request(DEFAULT_API, service, method, params)?)
}

/// Print every resource as a JSON line, then the diagnostics. Returns
/// false when any error was recorded.
async fn drain<T: BatchTransport + ?Sized>(mut stream: RequestStream<'_, T>) -> Result<bool> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(resource) = stream.next().await {
        writeln!(out, "{}", serde_json::to_string(&resource)?)?;
    }
    out.flush()?;

    let diagnostics = stream.finish();
    if !diagnostics.is_empty() {
        eprintln!();
        eprintln!("{}", diagnostics.summary("Some requests generated warnings:"));
    }
    Ok(!diagnostics.has_errors())
}
