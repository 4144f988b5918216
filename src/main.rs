mod cache;
mod config;
mod http;
mod logging;
mod manifest;
mod notify;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;

use cache::{CacheStore, MemoryStorage, SqliteStorage};
use http::{HttpNetwork, Network, Request, RequestMode};
use notify::{Clients, LogClients, Notification};
use worker::{ActivationReport, EventOutcome, FetchResult, OfflineCacheManager, WorkerEvent};

#[derive(Parser, Debug)]
#[command(name = "ticketcache")]
#[command(about = "Offline cache manager for the PartyTicket site")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ticketcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Site origin, e.g. https://partyticket.ng (overrides config and TICKETCACHE_ORIGIN)
  #[arg(short, long)]
  origin: Option<String>,

  /// Keep cache generations in memory for this run only
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Store the precache manifest in the current cache generation
  Install,
  /// Delete cache generations other than the current one
  Activate,
  /// Fetch a path through the worker and write the body to stdout
  Fetch {
    path: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Treat the request as a full page navigation
    #[arg(long)]
    navigate: bool,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Post a JSON message to the worker, e.g. '{"action":"skipWaiting"}'
  Message { json: String },
  /// Deliver a push message
  Push { text: Option<String> },
  /// Simulate a click on the site notification
  Click,
  /// Fire a background sync tag
  Sync { tag: String },
  /// List cache generations
  Generations,
  /// Install, activate, then fetch each path
  Run { paths: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  let origin = config.resolve_origin(args.origin.as_deref())?;
  let _log_guard = logging::init(&config)?;

  let network = HttpNetwork::new(&config, origin.clone())?;
  let clients = LogClients::new(origin.clone());

  if args.ephemeral {
    let worker = OfflineCacheManager::new(origin, MemoryStorage::new(), network, clients);
    execute(&worker, args.command).await
  } else {
    let storage = SqliteStorage::open(&config.cache_path()?)?;
    let worker = OfflineCacheManager::new(origin, storage, network, clients);
    execute(&worker, args.command).await
  }
}

async fn execute<S, N, C>(worker: &OfflineCacheManager<S, N, C>, command: Command) -> Result<()>
where
  S: CacheStore,
  N: Network,
  C: Clients,
{
  match command {
    Command::Install => {
      worker.dispatch(WorkerEvent::Install).await?;
      println!("installed {}", worker.cache_name());
    }
    Command::Activate => {
      if let EventOutcome::Activated(report) = worker.dispatch(WorkerEvent::Activate).await? {
        print_report(&report);
      }
    }
    Command::Fetch {
      path,
      method,
      navigate,
      data,
    } => {
      let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
      let mut request = Request::new(method, worker.resolve(&path)?);
      if navigate {
        request = request.with_mode(RequestMode::Navigate);
      }
      if let Some(data) = data {
        request = request.with_body(data.into_bytes());
      }

      if let EventOutcome::Responded(result) = worker.dispatch(WorkerEvent::Fetch(request)).await? {
        eprintln!("{}", describe(&result));
        std::io::stdout()
          .write_all(&result.response.into_body())
          .map_err(|e| eyre!("Failed to write response body: {}", e))?;
      }
    }
    Command::Message { json } => {
      let message: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| eyre!("Invalid JSON message: {}", e))?;
      if let EventOutcome::Message(handled) = worker.dispatch(WorkerEvent::Message(message)).await? {
        println!(
          "{} (worker {}, skip waiting: {})",
          if handled { "handled" } else { "ignored" },
          worker.state()?,
          worker.skip_waiting_requested()?
        );
      }
    }
    Command::Push { text } => {
      let payload = text.map(String::into_bytes);
      if let EventOutcome::Notified(notification) = worker.dispatch(WorkerEvent::Push(payload)).await? {
        print_notification(&notification)?;
      }
    }
    Command::Click => {
      let notification = Notification::site("");
      if let EventOutcome::Clicked(notification) = worker
        .dispatch(WorkerEvent::NotificationClick(notification))
        .await?
      {
        println!("closed: {}", notification.is_closed());
      }
    }
    Command::Sync { tag } => {
      if let EventOutcome::Synced(handled) = worker.dispatch(WorkerEvent::Sync(tag.clone())).await? {
        println!("{}: {}", tag, if handled { "synced" } else { "ignored" });
      }
    }
    Command::Generations => {
      for name in worker.store().keys()? {
        println!(
          "{}\t{}\t{} entries",
          name,
          worker.generation_state(&name)?,
          worker.store().entry_count(&name)?
        );
      }
    }
    Command::Run { paths } => {
      worker.dispatch(WorkerEvent::Install).await?;
      if let EventOutcome::Activated(report) = worker.dispatch(WorkerEvent::Activate).await? {
        print_report(&report);
      }

      for path in paths {
        let request = Request::get(worker.resolve(&path)?);
        match worker.dispatch(WorkerEvent::Fetch(request)).await {
          Ok(EventOutcome::Responded(result)) => println!("{}\t{}", path, describe(&result)),
          Ok(_) => {}
          Err(e) => println!("{}\tfailed: {}", path, e),
        }
      }
    }
  }

  Ok(())
}

fn describe(result: &FetchResult) -> String {
  let mut line = format!(
    "{} {} {} bytes",
    result.response.status(),
    result.source,
    result.response.body().len()
  );
  if let Some(content_type) = result.response.header("content-type") {
    line.push_str(&format!(" ({})", content_type));
  }
  if result.is_offline() {
    line.push_str(" [offline]");
  }
  line
}

fn print_report(report: &ActivationReport) {
  for name in &report.kept {
    println!("kept {}", name);
  }
  for name in &report.deleted {
    println!("deleted {}", name);
  }
  for (name, error) in &report.failed {
    println!("failed {}: {}", name, error);
  }
  if !report.is_clean() {
    println!("some stale caches remain; they will be retried on the next activation");
  }
}

fn print_notification(notification: &Notification) -> Result<()> {
  let json = serde_json::to_string_pretty(notification)
    .map_err(|e| eyre!("Failed to serialize notification: {}", e))?;
  println!("{}", json);
  Ok(())
}
