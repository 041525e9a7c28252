//! campus-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `CAMPUS_*` environment variables, opens the SQLite store, bootstraps the
//! administrator and serves the API under `/api`.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `bootstrap_admin_password_hash`:
//!
//! ```text
//! cargo run -p campus-server -- --hash-password
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use campus_api::{ApiSettings, ApiState, Clock, auth::hash_password};
use campus_server::{ServerConfig, bootstrap_admin, delivery, expand_tilde, scheduler};
use campus_store_sqlite::SqliteStore;
use clap::Parser;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Campus school administration server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let hash = hash_password(&password).map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let config = ServerConfig::load(&cli.config)?;
  let store_path = expand_tilde(&config.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  bootstrap_admin(store.as_ref(), &config).await?;

  let (deliveries, jobs) = mpsc::channel(config.delivery_queue_size.max(1));
  tokio::spawn(delivery::run(Arc::clone(&store), delivery::LogTransport, jobs));

  if config.statistics_interval_secs > 0 {
    let period = Duration::from_secs(config.statistics_interval_secs);
    tokio::spawn(scheduler::run(Arc::clone(&store), Clock::System, period));
  }

  let state = ApiState {
    store,
    deliveries,
    settings: Arc::new(ApiSettings { thresholds: config.thresholds(), clock: Clock::System }),
  };
  let app = campus_server::app(state);
  let address = format!("{}:{}", config.host, config.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
