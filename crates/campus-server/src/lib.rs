//! Campus server wiring: configuration, administrator bootstrap, the HTTP
//! application and the background tasks.

pub mod delivery;
pub mod scheduler;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use axum::Router;
use campus_api::ApiState;
use campus_core::{
  profile::{NewProfile, UserRole},
  statistics::Thresholds,
  store::Store,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CAMPUS_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                          String,
  #[serde(default = "default_port")]
  pub port:                          u16,
  pub store_path:                    PathBuf,
  #[serde(default = "default_admin")]
  pub bootstrap_admin_username:      String,
  /// Argon2 PHC string; without it no administrator is created.
  #[serde(default)]
  pub bootstrap_admin_password_hash: Option<String>,
  /// `0` disables the periodic statistics run.
  #[serde(default = "default_statistics_interval")]
  pub statistics_interval_secs:      u64,
  #[serde(default = "default_unfounded_absences")]
  pub at_risk_unfounded_absences:    u32,
  #[serde(default = "default_behavior_grade")]
  pub at_risk_behavior_grade:        u8,
  #[serde(default = "default_queue_size")]
  pub delivery_queue_size:           usize,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_admin() -> String { "admin".to_string() }
fn default_statistics_interval() -> u64 { 3600 }
fn default_unfounded_absences() -> u32 { Thresholds::default().unfounded_absences }
fn default_behavior_grade() -> u8 { Thresholds::default().behavior_grade }
fn default_queue_size() -> usize { 1024 }

impl ServerConfig {
  /// Layer the TOML file at `path` (optional) under `CAMPUS_*` variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("CAMPUS"))
      .build()
      .context("failed to read config file")?;
    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn thresholds(&self) -> Thresholds {
    Thresholds {
      unfounded_absences: self.at_risk_unfounded_absences,
      behavior_grade:     self.at_risk_behavior_grade,
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Bootstrap ────────────────────────────────────────────────────────────────

/// Create the configured administrator unless the username is taken.
///
/// Returns `true` when a profile was created.
pub async fn bootstrap_admin<S: Store>(store: &S, config: &ServerConfig) -> anyhow::Result<bool> {
  let username = config.bootstrap_admin_username.clone();
  if store.credentials(username.clone()).await?.is_some() {
    return Ok(false);
  }
  let Some(hash) = config.bootstrap_admin_password_hash.clone() else {
    warn!(%username, "no administrator password hash configured; skipping bootstrap");
    return Ok(false);
  };

  let mut admin = NewProfile::new(UserRole::Administrator, None, username, "Administrator");
  admin.password_hash = Some(hash);
  let admin = store
    .create_profile(admin)
    .await
    .context("failed to create the bootstrap administrator")?;
  info!(profile_id = %admin.profile_id, username = %admin.username, "created administrator");
  Ok(true)
}

// ─── Application ──────────────────────────────────────────────────────────────

/// The HTTP application: the API under `/api` with request tracing.
pub fn app<S: Store + 'static>(state: ApiState<S>) -> Router {
  Router::new()
    .nest("/api", campus_api::api_router(state))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use campus_api::{ApiSettings, auth::hash_password};
  use campus_core::store::ProfileStore;
  use campus_store_sqlite::SqliteStore;
  use tokio::sync::mpsc;

  use super::*;

  fn config_from(toml: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn defaults_fill_missing_fields() {
    let cfg = config_from(r#"store_path = "~/campus.db""#);
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.bootstrap_admin_username, "admin");
    assert_eq!(cfg.statistics_interval_secs, 3600);
    assert_eq!(cfg.delivery_queue_size, 1024);
    assert_eq!(cfg.thresholds(), Thresholds::default());
  }

  #[test]
  fn thresholds_come_from_config() {
    let cfg = config_from(
      "store_path = \"campus.db\"\nat_risk_unfounded_absences = 10\nat_risk_behavior_grade = 7",
    );
    assert_eq!(cfg.thresholds(), Thresholds { unfounded_absences: 10, behavior_grade: 7 });
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/x/campus.db")), PathBuf::from(home).join("x/campus.db"));
    assert_eq!(expand_tilde(Path::new("/srv/campus.db")), PathBuf::from("/srv/campus.db"));
  }

  #[tokio::test]
  async fn bootstrap_creates_the_administrator_once() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let mut cfg = config_from(r#"store_path = ":memory:""#);

    assert!(!bootstrap_admin(&store, &cfg).await.unwrap());
    cfg.bootstrap_admin_password_hash = Some(hash_password("secret").unwrap());
    assert!(bootstrap_admin(&store, &cfg).await.unwrap());
    assert!(!bootstrap_admin(&store, &cfg).await.unwrap());

    let creds = store.credentials("admin".into()).await.unwrap().unwrap();
    assert_eq!(creds.profile.role, UserRole::Administrator);
  }

  #[tokio::test]
  async fn api_is_mounted_under_prefix() {
    use tower::ServiceExt as _;

    let store = SqliteStore::open_in_memory().await.unwrap();
    let (deliveries, _rx) = mpsc::channel(1);
    let state = ApiState {
      store: Arc::new(store),
      deliveries,
      settings: Arc::new(ApiSettings::default()),
    };
    let req = Request::builder().uri("/api/me").body(Body::empty()).unwrap();
    let resp = app(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }
}
