//! blindmap server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) plus
//! `BLINDMAP_*` environment variables, opens an in-process SQLite store, and
//! serves the quiz API over HTTP.
//!
//! # Importing translations
//!
//! Place names can be replaced from a `code<TAB>name` file without starting
//! the server:
//!
//! ```
//! cargo run -p blindmap-server -- --import-translations names.tsv
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use blindmap_api::{AppState, QuizConfig};
use blindmap_core::{store::QuizStore, translation::parse_translations};
use blindmap_store_sqlite::SqliteStore;
use clap::Parser;
use config::{ConfigBuilder, builder::DefaultState};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "blindmap quiz server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Apply a tab-separated `code<TAB>name` translation file and exit.
  #[arg(long, value_name = "FILE")]
  import_translations: Option<PathBuf>,
}

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
struct ServerConfig {
  #[serde(default = "default_host")]
  host:       String,
  #[serde(default = "default_port")]
  port:       u16,
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
  #[serde(default)]
  quiz:       QuizConfig,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("blindmap.db") }

fn load_config(path: PathBuf) -> anyhow::Result<ServerConfig> {
  let builder =
    config::Config::builder().add_source(config::File::from(path).required(false));
  deserialize_config(builder)
}

/// Layer `BLINDMAP_*` variables over `builder`. Nested keys use a double
/// underscore, e.g. `BLINDMAP_QUIZ__DEBUG=true`.
fn deserialize_config(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<ServerConfig> {
  let cfg: ServerConfig = builder
    .add_source(
      config::Environment::with_prefix("BLINDMAP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  anyhow::ensure!(
    cfg.quiz.cache_ttl().is_some(),
    "quiz.cache_ttl_minutes out of range: {}",
    cfg.quiz.cache_ttl_minutes
  );
  Ok(cfg)
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = load_config(cli.config)?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Helper mode: apply translations and exit.
  if let Some(path) = cli.import_translations {
    return import_translations(&store, &path).await;
  }

  let app = blindmap_api::api_router(AppState::new(store, server_cfg.quiz.clone()));
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn import_translations(store: &SqliteStore, path: &Path) -> anyhow::Result<()> {
  let input = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read {path:?}"))?;

  let translations = parse_translations(&input);
  let report = store
    .apply_translations(translations)
    .await
    .context("failed to apply translations")?;

  println!(
    "updated: {}, unchanged: {}, matched by name: {}, unmatched: {}",
    report.updated, report.unchanged, report.fallback, report.unmatched
  );
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use blindmap_core::confusion::ConfusionOrder;
  use config::FileFormat;

  use super::*;

  fn from_toml(toml: &str) -> ServerConfig {
    let builder =
      config::Config::builder().add_source(config::File::from_str(toml, FileFormat::Toml));
    deserialize_config(builder).unwrap()
  }

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = from_toml("");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.store_path, PathBuf::from("blindmap.db"));
    assert_eq!(cfg.quiz.default_pool_size, 10);
    assert_eq!(cfg.quiz.cache_ttl_minutes, 15);
    assert_eq!(cfg.quiz.confusion_order, ConfusionOrder::LeastConfusingFirst);
  }

  #[test]
  fn quiz_table_overrides_defaults() {
    let cfg = from_toml(
      r#"
        host = "0.0.0.0"
        port = 9000

        [quiz]
        debug = true
        confusion_order = "most_confusing_first"
        cache_ttl_minutes = 1
      "#,
    );
    assert_eq!(cfg.host, "0.0.0.0");
    assert_eq!(cfg.port, 9000);
    assert!(cfg.quiz.debug);
    assert_eq!(cfg.quiz.confusion_order, ConfusionOrder::MostConfusingFirst);
    assert_eq!(cfg.quiz.cache_ttl_minutes, 1);
    assert_eq!(cfg.quiz.default_pool_size, 10);
  }

  #[test]
  fn out_of_range_cache_ttl_is_rejected() {
    for ttl in ["-1", "9223372036854775807"] {
      let toml = format!("[quiz]\ncache_ttl_minutes = {ttl}\n");
      let builder =
        config::Config::builder().add_source(config::File::from_str(&toml, FileFormat::Toml));
      let err = deserialize_config(builder).unwrap_err();
      assert!(err.to_string().contains("cache_ttl_minutes"), "{err}");
    }
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/quiz.db")), PathBuf::from(home).join("quiz.db"));
    assert_eq!(expand_tilde(Path::new("/tmp/quiz.db")), PathBuf::from("/tmp/quiz.db"));
  }
}
