pub mod controller;
pub mod events;
pub mod pacing;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

pub use controller::JobController;
pub use events::JobEvent;
pub use pacing::{BatchScheduler, CancelSignal, PacingConfig};

use crate::lookup::HttpLookupFactory;
use crate::models::ServiceConfig;
use crate::server::{self, AppState};
use crate::storage::CsvDatasetStore;

const APP_DIR: &str = "rankflow";

/// How long shutdown waits for a cancelled job to persist and finish.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn read_config(path: &Path, source: &str) -> Result<ServiceConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", source))?;
    let config: ServiceConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", source))?;
    tracing::info!("Loaded config from: {}", path.display());
    Ok(config)
}

/// Load the ServiceConfig. Resolution order:
///   1. `--config` path (must exist)
///   2. `RANKFLOW_CONFIG_DIR/config.json`
///   3. platform config dir `rankflow/config.json`
///   4. `{data_dir}/config.json`
///   5. defaults
pub fn load_config(config_path: Option<&Path>) -> Result<ServiceConfig> {
    if let Some(path) = config_path {
        if path.exists() {
            return read_config(path, "config file");
        }
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    if let Ok(config_dir) = std::env::var("RANKFLOW_CONFIG_DIR") {
        let path = PathBuf::from(&config_dir).join("config.json");
        if path.exists() {
            return read_config(&path, "RANKFLOW_CONFIG_DIR");
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join(APP_DIR).join("config.json");
        if path.exists() {
            return read_config(&path, "platform config dir");
        }
    }

    let path = resolve_data_dir(None).join("config.json");
    if path.exists() {
        return read_config(&path, "data dir");
    }

    tracing::info!("No config file found, using defaults");
    Ok(ServiceConfig::default())
}

/// Resolve the data directory: explicit override, then `RANKFLOW_DATA_DIR`,
/// then the platform data dir.
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Ok(d) = std::env::var("RANKFLOW_DATA_DIR") {
        return PathBuf::from(d);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Create the data directory and its `uploads/` subdirectory.
pub async fn create_data_dirs(data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    tokio::fs::create_dir_all(data_dir.join("uploads"))
        .await
        .context("Failed to create uploads directory")?;
    tracing::info!("Data directories ensured at: {}", data_dir.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

/// Cancel the running job, if any, and wait up to `grace` for the worker to
/// persist its partial results. Returns false if the job was still running
/// when the grace period ran out.
pub async fn graceful_shutdown(controller: &JobController, grace: Duration) -> bool {
    tracing::info!("Beginning graceful shutdown sequence...");

    if !controller.is_running() {
        tracing::info!("No job in flight");
        return true;
    }

    if let Err(e) = controller.cancel(None) {
        tracing::debug!("Cancel during shutdown: {}", e);
    }

    if controller.wait_for_idle(grace).await {
        tracing::info!("Running job stopped with state {:?}", controller.state());
        true
    } else {
        tracing::warn!(
            "Job did not stop within {}s, abandoning it",
            grace.as_secs()
        );
        false
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C signal");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM signal");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C signal");
    }
    Ok(())
}

/// Run the HTTP service until Ctrl+C or SIGTERM.
///
/// 1. Loads config and applies host/port overrides
/// 2. Resolves and creates the data directory
/// 3. Builds the job controller, dataset store and lookup factory
/// 4. Serves the router
/// 5. On signal: stops the server, cancels the running job and waits for it
pub async fn start_service(
    config_path: Option<&Path>,
    data_dir_override: Option<&Path>,
    host_override: Option<&str>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(h) = host_override {
        config.host = h.to_string();
    }
    if let Some(p) = port_override {
        config.port = p;
    }

    let data_dir = if let Some(d) = data_dir_override {
        d.to_path_buf()
    } else if let Some(ref d) = config.data_dir {
        d.clone()
    } else {
        resolve_data_dir(None)
    };
    config.data_dir = Some(data_dir.clone());

    create_data_dirs(&data_dir).await?;

    let lookups = Arc::new(HttpLookupFactory::from_config(&config));
    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(
        config,
        data_dir,
        Arc::new(CsvDatasetStore::new()),
        lookups,
    ));
    let controller = Arc::clone(&state.controller);

    let router = server::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Service started. Listening on http://{}", bind_addr);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(());
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
                tracing::info!("HTTP server received shutdown signal");
            })
            .await
            .ok();
    });

    shutdown_signal().await?;
    let _ = shutdown_tx.send(());

    graceful_shutdown(&controller, SHUTDOWN_GRACE).await;

    // Open SSE streams keep connections alive, so do not wait on them forever.
    if tokio::time::timeout(Duration::from_secs(5), server_handle)
        .await
        .is_err()
    {
        tracing::warn!("HTTP connections still open at exit");
    }

    tracing::info!("Service exited cleanly.");
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::events::JobEvent;
    use crate::lookup::MockLookup;
    use crate::models::job::{JobState, StartRequest, CANCELLED_MARKER};
    use crate::models::rank::Device;
    use crate::storage::{Dataset, DatasetStore};
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    #[test]
    fn test_config_loading_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, r#"{{"port": 9100, "batch_size": 3}}"#).unwrap();

        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config.port, 9100);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_config_loading_nonexistent_explicit_path_fails() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(Some(&tmp.path().join("missing.json")));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_loading_invalid_json_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_resolve_data_dir_with_override() {
        let dir = PathBuf::from("/srv/rankflow-test");
        assert_eq!(resolve_data_dir(Some(&dir)), dir);
    }

    #[test]
    fn test_resolve_data_dir_default_not_empty() {
        let dir = resolve_data_dir(None);
        assert!(!dir.as_os_str().is_empty());
    }

    #[tokio::test]
    async fn test_create_data_dirs() {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("data");
        create_data_dirs(&data_dir).await.expect("create dirs");
        assert!(data_dir.is_dir());
        assert!(data_dir.join("uploads").is_dir());
    }

    fn make_controller(pacing: PacingConfig) -> JobController {
        let (event_tx, _) = broadcast::channel::<JobEvent>(64);
        JobController::new(Arc::new(CsvDatasetStore::new()), event_tx, pacing)
    }

    #[tokio::test]
    async fn test_graceful_shutdown_when_idle() {
        let controller = make_controller(PacingConfig::immediate(5));
        assert!(graceful_shutdown(&controller, Duration::from_secs(1)).await);
        assert_eq!(controller.state(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_cancels_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kw.csv");
        std::fs::write(&path, "Keyword\none\ntwo\nthree\n").unwrap();

        // A long item delay keeps the job parked in its pacing sleep.
        let controller = make_controller(PacingConfig::new(
            5,
            Duration::from_secs(10),
            Duration::ZERO,
        ));
        let dataset = Dataset::parse(&std::fs::read(&path).unwrap()).unwrap();
        let request = StartRequest {
            target: "example.com".to_string(),
            location_code: 2356,
            location_name: None,
            device: Device::Desktop,
            language_code: "en".to_string(),
            limit: None,
            dataset_ref: "kw.csv".to_string(),
            dataset_path: path.clone(),
            original_name: "kw.csv".to_string(),
        };
        controller
            .start(request, dataset, Arc::new(MockLookup::new()))
            .expect("start");

        let stopped = graceful_shutdown(&controller, Duration::from_secs(5)).await;
        assert!(stopped);
        assert_eq!(controller.state(), JobState::Cancelled);

        let snapshot = controller.status(&Default::default());
        assert_eq!(snapshot.job.current_key, CANCELLED_MARKER);
        assert!(snapshot.job.processed < 3);

        let saved = CsvDatasetStore::new().load(&path).await.unwrap();
        assert!(saved.column_index("Ranking").is_some());
    }
}
