// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `festpass serve` - composition root.
//!
//! Wires the configured backends (in-memory or PostgreSQL), probes the
//! enhancement providers, loads the compositor assets, and runs the axum
//! API next to the worker pool until interrupted.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use festpass_core::application::registration_service::RegistrationService;
use festpass_core::application::status::StatusService;
use festpass_core::application::worker::{Worker, WorkerPool};
use festpass_core::domain::config::{resolve_secret, ServiceConfig};
use festpass_core::domain::credential::CredentialRenderer;
use festpass_core::domain::repository::{JobQueue, RegistrationRepository, RegistrationSequence};
use festpass_core::domain::storage::ObjectStore;
use festpass_core::infrastructure::compositor::{Compositor, FailedRenderer};
use festpass_core::infrastructure::db::Database;
use festpass_core::infrastructure::enhance::EnhancerRegistry;
use festpass_core::infrastructure::event_bus::EventBus;
use festpass_core::infrastructure::queue::InMemoryJobQueue;
use festpass_core::infrastructure::repositories::postgres::{
    PostgresJobQueue, PostgresRegistrationRepository, PostgresRegistrationSequence,
};
use festpass_core::infrastructure::repositories::{
    InMemoryRegistrationRepository, InMemoryRegistrationSequence,
};
use festpass_core::infrastructure::storage::{LocalObjectStore, UrlSigner};
use festpass_core::presentation::api::{self, AppState};

const DEFAULT_CONFIG_FILE: &str = "festpass.yaml";

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    let signing_secret = resolve_secret(&config.storage.signing_secret)
        .context("storage.signing_secret could not be resolved")?;
    let operator_token = resolve_secret(&config.server.operator_token)
        .context("server.operator_token could not be resolved")?;

    let signer = UrlSigner::new(
        signing_secret.into_bytes(),
        config.server.public_base_url.clone(),
    );
    let store: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::new(&config.storage.base_dir, signer.clone())
            .context("object store initialization failed")?,
    );

    // Persistence backends: PostgreSQL when configured, in-memory otherwise.
    let (repository, sequence, queue): (
        Arc<dyn RegistrationRepository>,
        Arc<dyn RegistrationSequence>,
        Arc<dyn JobQueue>,
    ) = match &config.database {
        Some(db) => {
            info!("Using PostgreSQL persistence");
            let database = Database::new(&db.url)
                .await
                .context("database connection failed")?;
            database.migrate().await.context("schema migration failed")?;
            let pool = database.get_pool().clone();
            (
                Arc::new(PostgresRegistrationRepository::new(pool.clone())),
                Arc::new(PostgresRegistrationSequence::new(pool.clone())),
                Arc::new(PostgresJobQueue::new(pool, config.queue.retention)),
            )
        }
        None => {
            info!("Using in-memory persistence (single-node, non-durable)");
            (
                Arc::new(InMemoryRegistrationRepository::new()),
                Arc::new(InMemoryRegistrationSequence::new()),
                Arc::new(InMemoryJobQueue::new(config.queue.retention)),
            )
        }
    };

    // Probe enhancement providers once; the selection is pinned for this
    // instance's lifetime.
    let enhancer_selection = EnhancerRegistry::from_config(&config.enhancers)
        .probe()
        .await;
    let enhancement_available = enhancer_selection.active().is_some();

    // Compositor assets. A missing asset keeps the service up but makes
    // every credential job fail fast with the deployment defect.
    let renderer: Arc<dyn CredentialRenderer> =
        match Compositor::from_assets(&config.assets.template_path, &config.assets.font_path) {
            Ok(compositor) => Arc::new(compositor),
            Err(e) => {
                error!("Compositor assets unavailable - credential jobs will fail: {e}");
                Arc::new(FailedRenderer::new(e.to_string()))
            }
        };

    let event_bus = Arc::new(EventBus::with_default_capacity());
    spawn_event_logger(event_bus.clone());

    let registrations = Arc::new(RegistrationService::new(
        repository.clone(),
        sequence,
        queue.clone(),
        store.clone(),
        event_bus.clone(),
        config.registration.clone(),
        enhancement_available,
    ));
    let status = Arc::new(StatusService::new(
        repository.clone(),
        store.clone(),
        Duration::from_secs(config.storage.signed_url_ttl_secs),
    ));

    let worker = Arc::new(Worker::new(
        queue,
        repository,
        store.clone(),
        renderer,
        enhancer_selection,
        event_bus,
        config.queue.retry,
        Duration::from_secs(config.workers.enhancement_timeout_secs),
    ));
    let pool = WorkerPool::spawn(worker, config.workers.count);

    let state = Arc::new(AppState {
        registrations,
        status,
        store,
        signer,
        operator_token,
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("could not bind {}", config.server.bind_addr))?;
    info!("FestPass listening on {}", config.server.bind_addr);

    axum::serve(listener, api::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Draining worker pool");
    pool.shutdown().await;
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<ServiceConfig> {
    match path {
        Some(path) => ServiceConfig::from_yaml_file(&path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            ServiceConfig::from_yaml_file(DEFAULT_CONFIG_FILE)
                .context("failed to load festpass.yaml")
        }
        None => {
            info!("No config file found, using defaults");
            Ok(ServiceConfig::default())
        }
    }
}

/// Fire-and-forget notification sink: every domain event is logged, nothing
/// is consumed back by the pipeline.
fn spawn_event_logger(event_bus: Arc<EventBus>) {
    tokio::spawn(async move {
        let mut receiver = event_bus.subscribe();
        loop {
            match receiver.recv().await {
                Ok(event) => info!(event = ?event, "pipeline event"),
                Err(festpass_core::infrastructure::event_bus::EventBusError::Closed) => break,
                Err(_) => continue,
            }
        }
    });
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
