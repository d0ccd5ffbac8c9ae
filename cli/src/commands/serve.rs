// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `intake serve`
//!
//! Builds every adapter selected by the configuration, starts the
//! submission worker and serves the HTTP API until Ctrl+C or SIGTERM. On
//! shutdown the server stops accepting requests first, then the worker
//! finishes the submissions already accepted.

use anyhow::{Context, Result};
use axum::Router;
use clap::Args;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use benefits_intake_core::application::{
    StandardApplicationService, StorageGateway, SubmissionOrchestrator, SubmissionWorker, TaskDispatcher,
};
use benefits_intake_core::domain::config::{DatabaseBackend, HashingBackend, IntakeConfigManifest};
use benefits_intake_core::domain::hashing::IdentifierHasher;
use benefits_intake_core::domain::repository::PostgresConfig;
use benefits_intake_core::domain::task::TaskQueue;
use benefits_intake_core::infrastructure::db::Database;
use benefits_intake_core::infrastructure::event_bus::EventBus;
use benefits_intake_core::infrastructure::hashing::{HmacIdentifierHasher, PostgresIdentifierHasher};
use benefits_intake_core::infrastructure::jwt::AccessTokenVerifier;
use benefits_intake_core::infrastructure::repositories::Repositories;
use benefits_intake_core::infrastructure::storage::create_object_store;
use benefits_intake_core::infrastructure::task_queue::SqsTaskQueue;
use benefits_intake_core::presentation::api::body_limit;
use benefits_intake_core::presentation::rate_limit::RateLimiters;
use benefits_intake_core::presentation::{app, AppState, HealthProbes};

use crate::logging::{init_logging, LogFormat};

const RATE_LIMIT_HOUSEKEEPING: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Bind address (overrides spec.server.bind_address)
    #[arg(long, env = "INTAKE_HOST")]
    pub host: Option<String>,

    /// HTTP port (overrides spec.server.port)
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Apply pending migrations before serving
    #[arg(long)]
    pub migrate: bool,
}

pub async fn execute(
    args: ServeArgs,
    config_path: Option<PathBuf>,
    log_level: Option<String>,
    log_format: Option<LogFormat>,
) -> Result<()> {
    let config = IntakeConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    let logging = &config.spec.observability.logging;
    init_logging(
        log_level.as_deref().unwrap_or(&logging.level),
        log_format.unwrap_or_else(|| LogFormat::from_config(&logging.format)),
    )?;

    config.validate().context("Configuration validation failed")?;
    info!("Configuration loaded: {}", config.metadata.name);

    let spec = &config.spec;

    if let Some(metrics) = spec.observability.metrics.as_ref().filter(|m| m.enabled) {
        let addr = SocketAddr::from(([0, 0, 0, 0], metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start Prometheus exporter")?;
        info!("Prometheus metrics exposed on {}", addr);
    }

    // Persistence
    let database = match spec.database.backend {
        DatabaseBackend::Postgres => {
            let url = spec
                .database
                .url
                .clone()
                .context("spec.database.url is required for the postgres backend")?;
            let database = Database::connect(&PostgresConfig {
                connection_string: url,
                max_connections: spec.database.max_connections,
            })
            .await?;
            if args.migrate {
                database.migrate().await?;
                info!("Database migrations applied ({} recorded)", database.applied_migrations().await);
            }
            Some(database)
        }
        DatabaseBackend::Memory => {
            warn!("Using in-memory repositories; applications are lost on restart");
            None
        }
    };
    let repositories = match &database {
        Some(database) => Repositories::postgres(database),
        None => Repositories::in_memory(),
    };

    let store = create_object_store(&spec.storage).context("Failed to initialize object store")?;
    info!("Object store backend: {:?}", spec.storage.backend);

    let dispatcher = match &spec.queue.sqs_queue_url {
        Some(url) => {
            let queue: Arc<dyn TaskQueue> = Arc::new(SqsTaskQueue::connect(url.clone(), spec.queue.region.clone()).await);
            info!("Evaluation tasks dispatched to {}", url);
            TaskDispatcher::new(Some(queue))
        }
        None => {
            warn!("SQS queue URL not configured; evaluation tasks will not be dispatched");
            TaskDispatcher::disabled()
        }
    };

    let hasher: Option<Arc<dyn IdentifierHasher>> = match spec.hashing.backend {
        HashingBackend::Database => match &database {
            Some(database) => Some(Arc::new(PostgresIdentifierHasher::new(database.get_pool().clone()))),
            None => anyhow::bail!("Database identifier hashing requires the postgres backend"),
        },
        HashingBackend::Hmac => {
            let key = spec
                .hashing
                .hmac_key
                .as_deref()
                .context("spec.hashing.hmac_key is required for the hmac backend")?;
            Some(Arc::new(HmacIdentifierHasher::new(key).context("Invalid identifier hashing key")?))
        }
        HashingBackend::Disabled => {
            warn!("Identifier hashing disabled");
            None
        }
    };

    // Application services
    let event_bus = EventBus::with_default_capacity();
    let gateway = StorageGateway::new(
        store.clone(),
        repositories.files.clone(),
        event_bus.clone(),
        spec.storage.bucket.clone(),
    );
    let mut orchestrator = SubmissionOrchestrator::new(
        &repositories,
        gateway,
        dispatcher,
        spec.intake.clone(),
        event_bus.clone(),
    );
    if let Some(hasher) = hasher {
        orchestrator = orchestrator.with_hasher(hasher);
    }
    let orchestrator = Arc::new(orchestrator);

    let (worker, submissions) = SubmissionWorker::new(
        orchestrator.clone(),
        spec.queue.worker_capacity,
        spec.queue.max_concurrent_jobs,
    );
    let worker_handle = Arc::new(worker).start();

    let applications = Arc::new(StandardApplicationService::new(
        &repositories,
        store.clone(),
        event_bus.clone(),
        spec.demo.caseworker_id(),
    ));

    let verifier = spec
        .auth
        .jwt_secret
        .as_deref()
        .map(|secret| AccessTokenVerifier::new(secret, &spec.auth.audience));
    if verifier.is_none() {
        warn!("Access token secret not configured; private routes will reject every request");
    }
    let demo_applicant = spec.demo.applicant_id();
    if demo_applicant.is_none() {
        warn!("Demo applicant not configured; demo routes are unavailable");
    }

    let rate_limits = Arc::new(RateLimiters::from_config(&spec.rate_limits));
    let housekeeping = rate_limits.clone().start_housekeeping(RATE_LIMIT_HOUSEKEEPING);

    let state = Arc::new(AppState {
        orchestrator,
        submissions,
        applications,
        users: repositories.users.clone(),
        verifier,
        required_role: spec.auth.required_role.clone(),
        demo_applicant,
        rate_limits,
        health: HealthProbes {
            database: repositories.applications.clone(),
            storage: store,
        },
        cors_allowed_origins: spec.server.cors_allowed_origins.clone(),
        body_limit: body_limit(&spec.intake, spec.server.body_slack_bytes),
        started_at: Instant::now(),
    });
    let router: Router = app(state);

    let host = args.host.unwrap_or_else(|| spec.server.bind_address.clone());
    let port = args.port.unwrap_or(spec.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Intake API listening on {}", addr);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // The router owned the last submission queue handle; the worker now drains
    housekeeping.abort();
    info!("HTTP server stopped, waiting for in-flight submissions");
    if let Err(e) = worker_handle.await {
        error!("Submission worker terminated abnormally: {}", e);
    }

    info!("Intake service shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
