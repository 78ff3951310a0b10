//! Accessledger housekeeping worker.
//!
//! Runs schema migrations, sweeps validation summaries for drift and reports
//! delegations whose window closed while they are still flagged active.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use accessledger_application::{
    AccessAdminService, AccessEventNotifier, AuthorizationService, ChecklistService,
    GrantSnapshotCache,
};
use accessledger_core::{AppError, AppResult};
use accessledger_domain::PermissionCatalog;
use accessledger_infrastructure::{
    ConsoleAccessEventNotifier, HttpAccessEventNotifier, InMemoryGrantSnapshotCache, MIGRATOR,
    PostgresAccessRepository, PostgresAuditRepository, PostgresChecklistRepository,
    RedisGrantSnapshotCache,
};

use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerMode {
    Migrate,
    ReconcileOnce,
    Run,
}

impl WorkerMode {
    fn parse(value: Option<&str>) -> AppResult<Self> {
        match value {
            None | Some("run") => Ok(Self::Run),
            Some("migrate") => Ok(Self::Migrate),
            Some("reconcile-once") => Ok(Self::ReconcileOnce),
            Some(other) => Err(AppError::Validation(format!(
                "unknown worker mode '{other}', expected 'run', 'migrate' or 'reconcile-once'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    catalog_path: String,
    reconcile_interval_seconds: u64,
    reconcile_repair: bool,
    delegation_report_limit: usize,
    notify_webhook_url: Option<String>,
    redis_url: Option<String>,
    grant_cache_ttl_seconds: u32,
}

struct Services {
    admin_service: AccessAdminService,
    checklist_service: ChecklistService,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mode = WorkerMode::parse(env::args().nth(1).as_deref())?;
    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;

    if mode == WorkerMode::Migrate {
        return run_migrations(&pool).await;
    }

    let catalog = Arc::new(load_catalog(config.catalog_path.as_str())?);
    info!(
        catalog_version = catalog.version(),
        permissions = catalog.list_permissions().len(),
        roles = catalog.list_roles().len(),
        checks = catalog.list_checks().len(),
        "permission catalog loaded"
    );

    let services = build_services(pool, catalog, &config)?;

    if mode == WorkerMode::ReconcileOnce {
        run_sweep(&services, &config).await;
        return Ok(());
    }

    info!(
        reconcile_interval_seconds = config.reconcile_interval_seconds,
        reconcile_repair = config.reconcile_repair,
        delegation_report_limit = config.delegation_report_limit,
        "accessledger-worker started"
    );

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.reconcile_interval_seconds));
    loop {
        interval.tick().await;
        run_sweep(&services, &config).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;
    info!("database migrations applied");
    Ok(())
}

fn load_catalog(path: &str) -> AppResult<PermissionCatalog> {
    let raw = std::fs::read_to_string(path).map_err(|error| {
        AppError::Validation(format!("failed to read permission catalog '{path}': {error}"))
    })?;
    PermissionCatalog::from_json(raw.as_str())
}

fn build_services(
    pool: PgPool,
    catalog: Arc<PermissionCatalog>,
    config: &WorkerConfig,
) -> AppResult<Services> {
    let access_repository = Arc::new(PostgresAccessRepository::new(pool.clone()));
    let checklist_repository = Arc::new(PostgresChecklistRepository::new(pool.clone()));
    let audit_repository = Arc::new(PostgresAuditRepository::new(pool));

    let snapshot_cache: Arc<dyn GrantSnapshotCache> = match &config.redis_url {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url.as_str()).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL '{redis_url}': {error}"))
            })?;
            Arc::new(RedisGrantSnapshotCache::new(client, "accessledger:grants"))
        }
        None => Arc::new(InMemoryGrantSnapshotCache::new()),
    };

    let notifier: Arc<dyn AccessEventNotifier> = match &config.notify_webhook_url {
        Some(endpoint) => {
            let http_client = reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .map_err(|error| {
                    AppError::Internal(format!("failed to build HTTP client: {error}"))
                })?;
            Arc::new(HttpAccessEventNotifier::new(
                http_client,
                endpoint.as_str(),
                3,
                250,
            ))
        }
        None => Arc::new(ConsoleAccessEventNotifier::new()),
    };

    let authorization_service = AuthorizationService::new(
        catalog.clone(),
        access_repository.clone(),
        audit_repository.clone(),
    )
    .with_snapshot_cache(snapshot_cache, config.grant_cache_ttl_seconds);

    let admin_service = AccessAdminService::new(
        catalog.clone(),
        authorization_service.clone(),
        access_repository.clone(),
        access_repository,
        audit_repository.clone(),
        notifier,
    );
    let checklist_service = ChecklistService::new(
        catalog,
        authorization_service,
        checklist_repository,
        audit_repository,
    );

    Ok(Services {
        admin_service,
        checklist_service,
    })
}

async fn run_sweep(services: &Services, config: &WorkerConfig) {
    match services
        .checklist_service
        .reconcile_all(config.reconcile_repair)
        .await
    {
        Ok(report) => info!(
            scanned = report.scanned,
            drifted = report.drifted,
            repaired = report.repaired,
            failed = report.failed,
            "validation summary sweep finished"
        ),
        Err(error) => warn!(error = %error, "validation summary sweep failed"),
    }

    match services
        .admin_service
        .list_expired_active_delegations(Utc::now(), config.delegation_report_limit)
        .await
    {
        Ok(expired) => {
            for entry in &expired {
                warn!(
                    tenant_id = %entry.tenant_id,
                    delegation_id = %entry.rule.delegation_id,
                    delegator = %entry.rule.delegator,
                    delegate = %entry.rule.delegate,
                    ended_at = %entry.rule.window.ends_at(),
                    "delegation expired but is still flagged active"
                );
            }
            info!(count = expired.len(), "expired delegation report finished");
        }
        Err(error) => warn!(error = %error, "expired delegation report failed"),
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let catalog_path = required_env("PERMISSION_CATALOG_PATH")?;
        let reconcile_interval_seconds = parse_env_u64("RECONCILE_INTERVAL_SECONDS", 300)?;
        let reconcile_repair = parse_env_bool("RECONCILE_REPAIR", false)?;
        let delegation_report_limit = parse_env_usize("DELEGATION_REPORT_LIMIT", 200)?;
        let notify_webhook_url = optional_env("NOTIFY_WEBHOOK_URL");
        let redis_url = optional_env("REDIS_URL");
        let grant_cache_ttl_seconds = parse_env_u32("GRANT_CACHE_TTL_SECONDS", 5)?;

        if reconcile_interval_seconds == 0 {
            return Err(AppError::Validation(
                "RECONCILE_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if delegation_report_limit == 0 {
            return Err(AppError::Validation(
                "DELEGATION_REPORT_LIMIT must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            catalog_path,
            reconcile_interval_seconds,
            reconcile_repair,
            delegation_report_limit,
            notify_webhook_url,
            redis_url,
            grant_cache_ttl_seconds,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> AppResult<bool> {
    match env::var(name) {
        Ok(value) => parse_bool(name, value.as_str()),
        Err(_) => Ok(default),
    }
}

fn parse_bool(name: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "invalid {name} value '{value}': expected a boolean"
        ))),
    }
}
