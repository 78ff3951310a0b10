//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod console_access_event_notifier;
mod http_access_event_notifier;
mod in_memory_access_repository;
mod in_memory_audit_repository;
mod in_memory_checklist_repository;
mod in_memory_grant_snapshot_cache;
mod postgres_access_repository;
mod postgres_audit_repository;
mod postgres_checklist_repository;
mod redis_grant_snapshot_cache;

pub use console_access_event_notifier::ConsoleAccessEventNotifier;
pub use http_access_event_notifier::HttpAccessEventNotifier;
pub use in_memory_access_repository::InMemoryAccessRepository;
pub use in_memory_audit_repository::InMemoryAuditRepository;
pub use in_memory_checklist_repository::InMemoryChecklistRepository;
pub use in_memory_grant_snapshot_cache::InMemoryGrantSnapshotCache;
pub use postgres_access_repository::PostgresAccessRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_checklist_repository::PostgresChecklistRepository;
pub use redis_grant_snapshot_cache::RedisGrantSnapshotCache;

/// Embedded schema migrations for the PostgreSQL adapters.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
