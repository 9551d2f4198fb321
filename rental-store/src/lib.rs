pub mod admin_repo;
pub mod app_config;
pub mod database;
pub mod invoice_repo;
pub mod mailer;
pub mod memory;
pub mod order_repo;
pub mod product_repo;
pub mod user_repo;

use rental_core::repository::Stores;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

pub use database::DbClient;
pub use mailer::{build_mailer, LogMailer, SmtpMailer};
pub use memory::MemoryStore;

use admin_repo::{PgAuditRepository, PgCouponRepository, PgSettingsRepository};
use app_config::DatabaseConfig;
use invoice_repo::PgInvoiceRepository;
use order_repo::PgOrderRepository;
use product_repo::PgProductRepository;
use user_repo::PgUserRepository;

/// Repositories backed by one Postgres pool.
pub fn postgres_stores(pool: PgPool) -> Stores {
    Stores {
        users: Arc::new(PgUserRepository::new(pool.clone())),
        products: Arc::new(PgProductRepository::new(pool.clone())),
        orders: Arc::new(PgOrderRepository::new(pool.clone())),
        invoices: Arc::new(PgInvoiceRepository::new(pool.clone())),
        coupons: Arc::new(PgCouponRepository::new(pool.clone())),
        settings: Arc::new(PgSettingsRepository::new(pool.clone())),
        audit: Arc::new(PgAuditRepository::new(pool)),
    }
}

pub fn memory_stores() -> Stores {
    Stores::from_backend(Arc::new(MemoryStore::new()))
}

/// Open the configured backend, running migrations for Postgres.
pub async fn open_stores(
    config: &DatabaseConfig,
) -> Result<Stores, Box<dyn std::error::Error + Send + Sync>> {
    if config.is_memory() {
        info!("Using in-memory store; data is lost on exit");
        return Ok(memory_stores());
    }

    let db = DbClient::new(&config.url, config.max_connections).await?;
    if config.run_migrations {
        db.migrate().await?;
    }
    info!("Connected to Postgres");
    Ok(postgres_stores(db.pool))
}
