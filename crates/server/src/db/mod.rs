//! Persistence for users, orders and the product catalog.
//!
//! # Tables
//!
//! - `users` - Accounts, password hashes and the pending reset token
//! - `orders` - Orders with JSONB snapshots of line items and shipping address
//! - `products` - Catalog rows; only category counts are read here
//!
//! Handlers talk to the store traits, never to the pool, so the HTTP tests
//! can run against [`memory::MemoryStore`].
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! sqlx migrate run --source crates/server/migrations
//! ```

pub mod catalog;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod orders;
pub mod users;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use thiserror::Error;

use iutcart_core::{Email, OrderId, UserId};

use crate::models::{
    CategoryCount, DailyOrders, NewOrder, NewUser, Order, OrderTotals, SellerOrder, User,
};

pub use catalog::PgCatalogStore;
pub use orders::PgOrderStore;
pub use users::PgUserStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Outcome of asking the store to mark an order delivered.
#[derive(Debug, Clone)]
pub enum DeliveryTransition {
    /// This call moved the order to delivered.
    Delivered(Order),
    /// The order was already delivered; nothing changed.
    AlreadyDelivered(Order),
    NotFound,
}

/// Credential store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is already registered.
    async fn create(&self, user: &NewUser) -> Result<User, RepositoryError>;

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Find the user currently holding exactly this reset token.
    async fn get_by_reset_token(&self, token: &str) -> Result<Option<User>, RepositoryError>;

    /// Replace the user's reset token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    async fn set_reset_token(&self, id: UserId, token: &str) -> Result<(), RepositoryError>;

    /// Set a new password hash for the holder of `token` and clear the token
    /// in the same write.
    ///
    /// Returns `None` when no user holds the token any more.
    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
    ) -> Result<Option<User>, RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;

    /// Check the backing store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Order store.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Orders of one buyer, or of everyone when `buyer` is `None`, newest
    /// first and joined with the buyer's name.
    async fn list_with_buyer(
        &self,
        buyer: Option<UserId>,
    ) -> Result<Vec<SellerOrder>, RepositoryError>;

    /// Orders placed by `buyer`, oldest first.
    async fn list_for_buyer(&self, buyer: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Move an order to delivered at `at` unless it already is.
    ///
    /// Concurrent callers see exactly one `Delivered`.
    async fn mark_delivered(
        &self,
        id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<DeliveryTransition, RepositoryError>;

    /// Order count and sum of `totalPrice`.
    async fn totals(&self) -> Result<OrderTotals, RepositoryError>;

    /// Per UTC day order counts and sales, ascending by day.
    async fn daily(&self) -> Result<Vec<DailyOrders>, RepositoryError>;
}

/// Read-only view of the product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Product counts per category, ordered by category.
    async fn category_counts(&self) -> Result<Vec<CategoryCount>, RepositoryError>;
}

/// The store handles the application runs against.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn CatalogStore>,
}

impl Stores {
    /// `PostgreSQL`-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            catalog: Arc::new(PgCatalogStore::new(pool)),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// Every connection runs with `statement_timeout` set so no query can hold a
/// request open indefinitely.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
/// * `statement_timeout` - Per-statement limit applied server side
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the connection cannot be
/// established.
pub async fn create_pool(
    database_url: &SecretString,
    statement_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url.expose_secret())?
        .options([("statement_timeout", statement_timeout.as_millis().to_string())]);

    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
pub(crate) fn map_unique_violation(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}
