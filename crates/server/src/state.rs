//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db::{CatalogStore, OrderStore, Stores, UserStore};
use crate::services::{AuthService, NotificationQueue, OrderService, TokenService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the stores, the token service and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    stores: Stores,
    tokens: TokenService,
    notifier: NotificationQueue,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `stores` - User, order and catalog stores
    /// * `notifier` - Queue feeding the email worker
    #[must_use]
    pub fn new(config: ServerConfig, stores: Stores, notifier: NotificationQueue) -> Self {
        let tokens = TokenService::new(&config.tokens);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                tokens,
                notifier,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.inner.stores.users.as_ref()
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.stores.orders.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn CatalogStore {
        self.inner.stores.catalog.as_ref()
    }

    /// Get a reference to the token service.
    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    #[must_use]
    pub fn notifier(&self) -> &NotificationQueue {
        &self.inner.notifier
    }

    /// Authentication service for one request.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(
            self.users(),
            self.tokens(),
            self.notifier(),
            &self.inner.config.base_url,
        )
    }

    /// Order service for one request.
    #[must_use]
    pub fn order_service(&self) -> OrderService<'_> {
        OrderService::new(self.orders(), self.users(), self.catalog(), self.notifier())
    }
}
