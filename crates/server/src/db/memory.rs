//! In-memory stores for tests.
//!
//! One [`MemoryStore`] implements all three store traits over a single lock,
//! so each operation is atomic the same way a single SQL statement is.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use iutcart_core::{Email, OrderId, Roles, UserId};

use super::{CatalogStore, DeliveryTransition, OrderStore, RepositoryError, Stores, UserStore};
use crate::models::{
    BuyerRef, CategoryCount, DailyOrders, NewOrder, NewUser, Order, OrderTotals, SellerOrder, User,
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    orders: Vec<Order>,
    /// `(name, category)`
    products: Vec<(String, String)>,
    next_user_id: i64,
    next_order_id: i64,
}

/// Users, orders and products held in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Use this store for every store handle.
    #[must_use]
    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            users: self.clone(),
            orders: self.clone(),
            catalog: self.clone(),
        }
    }

    /// Make `ping` fail, as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn add_product(&self, name: &str, category: &str) {
        self.state
            .write()
            .await
            .products
            .push((name.to_owned(), category.to_owned()));
    }

    /// Change a user's role flags. Returns `false` if there is no such user.
    pub async fn set_roles(&self, id: UserId, roles: Roles) -> bool {
        let mut state = self.state.write().await;
        match state.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.roles = roles;
                true
            }
            None => false,
        }
    }

    /// Backdate an order. Returns `false` if there is no such order.
    pub async fn set_order_created_at(&self, id: OrderId, at: DateTime<Utc>) -> bool {
        let mut state = self.state.write().await;
        match state.orders.iter_mut().find(|o| o.id == id) {
            Some(order) => {
                order.created_at = at;
                true
            }
            None => false,
        }
    }

    /// Remove a user, leaving their orders behind.
    pub async fn delete_user(&self, id: UserId) {
        self.state.write().await.users.retain(|u| u.id != id);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        state.next_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: UserId::new(state.next_user_id),
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            roles: user.roles,
            reset_token: None,
            created_at: now,
            updated_at: now,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| &u.email == email).cloned())
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_by_reset_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn set_reset_token(&self, id: UserId, token: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepositoryError::NotFound)?;
        user.reset_token = Some(token.to_owned());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(user) = state
            .users
            .iter_mut()
            .find(|u| u.reset_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };
        user.password_hash = password_hash.to_owned();
        user.reset_token = None;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let state = self.state.read().await;
        Ok(i64::try_from(state.users.len()).unwrap_or(i64::MAX))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;
        state.next_order_id += 1;
        let now = Utc::now();
        let created = Order {
            id: OrderId::new(state.next_order_id),
            order_items: order.order_items.clone(),
            shipping_address: order.shipping_address.clone(),
            payment_method: order.payment_method.clone(),
            prices: order.prices,
            user: order.user,
            is_delivered: false,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.push(created.clone());
        Ok(created)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_with_buyer(
        &self,
        buyer: Option<UserId>,
    ) -> Result<Vec<SellerOrder>, RepositoryError> {
        let state = self.state.read().await;
        let mut orders: Vec<&Order> = state
            .orders
            .iter()
            .filter(|o| buyer.is_none_or(|b| o.user == b))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(orders
            .into_iter()
            .map(|order| {
                let buyer = state
                    .users
                    .iter()
                    .find(|u| u.id == order.user)
                    .map(|u| BuyerRef {
                        id: u.id,
                        name: u.name.clone(),
                    });
                order.clone().with_buyer(buyer)
            })
            .collect())
    }

    async fn list_for_buyer(&self, buyer: UserId) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.user == buyer)
            .cloned()
            .collect())
    }

    async fn mark_delivered(
        &self,
        id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<DeliveryTransition, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.iter_mut().find(|o| o.id == id) else {
            return Ok(DeliveryTransition::NotFound);
        };
        if order.is_delivered {
            return Ok(DeliveryTransition::AlreadyDelivered(order.clone()));
        }
        order.is_delivered = true;
        order.delivered_at = Some(at);
        order.updated_at = at;
        Ok(DeliveryTransition::Delivered(order.clone()))
    }

    async fn totals(&self) -> Result<OrderTotals, RepositoryError> {
        let state = self.state.read().await;
        Ok(OrderTotals {
            num_orders: i64::try_from(state.orders.len()).unwrap_or(i64::MAX),
            total_sales: state.orders.iter().map(|o| o.prices.total_price).sum(),
        })
    }

    async fn daily(&self) -> Result<Vec<DailyOrders>, RepositoryError> {
        let state = self.state.read().await;
        let mut days: BTreeMap<String, (i64, Decimal)> = BTreeMap::new();
        for order in &state.orders {
            let day = order.created_at.format("%Y-%m-%d").to_string();
            let entry = days.entry(day).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += order.prices.total_price;
        }

        Ok(days
            .into_iter()
            .map(|(day, (orders, sales))| DailyOrders { day, orders, sales })
            .collect())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn category_counts(&self) -> Result<Vec<CategoryCount>, RepositoryError> {
        let state = self.state.read().await;
        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for (_, category) in &state.products {
            *counts.entry(category.as_str()).or_insert(0) += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(category, count)| CategoryCount {
                category: category.to_owned(),
                count,
            })
            .collect())
    }
}
