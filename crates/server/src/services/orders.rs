//! Order service: checkout, listings, delivery and the sales summary.

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use iutcart_core::{OrderId, OrderPrices, UserId};

use crate::db::{CatalogStore, DeliveryTransition, OrderStore, RepositoryError, UserStore};
use crate::models::{NewOrder, Order, OrderItem, SalesSummary, SellerOrder, ShippingAddress};
use crate::services::email::OutgoingEmail;
use crate::services::notifications::{NotificationQueue, NotifyError};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order not found")]
    NotFound,

    /// The order was delivered but its notification could not be queued.
    #[error("delivery notification failed: {0}")]
    Notification(NotifyError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Checkout payload, as posted by the cart.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub order_items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    #[serde(flatten)]
    pub prices: OrderPrices,
}

impl OrderDraft {
    fn validate(&self) -> Result<(), OrderError> {
        if self.order_items.is_empty() {
            return Err(OrderError::Validation("Order has no items".to_string()));
        }
        for item in &self.order_items {
            if item.quantity == 0 {
                return Err(OrderError::Validation(format!(
                    "Quantity of {} must be at least 1",
                    item.name
                )));
            }
            if item.price.is_sign_negative() {
                return Err(OrderError::Validation(format!(
                    "Price of {} must not be negative",
                    item.name
                )));
            }
        }
        self.prices
            .validate()
            .map_err(|e| OrderError::Validation(e.to_string()))
    }
}

/// Order service, borrowed per request from the application state.
pub struct OrderService<'a> {
    orders: &'a dyn OrderStore,
    users: &'a dyn UserStore,
    catalog: &'a dyn CatalogStore,
    notifier: &'a NotificationQueue,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(
        orders: &'a dyn OrderStore,
        users: &'a dyn UserStore,
        catalog: &'a dyn CatalogStore,
        notifier: &'a NotificationQueue,
    ) -> Self {
        Self {
            orders,
            users,
            catalog,
            notifier,
        }
    }

    /// Place an order for `buyer`.
    ///
    /// `totalPrice` is stored as supplied. A total that disagrees with its
    /// components is only logged.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for an empty order, a zero quantity or
    /// a negative price.
    #[instrument(skip(self, draft), fields(items = draft.order_items.len()))]
    pub async fn create(&self, buyer: UserId, draft: OrderDraft) -> Result<Order, OrderError> {
        draft.validate()?;

        if !draft.prices.total_is_consistent() {
            warn!(
                buyer = %buyer,
                total = %draft.prices.total_price,
                expected = %draft.prices.component_sum(),
                "Order total does not match items + shipping + tax"
            );
        }

        let order = self
            .orders
            .create(&NewOrder {
                user: buyer,
                order_items: draft.order_items,
                shipping_address: draft.shipping_address,
                payment_method: draft.payment_method,
                prices: draft.prices,
            })
            .await?;

        info!(order_id = %order.id, buyer = %buyer, "Order created");
        Ok(order)
    }

    /// Fetch one order by its path id.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the id does not parse or no order
    /// has it.
    pub async fn get(&self, id: &str) -> Result<Order, OrderError> {
        let id = parse_order_id(id)?;
        self.orders.get(id).await?.ok_or(OrderError::NotFound)
    }

    /// Every order, or one buyer's orders, newest first with buyer names.
    ///
    /// An empty filter means no filter.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` if `user_filter` is not a user id.
    pub async fn list_for_seller(
        &self,
        user_filter: Option<&str>,
    ) -> Result<Vec<SellerOrder>, OrderError> {
        let buyer = match user_filter.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                raw.parse::<UserId>()
                    .map_err(|_| OrderError::Validation("Invalid userId".to_string()))?,
            ),
            None => None,
        };
        Ok(self.orders.list_with_buyer(buyer).await?)
    }

    /// The caller's own orders.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn list_for_buyer(&self, buyer: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_for_buyer(buyer).await?)
    }

    /// Mark an order delivered and queue the buyer's notification.
    ///
    /// Repeating the call is a no-op: `deliveredAt` keeps its first value
    /// and no second email is queued.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for an unknown order and
    /// `OrderError::Notification` if the email could not be composed or
    /// queued. The delivery itself stays committed in that case.
    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, id: &str) -> Result<(), OrderError> {
        let id = parse_order_id(id)?;

        let order = match self.orders.mark_delivered(id, Utc::now()).await? {
            DeliveryTransition::NotFound => return Err(OrderError::NotFound),
            DeliveryTransition::AlreadyDelivered(_) => {
                info!(order_id = %id, "Order already delivered");
                return Ok(());
            }
            DeliveryTransition::Delivered(order) => order,
        };
        info!(order_id = %id, "Order delivered");

        let Some(buyer) = self.users.get_by_id(order.user).await? else {
            warn!(order_id = %id, buyer = %order.user, "Buyer gone, no delivery email");
            return Ok(());
        };

        let email = OutgoingEmail::order_delivered(&buyer, &order)
            .map_err(|e| OrderError::Notification(e.into()))?;
        self.notifier
            .enqueue(email)
            .await
            .map_err(OrderError::Notification)
    }

    /// Dashboard aggregates, computed concurrently.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if any aggregate fails.
    pub async fn summary(&self) -> Result<SalesSummary, OrderError> {
        let (num_users, totals, daily, categories) = tokio::try_join!(
            self.users.count(),
            self.orders.totals(),
            self.orders.daily(),
            self.catalog.category_counts(),
        )?;
        Ok(SalesSummary::new(num_users, totals, daily, categories))
    }
}

fn parse_order_id(raw: &str) -> Result<OrderId, OrderError> {
    raw.parse().map_err(|_| OrderError::NotFound)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeZone;
    use rust_decimal::Decimal;

    use super::*;
    use crate::config::NotificationConfig;
    use crate::db::memory::MemoryStore;
    use crate::models::NewUser;
    use crate::services::testing::RecordingMailer;
    use iutcart_core::{Email, ProductId, Roles};

    fn draft(total: i64) -> OrderDraft {
        OrderDraft {
            order_items: vec![OrderItem {
                product: ProductId::new(1),
                name: "Mug".to_string(),
                slug: "mug".to_string(),
                image: "/mug.jpg".to_string(),
                quantity: 1,
                price: Decimal::new(1000, 2),
            }],
            shipping_address: ShippingAddress {
                full_name: "A".to_string(),
                address: "1 Main St".to_string(),
                city: "Dhaka".to_string(),
                postal_code: "1000".to_string(),
                country: "BD".to_string(),
            },
            payment_method: "PayPal".to_string(),
            prices: OrderPrices {
                items_price: Decimal::new(1000, 2),
                shipping_price: Decimal::ZERO,
                tax_price: Decimal::ZERO,
                total_price: Decimal::new(total, 2),
            },
        }
    }

    async fn setup() -> (Arc<MemoryStore>, NotificationQueue, Arc<RecordingMailer>, UserId) {
        let store = MemoryStore::new();
        let buyer = UserStore::create(
            store.as_ref(),
            &NewUser {
                name: "A".to_string(),
                email: Email::parse("a@x.com").unwrap(),
                password_hash: "x".to_string(),
                roles: Roles::BUYER,
            },
        )
        .await
        .unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let (queue, _worker) =
            NotificationQueue::spawn(mailer.clone(), NotificationConfig::default());
        (store, queue, mailer, buyer.id)
    }

    fn service<'a>(store: &'a MemoryStore, queue: &'a NotificationQueue) -> OrderService<'a> {
        OrderService::new(store, store, store, queue)
    }

    #[tokio::test]
    async fn test_create_stores_total_verbatim() {
        let (store, queue, _, buyer) = setup().await;
        let order = service(&store, &queue)
            .create(buyer, draft(999_999))
            .await
            .unwrap();
        assert_eq!(order.prices.total_price, Decimal::new(999_999, 2));
        assert_eq!(order.user, buyer);
        assert!(!order.is_delivered);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (store, queue, _, buyer) = setup().await;
        let svc = service(&store, &queue);

        let mut empty = draft(1000);
        empty.order_items.clear();
        assert!(matches!(
            svc.create(buyer, empty).await,
            Err(OrderError::Validation(_))
        ));

        let mut zero = draft(1000);
        zero.order_items[0].quantity = 0;
        assert!(matches!(
            svc.create(buyer, zero).await,
            Err(OrderError::Validation(_))
        ));

        assert!(matches!(
            svc.create(buyer, draft(-1)).await,
            Err(OrderError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_get_unknown_or_malformed_is_not_found() {
        let (store, queue, _, _) = setup().await;
        let svc = service(&store, &queue);
        assert!(matches!(svc.get("404").await, Err(OrderError::NotFound)));
        assert!(matches!(
            svc.get("64b0f1c2a9e1").await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_mark_delivered_is_idempotent() {
        let (store, queue, mailer, buyer) = setup().await;
        let svc = service(&store, &queue);
        let order = svc.create(buyer, draft(1000)).await.unwrap();
        let id = order.id.to_string();

        svc.mark_delivered(&id).await.unwrap();
        let first = svc.get(&id).await.unwrap().delivered_at;
        svc.mark_delivered(&id).await.unwrap();
        let second = svc.get(&id).await.unwrap();

        assert!(second.is_delivered);
        assert!(first.is_some());
        assert_eq!(second.delivered_at, first);

        let sent = mailer.wait_for(1, Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(sent[0].subject, format!("New order {id}"));
        assert_eq!(sent[0].to_address, "a@x.com");
    }

    #[tokio::test]
    async fn test_mark_delivered_unknown_order() {
        let (store, queue, _, _) = setup().await;
        assert!(matches!(
            service(&store, &queue).mark_delivered("77").await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_mark_delivered_reports_unqueueable_email() {
        let (store, _, _, buyer) = setup().await;
        // A queue whose worker is gone.
        let mailer = Arc::new(RecordingMailer::default());
        let (queue, worker) = NotificationQueue::spawn(mailer, NotificationConfig::default());
        worker.abort();
        let _ = worker.await;

        let svc = service(&store, &queue);
        let order = svc.create(buyer, draft(1000)).await.unwrap();
        let id = order.id.to_string();

        assert!(matches!(
            svc.mark_delivered(&id).await,
            Err(OrderError::Notification(NotifyError::QueueClosed))
        ));
        // The delivery stays committed.
        assert!(svc.get(&id).await.unwrap().is_delivered);
    }

    #[tokio::test]
    async fn test_seller_filter() {
        let (store, queue, _, buyer) = setup().await;
        let svc = service(&store, &queue);
        svc.create(buyer, draft(1000)).await.unwrap();
        svc.create(UserId::new(99), draft(1000)).await.unwrap();

        assert_eq!(svc.list_for_seller(None).await.unwrap().len(), 2);
        assert_eq!(svc.list_for_seller(Some("")).await.unwrap().len(), 2);
        let filtered = svc
            .list_for_seller(Some(&buyer.to_string()))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(matches!(
            svc.list_for_seller(Some("abc")).await,
            Err(OrderError::Validation(_))
        ));
        assert_eq!(svc.list_for_buyer(buyer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_summary_buckets_ascending() {
        let (store, queue, _, buyer) = setup().await;
        let svc = service(&store, &queue);
        store.add_product("Mug", "Kitchen").await;
        store.add_product("Shirt", "Apparel").await;
        store.add_product("Cap", "Apparel").await;

        let days = [
            Utc.with_ymd_and_hms(2026, 10, 18, 23, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 18, 0, 10, 0).unwrap(),
        ];
        for day in days {
            let order = svc.create(buyer, draft(1000)).await.unwrap();
            store.set_order_created_at(order.id, day).await;
        }

        let summary = svc.summary().await.unwrap();
        assert_eq!(summary.users[0].num_users, 1);
        assert_eq!(summary.orders[0].num_orders, 3);
        assert_eq!(summary.orders[0].total_sales, Decimal::new(3000, 2));

        let buckets: Vec<(&str, i64)> = summary
            .daily_orders
            .iter()
            .map(|d| (d.day.as_str(), d.orders))
            .collect();
        assert_eq!(buckets, [("2026-10-17", 1), ("2026-10-18", 2)]);

        let categories: Vec<&str> = summary
            .product_categories
            .iter()
            .map(|c| c.category.as_str())
            .collect();
        assert_eq!(categories, ["Apparel", "Kitchen"]);
    }
}
