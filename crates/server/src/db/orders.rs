//! `PostgreSQL` order store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;

use iutcart_core::{OrderId, OrderPrices, UserId};

use super::{DeliveryTransition, OrderStore, RepositoryError};
use crate::models::{
    BuyerRef, DailyOrders, NewOrder, Order, OrderItem, OrderTotals, SellerOrder, ShippingAddress,
};

const ORDER_COLUMNS: &str = "o.id, o.user_id, o.order_items, o.shipping_address, \
                             o.payment_method, o.items_price, o.shipping_price, o.tax_price, \
                             o.total_price, o.is_delivered, o.delivered_at, o.created_at, \
                             o.updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    order_items: Json<Vec<OrderItem>>,
    shipping_address: Json<ShippingAddress>,
    payment_method: String,
    items_price: Decimal,
    shipping_price: Decimal,
    tax_price: Decimal,
    total_price: Decimal,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            order_items: row.order_items.0,
            shipping_address: row.shipping_address.0,
            payment_method: row.payment_method,
            prices: OrderPrices {
                items_price: row.items_price,
                shipping_price: row.shipping_price,
                tax_price: row.tax_price,
                total_price: row.total_price,
            },
            user: row.user_id,
            is_delivered: row.is_delivered,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// An order row with the buyer's name from a `LEFT JOIN`.
#[derive(sqlx::FromRow)]
struct SellerOrderRow {
    #[sqlx(flatten)]
    order: OrderRow,
    buyer_name: Option<String>,
}

impl From<SellerOrderRow> for SellerOrder {
    fn from(row: SellerOrderRow) -> Self {
        let buyer = row.buyer_name.map(|name| BuyerRef {
            id: row.order.user_id,
            name,
        });
        Order::from(row.order).with_buyer(buyer)
    }
}

#[derive(sqlx::FromRow)]
struct DailyRow {
    day: String,
    orders: i64,
    sales: Decimal,
}

/// Orders table access.
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let sql = format!(
            "INSERT INTO orders AS o (user_id, order_items, shipping_address, payment_method, \
                                      items_price, shipping_price, tax_price, total_price) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.user)
            .bind(Json(&order.order_items))
            .bind(Json(&order.shipping_address))
            .bind(&order.payment_method)
            .bind(order.prices.items_price)
            .bind(order.prices.shipping_price)
            .bind(order.prices.tax_price)
            .bind(order.prices.total_price)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Order::from))
    }

    async fn list_with_buyer(
        &self,
        buyer: Option<UserId>,
    ) -> Result<Vec<SellerOrder>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS}, u.name AS buyer_name \
             FROM orders o \
             LEFT JOIN users u ON u.id = o.user_id \
             WHERE $1::BIGINT IS NULL OR o.user_id = $1 \
             ORDER BY o.created_at DESC, o.id DESC"
        );
        let rows = sqlx::query_as::<_, SellerOrderRow>(&sql)
            .bind(buyer)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(SellerOrder::from).collect())
    }

    async fn list_for_buyer(&self, buyer: UserId) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.user_id = $1 ORDER BY o.id"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(buyer)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn mark_delivered(
        &self,
        id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<DeliveryTransition, RepositoryError> {
        // Only one concurrent caller can match `NOT is_delivered`.
        let sql = format!(
            "UPDATE orders AS o \
             SET is_delivered = TRUE, delivered_at = $2, updated_at = $2 \
             WHERE o.id = $1 AND NOT o.is_delivered \
             RETURNING {ORDER_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = updated {
            return Ok(DeliveryTransition::Delivered(row.into()));
        }

        Ok(match self.get(id).await? {
            Some(order) => DeliveryTransition::AlreadyDelivered(order),
            None => DeliveryTransition::NotFound,
        })
    }

    async fn totals(&self) -> Result<OrderTotals, RepositoryError> {
        let (num_orders, total_sales): (i64, Decimal) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total_price), 0) FROM orders",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderTotals {
            num_orders,
            total_sales,
        })
    }

    async fn daily(&self) -> Result<Vec<DailyOrders>, RepositoryError> {
        let rows = sqlx::query_as::<_, DailyRow>(
            "SELECT to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD') AS day, \
                    COUNT(*) AS orders, \
                    SUM(total_price) AS sales \
             FROM orders \
             GROUP BY day \
             ORDER BY day",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| DailyOrders {
                day: r.day,
                orders: r.orders,
                sales: r.sales,
            })
            .collect())
    }
}
