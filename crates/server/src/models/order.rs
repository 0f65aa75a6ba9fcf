//! Order domain types.
//!
//! Line items and the shipping address are snapshots taken when the order is
//! placed and are never edited afterwards. The only mutation an order sees is
//! the one-way move to delivered.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use iutcart_core::{OrderId, OrderPrices, ProductId, UserId};

/// One line of an order, copied from the cart at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Product reference. Carts send it as `_id`.
    #[serde(alias = "_id")]
    pub product: ProductId,
    pub name: String,
    pub slug: String,
    pub image: String,
    pub quantity: u32,
    /// Unit price at checkout.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// The buyer as embedded in the seller listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuyerRef {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub name: String,
}

/// A stored order.
///
/// `B` is the representation of the buyer: a bare [`UserId`] normally, or an
/// optional [`BuyerRef`] when the buyer has been joined in (see
/// [`SellerOrder`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order<B = UserId> {
    #[serde(rename = "_id")]
    pub id: OrderId,
    pub order_items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    #[serde(flatten)]
    pub prices: OrderPrices,
    pub user: B,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order joined with its buyer's name; `None` if the buyer is gone.
pub type SellerOrder = Order<Option<BuyerRef>>;

impl<B> Order<B> {
    /// Swap the buyer representation, keeping every other field.
    pub fn with_buyer<C>(self, user: C) -> Order<C> {
        Order {
            id: self.id,
            order_items: self.order_items,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            prices: self.prices,
            user,
            is_delivered: self.is_delivered,
            delivered_at: self.delivered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A validated order ready to insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user: UserId,
    pub order_items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub prices: OrderPrices,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_item_accepts_cart_id_alias() {
        let json = r#"{"_id":3,"name":"Mug","slug":"mug","image":"/m.jpg","quantity":2,"price":4.5}"#;
        let item: OrderItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.product, ProductId::new(3));
        assert_eq!(item.price, Decimal::new(45, 1));

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["product"], 3);
    }

    #[test]
    fn test_seller_order_serializes_missing_buyer_as_null() {
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(1),
            order_items: vec![],
            shipping_address: ShippingAddress {
                full_name: "A".to_string(),
                address: "1 Main St".to_string(),
                city: "Dhaka".to_string(),
                postal_code: "1000".to_string(),
                country: "BD".to_string(),
            },
            payment_method: "PayPal".to_string(),
            prices: OrderPrices::default(),
            user: UserId::new(9),
            is_delivered: false,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };

        let plain = serde_json::to_value(&order).unwrap();
        assert_eq!(plain["user"], 9);
        assert_eq!(plain["shippingAddress"]["postalCode"], "1000");
        assert!(plain["totalPrice"].is_number());
        assert!(plain["deliveredAt"].is_null());

        let joined: SellerOrder = order.with_buyer(None);
        let value = serde_json::to_value(&joined).unwrap();
        assert!(value["user"].is_null());
        assert_eq!(value["_id"], 1);
    }
}
