//! Sales summary shown on the seller dashboard.
//!
//! The single-row aggregates are arrays holding zero or one element; the
//! dashboard reads `users[0].numUsers` and treats an empty array as "no data".

use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCount {
    pub num_users: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub num_orders: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_sales: Decimal,
}

/// Orders placed on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyOrders {
    /// `YYYY-MM-DD`
    #[serde(rename = "_id")]
    pub day: String,
    pub orders: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub sales: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    #[serde(rename = "_id")]
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub users: Vec<UserCount>,
    pub orders: Vec<OrderTotals>,
    /// Ascending by day, one entry per day.
    pub daily_orders: Vec<DailyOrders>,
    pub product_categories: Vec<CategoryCount>,
}

impl SalesSummary {
    /// Assemble the summary from raw counts, dropping empty single-row
    /// aggregates.
    #[must_use]
    pub fn new(
        num_users: i64,
        totals: OrderTotals,
        daily_orders: Vec<DailyOrders>,
        product_categories: Vec<CategoryCount>,
    ) -> Self {
        let users = if num_users > 0 {
            vec![UserCount { num_users }]
        } else {
            Vec::new()
        };
        let orders = if totals.num_orders > 0 {
            vec![totals]
        } else {
            Vec::new()
        };
        Self {
            users,
            orders,
            daily_orders,
            product_categories,
        }
    }
}
