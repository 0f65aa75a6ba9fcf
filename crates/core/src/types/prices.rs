//! Order price fields.
//!
//! Prices travel as JSON numbers (the cart computes them client side)
//! and are held as [`Decimal`] so sums never pick up float noise.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price field that is negative.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} must not be negative")]
pub struct PriceError {
    pub field: &'static str,
}

/// The four price fields snapshotted on an order at creation time.
///
/// `total_price` is stored exactly as the client supplied it; it is never
/// recomputed from the other three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrderPrices {
    #[serde(with = "rust_decimal::serde::float")]
    pub items_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
}

impl OrderPrices {
    /// `items + shipping + tax`, for comparison with the supplied total.
    #[must_use]
    pub fn component_sum(&self) -> Decimal {
        self.items_price + self.shipping_price + self.tax_price
    }

    /// Whether the supplied total equals the sum of its components.
    #[must_use]
    pub fn total_is_consistent(&self) -> bool {
        self.component_sum() == self.total_price
    }

    /// Reject negative amounts.
    ///
    /// # Errors
    ///
    /// Returns the first negative field.
    pub fn validate(&self) -> Result<(), PriceError> {
        let fields = [
            ("itemsPrice", self.items_price),
            ("shippingPrice", self.shipping_price),
            ("taxPrice", self.tax_price),
            ("totalPrice", self.total_price),
        ];
        match fields.iter().find(|(_, amount)| amount.is_sign_negative()) {
            Some((field, _)) => Err(PriceError { field: *field }),
            None => Ok(()),
        }
    }
}
