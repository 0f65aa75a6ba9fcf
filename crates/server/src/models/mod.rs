//! Domain models for users, orders and the sales summary.
//!
//! These are the shapes the stores return and the routes serialize. Row
//! types stay private to `crate::db`.

pub mod order;
pub mod summary;
pub mod user;

pub use order::{BuyerRef, NewOrder, Order, OrderItem, SellerOrder, ShippingAddress};
pub use summary::{CategoryCount, DailyOrders, OrderTotals, SalesSummary, UserCount};
pub use user::{AuthenticatedProfile, NewUser, PublicProfile, User};
