//! Core types for IUTCart.

pub mod email;
pub mod id;
pub mod prices;
pub mod roles;

pub use email::{Email, EmailError};
pub use id::*;
pub use prices::{OrderPrices, PriceError};
pub use roles::Roles;
