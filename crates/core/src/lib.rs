//! IUTCart Core - Shared types library.
//!
//! Types shared by the server and its tests:
//! - typed entity ids ([`UserId`], [`OrderId`], [`ProductId`])
//! - a validated [`Email`]
//! - the four price fields of an order ([`OrderPrices`])
//! - role flags carried by users and session tokens ([`Roles`])
//!
//! The crate does no I/O. With the `postgres` feature the ids and `Email`
//! also implement the `sqlx` encode/decode traits.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
