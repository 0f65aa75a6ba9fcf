//! IUTCart server library.
//!
//! The HTTP API for user authentication and seller order management, exposed
//! as a library so the binary and the integration tests build the same
//! router from [`app`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::app;
