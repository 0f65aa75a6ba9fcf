//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. JSON bodies for layer errors (408, 429)
//! 5. Timeout (bound request handling time)
//! 6. Rate limiting on `/api/users` (governor)
//!
//! Authentication is not a layer: handlers opt in through the
//! [`RequireAuth`] and [`RequireSeller`] extractors.

pub mod auth;
pub mod error_body;
pub mod rate_limit;
pub mod request_id;

pub use auth::{CurrentUser, RequireAuth, RequireSeller};
pub use error_body::json_error_body;
pub use rate_limit::auth_rate_limiter;
pub use request_id::request_id_middleware;
