//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Sign-in, sign-up and password reset
//! - `orders` - Checkout, listings, delivery and the sales summary
//! - `tokens` - Signed session and reset tokens
//! - `email` - Composing emails and the mailers that send them
//! - `notifications` - Bounded queue feeding the mailer

pub mod auth;
pub mod email;
pub mod notifications;
pub mod orders;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod tokens;

pub use auth::{AuthError, AuthService};
pub use email::{LogMailer, Mailer, OutgoingEmail, SmtpMailer};
pub use notifications::{NotificationQueue, NotifyError};
pub use orders::{OrderDraft, OrderError, OrderService};
pub use tokens::{TokenError, TokenService};
