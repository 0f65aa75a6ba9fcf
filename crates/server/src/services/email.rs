//! Transactional email: composing messages and handing them to a relay.
//!
//! Messages are rendered from Askama templates with an HTML and a plain text
//! part. Delivery goes through the [`Mailer`] trait: [`SmtpMailer`] in
//! production, [`LogMailer`] when no SMTP relay is configured.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::models::{Order, ShippingAddress, User};

use super::tokens::RESET_TOKEN_TTL;

#[derive(Template)]
#[template(path = "email/reset_password.html")]
struct ResetPasswordHtml<'a> {
    name: &'a str,
    link: &'a str,
    ttl_hours: u64,
}

#[derive(Template)]
#[template(path = "email/reset_password.txt")]
struct ResetPasswordText<'a> {
    name: &'a str,
    link: &'a str,
    ttl_hours: u64,
}

/// One rendered order line.
struct EmailLine<'a> {
    name: &'a str,
    quantity: u32,
    price: String,
}

#[derive(Template)]
#[template(path = "email/order_delivered.html")]
struct OrderDeliveredHtml<'a> {
    name: &'a str,
    order_id: String,
    placed_on: String,
    lines: &'a [EmailLine<'a>],
    items_price: String,
    shipping_price: String,
    tax_price: String,
    total_price: String,
    payment_method: &'a str,
    address: &'a ShippingAddress,
}

#[derive(Template)]
#[template(path = "email/order_delivered.txt")]
struct OrderDeliveredText<'a> {
    name: &'a str,
    order_id: String,
    placed_on: String,
    lines: &'a [EmailLine<'a>],
    items_price: String,
    shipping_price: String,
    tax_price: String,
    total_price: String,
    payment_method: &'a str,
    address: &'a ShippingAddress,
}

/// Errors that can occur when composing or sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A fully rendered email, ready for any [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to_name: String,
    pub to_address: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl OutgoingEmail {
    /// The password reset email carrying `link`.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if rendering fails.
    pub fn reset_password(user: &User, link: &str) -> Result<Self, EmailError> {
        let ttl_hours = RESET_TOKEN_TTL.as_secs() / 3600;
        let html = ResetPasswordHtml {
            name: &user.name,
            link,
            ttl_hours,
        }
        .render()?;
        let text = ResetPasswordText {
            name: &user.name,
            link,
            ttl_hours,
        }
        .render()?;

        Ok(Self {
            to_name: user.name.clone(),
            to_address: user.email.to_string(),
            subject: "Reset Password".to_string(),
            text,
            html,
        })
    }

    /// The delivery notice for `order`, addressed to `buyer`.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if rendering fails.
    pub fn order_delivered<B>(buyer: &User, order: &Order<B>) -> Result<Self, EmailError> {
        let lines: Vec<EmailLine<'_>> = order
            .order_items
            .iter()
            .map(|item| EmailLine {
                name: &item.name,
                quantity: item.quantity,
                price: money(item.price),
            })
            .collect();
        let order_id = order.id.to_string();
        let placed_on = order.created_at.format("%Y-%m-%d").to_string();
        let prices = &order.prices;

        let html = OrderDeliveredHtml {
            name: &buyer.name,
            order_id: order_id.clone(),
            placed_on: placed_on.clone(),
            lines: &lines,
            items_price: money(prices.items_price),
            shipping_price: money(prices.shipping_price),
            tax_price: money(prices.tax_price),
            total_price: money(prices.total_price),
            payment_method: &order.payment_method,
            address: &order.shipping_address,
        }
        .render()?;
        let text = OrderDeliveredText {
            name: &buyer.name,
            order_id: order_id.clone(),
            placed_on,
            lines: &lines,
            items_price: money(prices.items_price),
            shipping_price: money(prices.shipping_price),
            tax_price: money(prices.tax_price),
            total_price: money(prices.total_price),
            payment_method: &order.payment_method,
            address: &order.shipping_address,
        }
        .render()?;

        Ok(Self {
            to_name: buyer.name.clone(),
            to_address: buyer.email.to_string(),
            subject: format!("New order {order_id}"),
            text,
            html,
        })
    }
}

fn money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}")
}

/// Delivers composed emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one email.
    ///
    /// # Errors
    ///
    /// Returns an `EmailError` if the message cannot be built or delivered.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

/// Sends email through an SMTP relay.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a new SMTP mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay host is invalid or `from` is not a mailbox.
    pub fn new(config: &EmailConfig, from: &str) -> Result<Self, EmailError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from: parse_sender(from)?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = build_message(&self.from, email)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Logs emails instead of sending them.
///
/// Used when `SMTP_HOST` is unset, so development setups still see reset
/// links.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: Mailbox,
}

impl LogMailer {
    /// # Errors
    ///
    /// Returns `EmailError::InvalidAddress` if `from` is not a mailbox.
    pub fn new(from: &str) -> Result<Self, EmailError> {
        Ok(Self {
            from: parse_sender(from)?,
        })
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        // Build anyway so address problems show up in development too.
        build_message(&self.from, email)?;
        tracing::info!(
            to = %email.to_address,
            subject = %email.subject,
            body = %email.text,
            "SMTP not configured, logging email"
        );
        Ok(())
    }
}

fn parse_sender(from: &str) -> Result<Mailbox, EmailError> {
    from.parse()
        .map_err(|_| EmailError::InvalidAddress(from.to_string()))
}

/// Build a multipart message with both plain text and HTML versions.
fn build_message(from: &Mailbox, email: &OutgoingEmail) -> Result<Message, EmailError> {
    let address = email
        .to_address
        .parse()
        .map_err(|_| EmailError::InvalidAddress(email.to_address.clone()))?;
    let to = Mailbox::new(Some(email.to_name.clone()), address);

    let message = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject.as_str())
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(email.text.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html.clone()),
                ),
        )?;
    Ok(message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use iutcart_core::{Email, OrderId, OrderPrices, ProductId, Roles, UserId};

    use super::*;
    use crate::models::OrderItem;

    fn buyer() -> User {
        let now = Utc::now();
        User {
            id: UserId::new(3),
            name: "Ada <Buyer>".to_string(),
            email: Email::parse("ada@x.com").unwrap(),
            password_hash: String::new(),
            roles: Roles::BUYER,
            reset_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(42),
            order_items: vec![OrderItem {
                product: ProductId::new(1),
                name: "Mug".to_string(),
                slug: "mug".to_string(),
                image: "/mug.jpg".to_string(),
                quantity: 2,
                price: Decimal::new(45, 1),
            }],
            shipping_address: ShippingAddress {
                full_name: "Ada".to_string(),
                address: "1 Main St".to_string(),
                city: "Dhaka".to_string(),
                postal_code: "1000".to_string(),
                country: "BD".to_string(),
            },
            payment_method: "PayPal".to_string(),
            prices: OrderPrices {
                items_price: Decimal::new(9, 0),
                shipping_price: Decimal::ZERO,
                tax_price: Decimal::new(135, 2),
                total_price: Decimal::new(1035, 2),
            },
            user: UserId::new(3),
            is_delivered: true,
            delivered_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_reset_password_contains_link() {
        let link = "http://localhost:3000/reset-password/abc.def";
        let email = OutgoingEmail::reset_password(&buyer(), link).unwrap();
        assert_eq!(email.subject, "Reset Password");
        assert_eq!(email.to_address, "ada@x.com");
        assert!(email.text.contains(link));
        assert!(email.html.contains(link));
        assert!(email.text.contains("3 hours"));
    }

    #[test]
    fn test_order_delivered_renders_lines_and_totals() {
        let email = OutgoingEmail::order_delivered(&buyer(), &order()).unwrap();
        assert_eq!(email.subject, "New order 42");
        assert!(email.text.contains("Mug x 2: $4.50"));
        assert!(email.text.contains("$10.35"));
        // HTML part escapes the buyer's name.
        assert!(email.html.contains("Ada &#60;Buyer&#62;") || email.html.contains("Ada &lt;Buyer&gt;"));
    }

    #[test]
    fn test_build_message_uses_display_names() {
        let from = parse_sender("IUTCart <iutcart@gmail.com>").unwrap();
        let email = OutgoingEmail::reset_password(&buyer(), "http://x/reset-password/t").unwrap();
        let message = build_message(&from, &email).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("iutcart@gmail.com"));
        assert!(raw.contains("Subject: Reset Password"));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let from = parse_sender("IUTCart <iutcart@gmail.com>").unwrap();
        let mut email = OutgoingEmail::reset_password(&buyer(), "http://x").unwrap();
        email.to_address = "not an address".to_string();
        assert!(matches!(
            build_message(&from, &email),
            Err(EmailError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_money_formats_two_places() {
        assert_eq!(money(Decimal::new(5, 0)), "5.00");
        assert_eq!(money(Decimal::new(12345, 3)), "12.35");
    }
}
