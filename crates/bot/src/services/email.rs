//! Email service for order notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and plain text
//! templates.

use askama::Template;
use bakery_orders_core::{Email, Fulfilment, OrderContext, OrderNumber};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::telegram::messages::NOT_PROVIDED;

/// HTML template for order emails.
#[derive(Template)]
#[template(path = "email/order.html")]
struct OrderEmailHtml<'a> {
    heading: &'a str,
    intro: &'a str,
    customer: &'a [Row],
    fulfilment_label: &'a str,
    fulfilment: &'a [Row],
    items: &'a [ItemRow],
    total: &'a str,
}

/// Plain text template for order emails.
#[derive(Template)]
#[template(path = "email/order.txt")]
struct OrderEmailText<'a> {
    heading: &'a str,
    intro: &'a str,
    customer: &'a [Row],
    fulfilment_label: &'a str,
    fulfilment: &'a [Row],
    items: &'a [ItemRow],
    total: &'a str,
}

struct Row {
    label: &'static str,
    value: String,
}

struct ItemRow {
    name: String,
    quantity: u32,
    unit_price: String,
    line_total: String,
}

/// Errors that can occur when sending email.
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

/// Rendered alternatives of one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailBody {
    pub html: String,
    pub text: String,
}

/// Who an order email is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Staff,
    Customer,
}

/// A rendered order email.
#[derive(Debug, Clone)]
pub struct OrderEmail {
    pub subject: String,
    pub body: EmailBody,
}

/// Render the email for a placed order.
///
/// # Errors
///
/// Returns [`EmailError::Template`] if a template fails to render.
pub fn render_order_email(
    order_number: &OrderNumber,
    order: &OrderContext,
    audience: Audience,
) -> Result<OrderEmail, EmailError> {
    let customer = &order.customer;
    let (subject, heading, intro) = match audience {
        Audience::Staff => (
            format!(
                "New order {order_number} from {} - {}",
                customer.short_name(),
                order.total
            ),
            format!("New order {order_number}"),
            "A new order was placed through the Telegram shop.".to_string(),
        ),
        Audience::Customer => (
            format!("Your bakery order {order_number}"),
            format!("Thank you for your order {order_number}"),
            "We will contact you shortly to confirm it. Here is what you ordered.".to_string(),
        ),
    };

    let customer_rows = vec![
        Row {
            label: "Last name",
            value: customer.last_name.clone(),
        },
        Row {
            label: "First name",
            value: customer.first_name.clone(),
        },
        Row {
            label: "Middle name",
            value: or_dash(customer.middle_name.as_deref()),
        },
        Row {
            label: "Phone",
            value: customer.display_phone(),
        },
        Row {
            label: "Email",
            value: or_dash(customer.email.as_ref().map(Email::as_str)),
        },
        Row {
            label: "Delivery/pickup date",
            value: or_dash(order.delivery_date.as_deref()),
        },
    ];

    let mut fulfilment_rows = match &order.fulfilment {
        Fulfilment::Courier {
            city,
            address_line,
            comment,
        } => vec![
            Row {
                label: "City",
                value: city.clone(),
            },
            Row {
                label: "Address",
                value: address_line.clone(),
            },
            Row {
                label: "Delivery comment",
                value: or_dash(comment.as_deref()),
            },
        ],
        Fulfilment::Pickup { address, comment } => vec![
            Row {
                label: "Pickup address",
                value: address.clone(),
            },
            Row {
                label: "Pickup comment",
                value: or_dash(comment.as_deref()),
            },
        ],
    };
    fulfilment_rows.push(Row {
        label: "Payment",
        value: or_dash(order.payment.as_ref().map(|p| p.description())),
    });

    let items: Vec<ItemRow> = order
        .items
        .iter()
        .map(|item| ItemRow {
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price.to_string(),
            line_total: item.line_total().to_string(),
        })
        .collect();
    let total = order.total.to_string();
    let fulfilment_label = order.fulfilment.label();

    let html = OrderEmailHtml {
        heading: &heading,
        intro: &intro,
        customer: &customer_rows,
        fulfilment_label,
        fulfilment: &fulfilment_rows,
        items: &items,
        total: &total,
    }
    .render()?;
    let text = OrderEmailText {
        heading: &heading,
        intro: &intro,
        customer: &customer_rows,
        fulfilment_label,
        fulfilment: &fulfilment_rows,
        items: &items,
        total: &total,
    }
    .render()?;

    Ok(OrderEmail {
        subject,
        body: EmailBody { html, text },
    })
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or(NOT_PROVIDED).to_string()
}

/// Email service for sending order emails over SMTP.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: Email,
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// No connection is made until the first message is sent.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured for the host.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.from_address.as_str().to_string(),
            config.smtp_password.expose_secret().to_string(),
        );

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        };
        let mailer = builder
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a multipart email with both plain text and HTML versions.
    ///
    /// # Errors
    ///
    /// Returns error if an address is rejected, the message cannot be built
    /// or the SMTP exchange fails.
    pub async fn send_multipart_email(
        &self,
        to: &Email,
        subject: &str,
        body: &EmailBody,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(mailbox(&self.from_address)?)
            .to(mailbox(to)?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(body.html.clone()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

fn mailbox(address: &Email) -> Result<Mailbox, EmailError> {
    address
        .as_str()
        .parse()
        .map_err(|_| EmailError::InvalidAddress(address.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bakery_orders_core::{
        ChatId, CustomerDetails, CustomerId, LineItem, Money, PaymentMethod,
    };
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;

    fn order() -> OrderContext {
        OrderContext {
            customer: CustomerDetails {
                customer_id: CustomerId::new(7),
                chat_id: ChatId::new(7),
                first_name: "Ivan".to_string(),
                last_name: "Sidorov".to_string(),
                middle_name: None,
                phone: "+375 (44) 555-12-34".to_string(),
                email: None,
            },
            fulfilment: Fulfilment::Courier {
                city: "Minsk".to_string(),
                address_line: "Nezavisimosti 10 <apt 5>".to_string(),
                comment: None,
            },
            delivery_date: None,
            payment: Some(PaymentMethod::Erip),
            items: vec![
                LineItem {
                    id: "c1".to_string(),
                    name: "Napoleon cake".to_string(),
                    unit_price: Money::new(Decimal::new(4550, 2)),
                    quantity: 1,
                },
                LineItem {
                    id: "b2".to_string(),
                    name: "Rye loaf".to_string(),
                    unit_price: Money::new(Decimal::new(325, 2)),
                    quantity: 4,
                },
            ],
            total: Money::new(Decimal::new(5850, 2)),
        }
    }

    fn number() -> OrderNumber {
        OrderNumber::sequenced(NaiveDate::from_ymd_opt(2024, 5, 21).unwrap(), 12).unwrap()
    }

    #[test]
    fn test_staff_email_subject_and_body() {
        let email = render_order_email(&number(), &order(), Audience::Staff).unwrap();

        assert_eq!(
            email.subject,
            "New order #210524/012 from Ivan Sidorov - 58.50 BYN"
        );
        assert!(email.body.html.contains("<td>Napoleon cake</td>"));
        assert!(email.body.html.contains("13.00 BYN"));
        assert!(email.body.html.contains("&#60;apt 5&#62;"));
        assert!(!email.body.html.contains("<apt 5>"));
        assert!(email.body.html.contains("ERIP bank transfer"));
        assert!(email.body.text.contains("- Rye loaf x 4 (3.25 BYN each) = 13.00 BYN"));
        assert!(email.body.text.contains("- Phone: +37544555-12-34"));
        assert!(email.body.text.contains("- Email: —"));
        assert!(email.body.text.contains("Total: 58.50 BYN"));
    }

    #[test]
    fn test_customer_email_subject() {
        let email = render_order_email(&number(), &order(), Audience::Customer).unwrap();
        assert_eq!(email.subject, "Your bakery order #210524/012");
        assert!(email.body.text.starts_with("Thank you for your order #210524/012"));
    }

    #[tokio::test]
    async fn test_service_builds_from_config() {
        let config = EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 465,
            starttls: false,
            from_address: Email::parse("orders@example.com").unwrap(),
            smtp_password: secrecy::SecretString::from("app-password"),
        };
        let service = EmailService::new(&config).unwrap();
        assert!(format!("{service:?}").contains("orders@example.com"));
    }
}
