//! Telegram message builders for the order flow.
//!
//! Provides factory functions for the HTML texts sent to:
//! - Staff, when a new order arrives
//! - Customers, confirming their order and answering Web App actions
//!
//! Every value that came from the customer is HTML-escaped.

use std::fmt::Write as _;

use bakery_orders_core::{Email, Fulfilment, OrderContext, OrderNumber, ValidationError};

/// Shown for optional fields the customer left empty.
pub const NOT_PROVIDED: &str = "—";

/// Escape text for Telegram's HTML parse mode.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn or_dash(value: Option<&str>) -> String {
    value.map_or_else(|| NOT_PROVIDED.to_string(), escape_html)
}

/// Build the staff alert for a new order.
///
/// The message includes:
/// - Order number and customer contact details
/// - Delivery or pickup details
/// - Itemized cart and total
#[must_use]
pub fn build_staff_alert(order_number: &OrderNumber, order: &OrderContext) -> String {
    let customer = &order.customer;
    let mut text = format!("🧾 <b>New order {order_number}</b>\n\n");

    text.push_str("<b>Customer</b>\n");
    let _ = writeln!(text, "Last name: {}", escape_html(&customer.last_name));
    let _ = writeln!(text, "First name: {}", escape_html(&customer.first_name));
    let _ = writeln!(
        text,
        "Middle name: {}",
        or_dash(customer.middle_name.as_deref())
    );
    let _ = writeln!(
        text,
        "Phone: <code>{}</code>",
        escape_html(&customer.display_phone())
    );
    let _ = writeln!(
        text,
        "Email: {}",
        or_dash(customer.email.as_ref().map(Email::as_str))
    );
    let _ = writeln!(
        text,
        "Delivery/pickup date: {}",
        or_dash(order.delivery_date.as_deref())
    );

    text.push_str("\n<b>Fulfilment</b>\n");
    push_fulfilment(&mut text, &order.fulfilment);
    let _ = writeln!(
        text,
        "Payment: {}",
        or_dash(order.payment.as_ref().map(|p| p.description()))
    );

    text.push_str("\n<b>Items</b>\n");
    for item in &order.items {
        let _ = writeln!(
            text,
            "• {} × {} ({} each) = {}",
            escape_html(&item.name),
            item.quantity,
            item.unit_price,
            item.line_total()
        );
    }

    let _ = write!(text, "\n<b>Total: {}</b>", order.total);
    text
}

fn push_fulfilment(text: &mut String, fulfilment: &Fulfilment) {
    let _ = writeln!(text, "Method: {}", fulfilment.label());
    match fulfilment {
        Fulfilment::Courier {
            city,
            address_line,
            comment,
        } => {
            let _ = writeln!(text, "City: {}", escape_html(city));
            let _ = writeln!(text, "Address: {}", escape_html(address_line));
            if let Some(comment) = comment {
                let _ = writeln!(text, "Delivery comment: {}", escape_html(comment));
            }
        }
        Fulfilment::Pickup { address, comment } => {
            let _ = writeln!(text, "Pickup address: {}", escape_html(address));
            if let Some(comment) = comment {
                let _ = writeln!(text, "Pickup comment: {}", escape_html(comment));
            }
        }
    }
}

/// Build the order summary sent to the customer's chat.
#[must_use]
pub fn build_customer_confirmation(order_number: &OrderNumber, order: &OrderContext) -> String {
    let mut text = format!(
        "🥐 <b>Your order {order_number}</b>\n\n{}\n",
        order.fulfilment.label()
    );

    match &order.fulfilment {
        Fulfilment::Courier {
            city, address_line, ..
        } => {
            let _ = writeln!(
                text,
                "{}, {}",
                escape_html(city),
                escape_html(address_line)
            );
        }
        Fulfilment::Pickup { address, .. } => {
            let _ = writeln!(text, "{}", escape_html(address));
        }
    }
    if let Some(date) = &order.delivery_date {
        let _ = writeln!(text, "Date: {}", escape_html(date));
    }

    text.push('\n');
    for item in &order.items {
        let _ = writeln!(
            text,
            "• {} × {} = {}",
            escape_html(&item.name),
            item.quantity,
            item.line_total()
        );
    }
    let _ = write!(text, "\n<b>Total: {}</b>", order.total);
    text
}

/// Build the acknowledgment that closes a successful checkout.
#[must_use]
pub fn build_order_acknowledgment(order_number: &OrderNumber) -> String {
    format!(
        "Thank you for your order! We will contact you shortly to confirm it.\n\
         <b>Your order number:</b> <code>{order_number}</code>"
    )
}

/// Plain-text acknowledgment used when the HTML one could not be delivered.
#[must_use]
pub fn build_plain_acknowledgment(order_number: &OrderNumber) -> String {
    format!("Thank you for your order! Your order number: {order_number}")
}

/// Build the reply for a checkout that failed validation.
#[must_use]
pub fn build_rejection_message(reason: &ValidationError) -> String {
    let hint = match reason {
        ValidationError::MissingOrderDetails
        | ValidationError::MissingTotal
        | ValidationError::NonPositiveTotal(_)
        | ValidationError::InvalidItem { .. } => "Please try placing the order again.",
        ValidationError::EmptyCart => "Your cart is empty. Add something first.",
        ValidationError::MissingField(_) | ValidationError::UnknownDeliveryMethod(_) => {
            "Please fill in all required fields of the checkout form."
        }
        ValidationError::InvalidEmail(_) => "Please check the email address.",
    };
    format!("We could not place your order: {reason}.\n{hint}")
}

/// Build the reply sent after an internal fault once the order was placed.
#[must_use]
pub fn build_critical_message(order_number: &OrderNumber) -> String {
    format!(
        "Your order {order_number} was received, but something went wrong while \
         processing it. Please contact us to confirm the order."
    )
}

/// Build the reply to an `update_cart` action.
#[must_use]
pub fn build_cart_updated_message(item_count: u64) -> String {
    format!("Cart updated. Items in cart: {item_count}.")
}

/// Build the reply to an unrecognised Web App action.
#[must_use]
pub fn build_unknown_action_message() -> String {
    "Unknown action from the Web App.".to_string()
}

/// Build the reply to a Web App payload that could not be decoded.
#[must_use]
pub fn build_malformed_payload_message() -> String {
    "Could not process the data from the Web App. Please try again.".to_string()
}
