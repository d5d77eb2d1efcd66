//! Checkout payloads sent by the mini app and the validated order built from
//! them.
//!
//! [`CheckoutRequest`] mirrors the JSON the mini app sends and is deliberately
//! permissive: every field is optional so that a malformed order can be
//! explained to the customer instead of failing to parse. [`CheckoutRequest::validate`]
//! is the schema boundary that turns it into an [`OrderContext`].

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::email::{Email, EmailError};
use super::id::{ChatId, CustomerId};
use super::money::Money;
use super::phone::format_phone;

/// Why a checkout payload was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `order_details` is absent.
    #[error("order details are missing")]
    MissingOrderDetails,
    /// `cart_items` is absent or empty.
    #[error("the cart is empty")]
    EmptyCart,
    /// `total_amount` is absent.
    #[error("order total is missing")]
    MissingTotal,
    /// `total_amount` is zero or negative.
    #[error("order total must be positive, got {0}")]
    NonPositiveTotal(Money),
    /// A required customer or delivery field is absent or blank.
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),
    /// `deliveryMethod` is not one of the supported methods.
    #[error("unknown delivery method `{0}`")]
    UnknownDeliveryMethod(String),
    /// The customer email does not look like an address.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
    /// A cart line is unusable.
    #[error("cart item {index} is invalid: {reason}")]
    InvalidItem {
        /// Zero-based position in `cart_items`.
        index: usize,
        /// What is wrong with it.
        reason: &'static str,
    },
}

// =============================================================================
// Wire payload
// =============================================================================

/// `checkout_order` payload from the mini app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Customer and delivery form.
    #[serde(default)]
    pub order_details: Option<OrderDetails>,
    /// Lines of the cart at checkout time.
    #[serde(default)]
    pub cart_items: Option<Vec<CartItem>>,
    /// Total computed by the mini app.
    #[serde(default)]
    pub total_amount: Option<Money>,
}

/// The checkout form, as typed by the customer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub delivery_method: Option<String>,
    #[serde(default)]
    pub delivery_date: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub address_line: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub comment_pickup: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// One cart line in a checkout payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartItem {
    /// Product id; the mini app sends strings but numbers are accepted.
    #[serde(default, deserialize_with = "deserialize_product_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// Accept a product id given as a JSON string or number.
///
/// # Errors
///
/// Fails for any other JSON type.
pub fn deserialize_product_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "product id must be a string or number, got {other}"
        ))),
    }
}

// =============================================================================
// Validated order
// =============================================================================

/// How the order reaches the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fulfilment {
    /// Delivery by the store's courier.
    Courier {
        city: String,
        address_line: String,
        comment: Option<String>,
    },
    /// Customer collects the order from a shop.
    Pickup {
        address: String,
        comment: Option<String>,
    },
}

impl Fulfilment {
    /// Short label shown in notifications.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Courier { .. } => "Courier delivery",
            Self::Pickup { .. } => "Pickup",
        }
    }

    /// `true` for courier delivery.
    #[must_use]
    pub const fn is_courier(&self) -> bool {
        matches!(self, Self::Courier { .. })
    }
}

/// Payment method chosen at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethod {
    /// Cash on delivery or at the counter.
    Cash,
    /// Card on delivery or at the counter.
    Card,
    /// ERIP bank transfer.
    Erip,
    /// Anything the mini app sends that this version does not know.
    Other(String),
}

impl PaymentMethod {
    /// Interpret the mini app's payment value.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "cash" => Self::Cash,
            "card" => Self::Card,
            "erip" => Self::Erip,
            _ => Self::Other(code.trim().to_string()),
        }
    }

    /// Human description for notifications.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Cash => "Cash on receipt",
            Self::Card => "Card on receipt",
            Self::Erip => "ERIP bank transfer",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// The person who placed the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerDetails {
    /// Telegram user who sent the order.
    pub customer_id: CustomerId,
    /// Chat the order came from; confirmations go back here.
    pub chat_id: ChatId,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    /// Phone as entered.
    pub phone: String,
    pub email: Option<Email>,
}

impl CustomerDetails {
    /// Phone formatted for staff notifications.
    #[must_use]
    pub fn display_phone(&self) -> String {
        format_phone(&self.phone)
    }

    /// `First Last`.
    #[must_use]
    pub fn short_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A validated cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl LineItem {
    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// A validated order, owned by one checkout from validation until the
/// customer has been answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderContext {
    pub customer: CustomerDetails,
    pub fulfilment: Fulfilment,
    /// Requested delivery or pickup date, free text from the date picker.
    pub delivery_date: Option<String>,
    pub payment: Option<PaymentMethod>,
    pub items: Vec<LineItem>,
    /// Total as sent by the mini app.
    pub total: Money,
}

impl OrderContext {
    /// Sum of the validated lines, for cross-checking `total`.
    #[must_use]
    pub fn items_total(&self) -> Money {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Number of units across all lines.
    #[must_use]
    pub fn unit_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}

impl CheckoutRequest {
    /// Validate the payload into an [`OrderContext`].
    ///
    /// Structural checks (details, items, total) run first, so a payload with
    /// a zero total is reported as such even if the form is also incomplete.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(
        &self,
        customer_id: CustomerId,
        chat_id: ChatId,
    ) -> Result<OrderContext, ValidationError> {
        let details = self
            .order_details
            .as_ref()
            .ok_or(ValidationError::MissingOrderDetails)?;
        let raw_items = self
            .cart_items
            .as_deref()
            .filter(|items| !items.is_empty())
            .ok_or(ValidationError::EmptyCart)?;
        let total = self.total_amount.ok_or(ValidationError::MissingTotal)?;
        if !total.is_positive() {
            return Err(ValidationError::NonPositiveTotal(total));
        }

        let customer = CustomerDetails {
            customer_id,
            chat_id,
            first_name: required(details.first_name.as_deref(), "firstName")?,
            last_name: required(details.last_name.as_deref(), "lastName")?,
            middle_name: present(details.middle_name.as_deref()),
            phone: required(details.phone.as_deref(), "phone")?,
            email: present(details.email.as_deref())
                .map(|raw| Email::parse(&raw))
                .transpose()?,
        };

        let method = required(details.delivery_method.as_deref(), "deliveryMethod")?;
        let fulfilment = match method.as_str() {
            "courier" => Fulfilment::Courier {
                city: required(details.city.as_deref(), "city")?,
                address_line: required(details.address_line.as_deref(), "addressLine")?,
                comment: present(details.comment.as_deref()),
            },
            "pickup" => Fulfilment::Pickup {
                address: required(details.pickup_address.as_deref(), "pickupAddress")?,
                comment: present(details.comment_pickup.as_deref()),
            },
            _ => return Err(ValidationError::UnknownDeliveryMethod(method)),
        };

        let items = raw_items
            .iter()
            .enumerate()
            .map(|(index, item)| validate_item(index, item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OrderContext {
            customer,
            fulfilment,
            delivery_date: present(details.delivery_date.as_deref()),
            payment: present(details.payment_method.as_deref())
                .map(|code| PaymentMethod::from_code(&code)),
            items,
            total,
        })
    }
}

fn validate_item(index: usize, item: &CartItem) -> Result<LineItem, ValidationError> {
    let invalid = |reason| ValidationError::InvalidItem { index, reason };

    let id = present(item.id.as_deref()).ok_or_else(|| invalid("missing id"))?;
    let name = present(item.name.as_deref()).ok_or_else(|| invalid("missing name"))?;
    let unit_price = item.price.ok_or_else(|| invalid("missing price"))?;
    if unit_price.is_negative() {
        return Err(invalid("negative price"));
    }
    let quantity = item
        .quantity
        .filter(|q| *q > 0)
        .and_then(|q| u32::try_from(q).ok())
        .ok_or_else(|| invalid("quantity must be a positive integer"))?;

    Ok(LineItem {
        id,
        name,
        unit_price,
        quantity,
    })
}

/// Trimmed value, or `None` for absent and blank input.
fn present(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    present(value).ok_or(ValidationError::MissingField(field))
}
