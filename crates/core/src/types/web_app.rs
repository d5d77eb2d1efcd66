//! Messages the mini app sends back to the bot through `Telegram.WebApp.sendData`.

use serde::{Deserialize, Serialize};

use super::order::{CheckoutRequest, deserialize_product_id};

/// Errors from decoding a Web App payload.
#[derive(thiserror::Error, Debug)]
pub enum WebAppError {
    /// The payload is not valid JSON or does not match the action's shape.
    #[error("malformed web app payload: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The payload has no `action` field.
    #[error("web app payload has no action")]
    MissingAction,
}

/// A decoded Web App message.
#[derive(Debug, Clone)]
pub enum WebAppAction {
    /// Replace the customer's cart.
    UpdateCart(CartUpdate),
    /// Place an order.
    CheckoutOrder(CheckoutRequest),
    /// Any other action name.
    Unknown(String),
}

impl WebAppAction {
    /// Decode the raw string from `web_app_data.data`.
    ///
    /// # Errors
    ///
    /// Returns [`WebAppError::Malformed`] for invalid JSON or a body that does
    /// not fit its action, and [`WebAppError::MissingAction`] when there is no
    /// string `action` field.
    pub fn parse(raw: &str) -> Result<Self, WebAppError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let action = value
            .get("action")
            .and_then(serde_json::Value::as_str)
            .ok_or(WebAppError::MissingAction)?
            .to_string();

        match action.as_str() {
            "update_cart" => Ok(Self::UpdateCart(serde_json::from_value(value)?)),
            "checkout_order" => Ok(Self::CheckoutOrder(serde_json::from_value(value)?)),
            _ => Ok(Self::Unknown(action)),
        }
    }

    /// Action name, for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::UpdateCart(_) => "update_cart",
            Self::CheckoutOrder(_) => "checkout_order",
            Self::Unknown(name) => name,
        }
    }
}

/// `update_cart` payload: the full cart as the mini app sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartUpdate {
    #[serde(default)]
    pub cart: Vec<CartUpdateItem>,
}

/// One entry of an `update_cart` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartUpdateItem {
    #[serde(default, deserialize_with = "deserialize_product_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
}
