//! Telegram webhook handler.
//!
//! Telegram redelivers any update that does not get a 2xx answer, so once an
//! update is authenticated and decoded the handler always answers 200 and
//! reports problems to the customer in chat instead.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use bakery_orders_core::{ChatId, CustomerId, WebAppAction};
use secrecy::ExposeSecret;
use tracing::{Span, debug, instrument, warn};

use crate::error::AppError;
use crate::state::AppState;
use crate::telegram::messages::{build_malformed_payload_message, build_unknown_action_message};
use crate::telegram::{ParseMode, Update, constant_time_compare};

/// Header carrying the secret registered with `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Receive an update from Telegram.
///
/// # Errors
///
/// Returns 401 when the secret header does not match and 400 when the body is
/// not an update.
#[instrument(skip_all, fields(update_id = tracing::field::Empty))]
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    verify_secret(&state, &headers)?;

    let update: Update = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid update: {e}")))?;
    Span::current().record("update_id", update.update_id);

    let Some(message) = update.message else {
        debug!("Ignoring update without a message");
        return Ok(StatusCode::OK);
    };
    let Some(web_app) = message.web_app_data else {
        debug!("Ignoring message without Web App data");
        return Ok(StatusCode::OK);
    };

    let chat = ChatId::new(message.chat.id);
    let customer = CustomerId::new(message.from.map_or(message.chat.id, |user| user.id));
    handle_web_app_data(&state, customer, chat, &web_app.data).await;

    Ok(StatusCode::OK)
}

fn verify_secret(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.webhook_secret() else {
        return Ok(());
    };

    let provided = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing secret token".to_string()))?;

    if !constant_time_compare(expected.expose_secret(), provided) {
        return Err(AppError::Unauthorized("secret token mismatch".to_string()));
    }
    Ok(())
}

async fn handle_web_app_data(state: &AppState, customer: CustomerId, chat: ChatId, raw: &str) {
    let checkout = state.checkout();

    match WebAppAction::parse(raw) {
        Ok(WebAppAction::UpdateCart(update)) => {
            checkout.update_cart(customer, chat, &update).await;
        }
        Ok(WebAppAction::CheckoutOrder(request)) => {
            checkout.checkout(customer, chat, &request).await;
        }
        Ok(WebAppAction::Unknown(action)) => {
            warn!(customer_id = %customer, action = %action, "Unknown Web App action");
            checkout
                .reply(chat, &build_unknown_action_message(), ParseMode::Plain)
                .await;
        }
        Err(e) => {
            warn!(customer_id = %customer, error = %e, "Malformed Web App payload");
            checkout
                .reply(chat, &build_malformed_payload_message(), ParseMode::Plain)
                .await;
        }
    }
}
