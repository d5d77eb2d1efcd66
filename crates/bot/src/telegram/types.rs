//! Bot API types, limited to what the order flow reads and writes.
//!
//! See: <https://core.telegram.org/bots/api>

use serde::{Deserialize, Serialize};

/// Text formatting mode for `sendMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Telegram HTML subset.
    Html,
    /// `MarkdownV2` syntax.
    MarkdownV2,
    /// No entity parsing.
    Plain,
}

impl ParseMode {
    /// Value of the `parse_mode` request field, `None` for plain text.
    #[must_use]
    pub const fn as_api(self) -> Option<&'static str> {
        match self {
            Self::Html => Some("HTML"),
            Self::MarkdownV2 => Some("MarkdownV2"),
            Self::Plain => None,
        }
    }
}

/// `sendMessage` request body.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,
}

/// `setWebhook` request body.
#[derive(Debug, Clone, Serialize)]
pub struct SetWebhook<'a> {
    pub url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<&'a str>,
    pub allowed_updates: &'a [&'a str],
}

/// Envelope of every Bot API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

/// An incoming update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    /// Data sent by a Web App through `Telegram.WebApp.sendData`.
    #[serde(default)]
    pub web_app_data: Option<WebAppData>,
}

/// A Telegram user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// A chat.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Payload of a Web App `sendData` call.
#[derive(Debug, Clone, Deserialize)]
pub struct WebAppData {
    pub data: String,
    #[serde(default)]
    pub button_text: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_update_with_web_app_data() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 1001, "is_bot": false, "first_name": "Anna"},
                "chat": {"id": 1001, "type": "private"},
                "date": 1716300000,
                "web_app_data": {"data": "{\"action\":\"update_cart\"}", "button_text": "Shop"}
            }
        }"#;

        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 1001);
        assert_eq!(message.from.unwrap().first_name, "Anna");
        assert!(message.web_app_data.unwrap().data.contains("update_cart"));
    }

    #[test]
    fn test_api_error_response() {
        let raw = r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#;
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert!(!response.ok);
        assert_eq!(response.error_code, Some(403));
        assert!(response.result.is_none());
    }

    #[test]
    fn test_api_response_with_typed_result() {
        let raw = r#"{"ok":true,"result":{"message_id":77,"chat":{"id":-100,"type":"group"},"date":1716300000}}"#;
        let response: ApiResponse<Message> = serde_json::from_str(raw).unwrap();
        assert!(response.ok);
        assert_eq!(response.result.unwrap().message_id, 77);

        let missing: ApiResponse<Message> =
            serde_json::from_str(r#"{"ok":false,"description":"Bad Request"}"#).unwrap();
        assert!(missing.result.is_none());
        assert_eq!(missing.description.as_deref(), Some("Bad Request"));
    }

    #[test]
    fn test_send_message_omits_plain_parse_mode() {
        let body = SendMessage {
            chat_id: 1,
            text: "hi",
            parse_mode: ParseMode::Plain.as_api(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("parse_mode").is_none());
        assert_eq!(ParseMode::Html.as_api(), Some("HTML"));
    }
}
