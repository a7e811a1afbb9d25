use serde::{Deserialize, Serialize};

/// Subset of the Message resource returned by `POST /Messages.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub sid: String,
    pub status: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Form payload Twilio posts to an inbound-message webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "MessageSid")]
    pub message_sid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_response_tolerates_missing_optional_fields() {
        let json = r#"{"sid":"SM1","status":"queued"}"#;
        let parsed: MessageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.sid, "SM1");
        assert!(parsed.error_code.is_none());
    }

    #[test]
    fn inbound_message_uses_twilio_field_names() {
        let json = r#"{"From":"whatsapp:+15551234567","Body":"1","MessageSid":"SM9"}"#;
        let parsed: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.from, "whatsapp:+15551234567");
        assert_eq!(parsed.body, "1");
        assert!(parsed.to.is_none());
    }
}
