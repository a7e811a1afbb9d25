// Thin client for the Twilio Programmable Messaging API (SMS + WhatsApp).

use std::collections::HashMap;

pub mod models;
use reqwest::{header, Client};

use crate::models::MessageResponse;

pub const DEFAULT_API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Clone)]
pub struct TwilioOptions {
    pub account_sid: String,
    pub auth_token: String,
    /// Overridable for tests that point the client at a local stub.
    pub api_base: String,
}

impl TwilioOptions {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TwilioService {
    options: TwilioOptions,
    client: Client,
}

impl TwilioService {
    pub fn new(options: TwilioOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    /// Send a message. `from`/`to` may carry a channel prefix such as `whatsapp:+1555...`.
    pub async fn send_message(
        &self,
        from: &str,
        to: &str,
        body: &str,
    ) -> Result<MessageResponse, String> {
        let url = format!(
            "{base}/Accounts/{sid}/Messages.json",
            base = self.options.api_base.trim_end_matches('/'),
            sid = self.options.account_sid
        );

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let mut form_body: HashMap<&str, &str> = HashMap::new();
        form_body.insert("From", from);
        form_body.insert("To", to);
        form_body.insert("Body", body);

        let res = self
            .client
            .post(url)
            .basic_auth(&self.options.account_sid, Some(&self.options.auth_token))
            .headers(headers)
            .form(&form_body)
            .send()
            .await;

        match res {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    let error_body = response.text().await.unwrap_or_default();
                    return Err(format!("Twilio returned {}: {}", status, error_body));
                }

                let data = response
                    .json::<MessageResponse>()
                    .await
                    .map_err(|e| format!("Failed to parse Twilio response: {}", e))?;

                if let Some(code) = data.error_code {
                    return Err(format!(
                        "Twilio rejected message {} ({}): {}",
                        data.sid,
                        code,
                        data.error_message.clone().unwrap_or_default()
                    ));
                }

                Ok(data)
            }
            Err(e) => Err(format!("Request to Twilio failed: {}", e)),
        }
    }
}

/// Render an E.164 number as a WhatsApp address.
pub fn whatsapp_address(e164: &str) -> String {
    if e164.starts_with("whatsapp:") {
        e164.to_string()
    } else {
        format!("whatsapp:{}", e164)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whatsapp_address_adds_prefix_once() {
        assert_eq!(whatsapp_address("+15551234567"), "whatsapp:+15551234567");
        assert_eq!(
            whatsapp_address("whatsapp:+15551234567"),
            "whatsapp:+15551234567"
        );
    }

    #[test]
    fn options_default_to_public_api() {
        let options = TwilioOptions::new("AC123", "secret");
        assert_eq!(options.api_base, DEFAULT_API_BASE);
    }
}
