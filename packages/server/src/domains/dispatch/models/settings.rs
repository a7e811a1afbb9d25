use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::common::DispatchError;

pub const KEY_DISPATCH_TEMPLATE: &str = "dispatchTemplate";
pub const KEY_WHATSAPP_NUMBER: &str = "whatsappNumber";
pub const KEY_INCLUDE_ATTACHMENTS: &str = "includeAttachments";
pub const KEY_RESPONSE_TIMEOUT: &str = "responseTimeout";
pub const KEY_AUTO_ESCALATE: &str = "autoEscalate";
pub const KEY_MAX_RETRIES: &str = "maxRetries";

pub const DEFAULT_RESPONSE_TIMEOUT_MINUTES: i64 = 30;
pub const MIN_RESPONSE_TIMEOUT_MINUTES: i64 = 5;
/// One week.
pub const MAX_RESPONSE_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;
pub const DEFAULT_MAX_RETRIES: i32 = 3;
pub const MAX_RETRIES_RANGE: std::ops::RangeInclusive<i32> = 1..=5;

/// Dispatch configuration read from the key/value `settings` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchSettings {
    pub dispatch_template: Option<String>,
    pub whatsapp_number: Option<String>,
    pub include_attachments: bool,
    pub response_timeout_minutes: i64,
    pub auto_escalate: bool,
    pub max_retries: i32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            dispatch_template: None,
            whatsapp_number: None,
            include_attachments: false,
            response_timeout_minutes: DEFAULT_RESPONSE_TIMEOUT_MINUTES,
            auto_escalate: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl DispatchSettings {
    /// Parse raw entries. Absent keys take defaults; out-of-range numbers are clamped.
    ///
    /// Values may be stored as JSON scalars or as strings ("30", "true").
    pub fn from_entries(entries: &HashMap<String, Value>) -> Result<Self, DispatchError> {
        let mut settings = Self::default();

        settings.dispatch_template = non_empty_string(entries.get(KEY_DISPATCH_TEMPLATE));
        settings.whatsapp_number = non_empty_string(entries.get(KEY_WHATSAPP_NUMBER));

        if let Some(value) = entries.get(KEY_INCLUDE_ATTACHMENTS) {
            settings.include_attachments = parse_bool(KEY_INCLUDE_ATTACHMENTS, value)?;
        }
        if let Some(value) = entries.get(KEY_AUTO_ESCALATE) {
            settings.auto_escalate = parse_bool(KEY_AUTO_ESCALATE, value)?;
        }
        if let Some(value) = entries.get(KEY_RESPONSE_TIMEOUT) {
            settings.response_timeout_minutes = parse_int(KEY_RESPONSE_TIMEOUT, value)?
                .clamp(MIN_RESPONSE_TIMEOUT_MINUTES, MAX_RESPONSE_TIMEOUT_MINUTES);
        }
        if let Some(value) = entries.get(KEY_MAX_RETRIES) {
            let raw = parse_int(KEY_MAX_RETRIES, value)?;
            settings.max_retries = raw.clamp(
                *MAX_RETRIES_RANGE.start() as i64,
                *MAX_RETRIES_RANGE.end() as i64,
            ) as i32;
        }

        Ok(settings)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::minutes(
            self.response_timeout_minutes
                .clamp(MIN_RESPONSE_TIMEOUT_MINUTES, MAX_RESPONSE_TIMEOUT_MINUTES),
        )
    }

    pub fn require_template(&self) -> Result<&str, DispatchError> {
        self.dispatch_template
            .as_deref()
            .ok_or(DispatchError::ConfigurationMissing(KEY_DISPATCH_TEMPLATE))
    }

    pub fn require_whatsapp_number(&self) -> Result<&str, DispatchError> {
        self.whatsapp_number
            .as_deref()
            .ok_or(DispatchError::ConfigurationMissing(KEY_WHATSAPP_NUMBER))
    }

    pub async fn load_entries(pool: &PgPool) -> Result<HashMap<String, Value>> {
        let rows = sqlx::query_as::<_, (String, Value)>("SELECT key, value FROM settings")
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().collect())
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn parse_bool(key: &'static str, value: &Value) -> Result<bool, DispatchError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(key, format!("expected boolean, got {:?}", other))),
        },
        other => Err(invalid(key, format!("expected boolean, got {}", other))),
    }
}

fn parse_int(key: &'static str, value: &Value) -> Result<i64, DispatchError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| invalid(key, format!("expected integer, got {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(key, format!("expected integer, got {:?}", s))),
        other => Err(invalid(key, format!("expected integer, got {}", other))),
    }
}

fn invalid(key: &'static str, reason: String) -> DispatchError {
    DispatchError::InvalidConfiguration { key, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn empty_table_yields_defaults() {
        let settings = DispatchSettings::from_entries(&HashMap::new()).unwrap();
        assert_eq!(settings, DispatchSettings::default());
        assert_eq!(settings.response_timeout(), Duration::minutes(30));
        assert!(matches!(
            settings.require_template(),
            Err(DispatchError::ConfigurationMissing(KEY_DISPATCH_TEMPLATE))
        ));
    }

    #[test]
    fn accepts_string_encoded_scalars() {
        let settings = DispatchSettings::from_entries(&entries(&[
            (KEY_RESPONSE_TIMEOUT, json!("45")),
            (KEY_AUTO_ESCALATE, json!("false")),
            (KEY_MAX_RETRIES, json!(2)),
            (KEY_WHATSAPP_NUMBER, json!("+15550001111")),
        ]))
        .unwrap();
        assert_eq!(settings.response_timeout_minutes, 45);
        assert!(!settings.auto_escalate);
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.require_whatsapp_number().unwrap(), "+15550001111");
    }

    #[test]
    fn clamps_out_of_range_numbers() {
        let settings = DispatchSettings::from_entries(&entries(&[
            (KEY_RESPONSE_TIMEOUT, json!(1)),
            (KEY_MAX_RETRIES, json!(12)),
        ]))
        .unwrap();
        assert_eq!(settings.response_timeout_minutes, MIN_RESPONSE_TIMEOUT_MINUTES);
        assert_eq!(settings.max_retries, 5);

        let settings =
            DispatchSettings::from_entries(&entries(&[(KEY_MAX_RETRIES, json!(0))])).unwrap();
        assert_eq!(settings.max_retries, 1);
    }

    #[test]
    fn huge_timeout_is_capped_at_one_week() {
        let settings = DispatchSettings::from_entries(&entries(&[(
            KEY_RESPONSE_TIMEOUT,
            json!(1_000_000_000_000_000_i64),
        )]))
        .unwrap();
        assert_eq!(settings.response_timeout_minutes, MAX_RESPONSE_TIMEOUT_MINUTES);
        assert_eq!(settings.response_timeout(), Duration::weeks(1));

        let direct = DispatchSettings {
            response_timeout_minutes: i64::MAX,
            ..DispatchSettings::default()
        };
        assert_eq!(direct.response_timeout(), Duration::weeks(1));
    }

    #[test]
    fn blank_template_counts_as_missing() {
        let settings =
            DispatchSettings::from_entries(&entries(&[(KEY_DISPATCH_TEMPLATE, json!("  "))]))
                .unwrap();
        assert!(settings.dispatch_template.is_none());
    }

    #[test]
    fn rejects_unparseable_values() {
        let err = DispatchSettings::from_entries(&entries(&[(KEY_MAX_RETRIES, json!("lots"))]))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_configuration");
    }
}
