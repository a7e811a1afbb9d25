use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::kernel::scheduled_tasks::DEFAULT_SWEEP_CRON;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    /// Seconds-resolution cron expression for the escalation sweep.
    pub escalation_sweep_cron: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID")
                .context("TWILIO_ACCOUNT_SID must be set")?,
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN")
                .context("TWILIO_AUTH_TOKEN must be set")?,
            escalation_sweep_cron: env::var("ESCALATION_SWEEP_CRON")
                .unwrap_or_else(|_| DEFAULT_SWEEP_CRON.to_string()),
        })
    }
}
