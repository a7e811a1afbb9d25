//! Server dependencies (using traits for testability)
//!
//! Central container handed to the orchestrator and the HTTP layer. External
//! services sit behind trait objects so tests can swap in the in-memory store
//! and the mock gateway.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use twilio::{whatsapp_address, TwilioService};

use crate::domains::dispatch::events::DispatchEvent;
use crate::kernel::{stream_hub::StreamHub, BaseDispatchStore, BaseMessageGateway, SendReceipt};

// =============================================================================
// TwilioService Adapter (implements BaseMessageGateway trait)
// =============================================================================

/// Wrapper around TwilioService that sends over the WhatsApp channel.
pub struct TwilioAdapter(pub Arc<TwilioService>);

impl TwilioAdapter {
    pub fn new(service: Arc<TwilioService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseMessageGateway for TwilioAdapter {
    async fn send_message(&self, from: &str, to: &str, body: &str) -> Result<SendReceipt> {
        let response = self
            .0
            .send_message(&whatsapp_address(from), &whatsapp_address(to), body)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        Ok(SendReceipt {
            message_id: response.sid,
        })
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseDispatchStore>,
    pub gateway: Arc<dyn BaseMessageGateway>,
    /// In-process pub/sub hub for assignment changes
    pub stream_hub: StreamHub<DispatchEvent>,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn BaseDispatchStore>,
        gateway: Arc<dyn BaseMessageGateway>,
        stream_hub: StreamHub<DispatchEvent>,
    ) -> Self {
        Self {
            store,
            gateway,
            stream_hub,
        }
    }
}
