//! Twilio inbound WhatsApp webhook.
//!
//! Handymen answer an offer by replying to the WhatsApp thread. Twilio posts each
//! reply here as a form; the reply is applied to the sender's pending assignment.

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use twilio::models::InboundMessage;

use super::orchestrator::DispatchOrchestrator;
use crate::common::DispatchError;

/// Build the axum router for webhook endpoints.
pub fn router(orchestrator: DispatchOrchestrator) -> Router {
    Router::new()
        .route("/webhooks/whatsapp/inbound", post(handle_whatsapp_inbound))
        .with_state(orchestrator)
}

/// Always returns 200 so Twilio never retries. Processing failures are logged only.
async fn handle_whatsapp_inbound(
    State(orchestrator): State<DispatchOrchestrator>,
    payload: Result<Form<InboundMessage>, FormRejection>,
) -> StatusCode {
    let Form(message) = match payload {
        Ok(form) => form,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Malformed inbound WhatsApp payload, dropping");
            return StatusCode::OK;
        }
    };

    process_inbound(&orchestrator, &message).await;
    StatusCode::OK
}

async fn process_inbound(orchestrator: &DispatchOrchestrator, message: &InboundMessage) {
    match orchestrator
        .handle_reply(&message.from, &message.body, Some(&message.message_sid))
        .await
    {
        Ok(assignment) => {
            tracing::info!(
                message_sid = %message.message_sid,
                assignment_id = %assignment.id,
                status = %assignment.status,
                "Inbound reply applied"
            );
        }
        Err(e) if e.is_benign() => {
            tracing::info!(
                message_sid = %message.message_sid,
                from = %message.from,
                "Reply for an already resolved assignment, ignoring"
            );
        }
        Err(e @ DispatchError::UnmatchedReply { .. }) | Err(e @ DispatchError::InvalidPhoneFormat(_)) => {
            tracing::warn!(
                message_sid = %message.message_sid,
                from = %message.from,
                error = %e,
                "Dropping unmatched inbound reply"
            );
        }
        Err(e) => {
            tracing::error!(
                message_sid = %message.message_sid,
                from = %message.from,
                error = %e,
                "Failed to process inbound reply"
            );
        }
    }
}
