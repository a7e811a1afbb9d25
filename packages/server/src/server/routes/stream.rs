//! SSE stream of dispatch events.
//!
//! GET /api/dispatch/events[?issue_id=UUID]
//!
//! Without `issue_id` the client receives every assignment change; with it, only
//! changes for that issue.

use std::convert::Infallible;

use axum::{
    extract::{Extension, Query},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::common::IssueId;
use crate::kernel::stream_hub::{issue_topic, ALL_EVENTS};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    issue_id: Option<IssueId>,
}

pub async fn events_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let topic = match query.issue_id {
        Some(issue_id) => issue_topic(issue_id),
        None => ALL_EVENTS.to_string(),
    };

    let rx = state.orchestrator.deps().stream_hub.subscribe(&topic).await;

    // Stream with connected event and lag handling
    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let events = BroadcastStream::new(rx).filter_map(|result| async {
        match result {
            Ok(event) => Event::default()
                .event(event.name())
                .json_data(&event)
                .ok()
                .map(Ok),
            Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                Event::default()
                    .event("lagged")
                    .json_data(serde_json::json!({"missed": n}))
                    .ok()
                    .map(Ok)
            }
        }
    });

    Sse::new(connected.chain(events)).keep_alive(KeepAlive::default())
}
