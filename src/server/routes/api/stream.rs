use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;

use crate::server::app_state::SharedAppState;
use crate::services::types::{MiniProgramType, StatusItem};

pub fn routes(app_state: SharedAppState) -> Router<SharedAppState> {
    Router::new()
        .route("/upload-status-stream", get(upload_status_stream))
        .with_state(app_state)
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "type")]
    pub mp_type: MiniProgramType,
}

fn status_event(kind: &str, data: &[StatusItem]) -> Event {
    Event::default().data(json!({ "type": kind, "data": data }).to_string())
}

/// Push channel for status changes: one `init` message with the current set,
/// then a full `update` snapshot on every change. Clients reconnect with a
/// fixed backoff; the stream itself never purges tasks, that stays a polling
/// side effect.
pub async fn upload_status_stream(
    Query(query): Query<StreamQuery>,
    State(state): State<SharedAppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (snapshot, receiver) = state.orchestrator.subscribe(query.mp_type);

    let init =
        stream::once(async move { Ok::<_, Infallible>(status_event("init", &snapshot)) });
    let updates = BroadcastStream::new(receiver).filter_map(|update| async move {
        match update {
            Ok(items) => Some(Ok::<_, Infallible>(status_event("update", &items))),
            // Lagged receiver: skip; the next update carries the full set.
            Err(_) => None,
        }
    });

    Sse::new(init.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
