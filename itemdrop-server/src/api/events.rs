//! SSE event stream for the streamer's game.
//!
//! `GET /events?token=<session JWT>`
//!
//! EventSource can't send custom headers, so the session token travels in
//! the query. Each streamer has at most one live stream; a new connection
//! takes over the channel and the older one stops receiving.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures_util::{Stream, StreamExt};
use itemdrop_core::fanout::FanoutRegistry;
use itemdrop_sdk::objects::ConnectedMessage;
use tokio_stream::wrappers::ReceiverStream;

use super::extractors::StreamerSession;
use crate::state::AppState;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(stream_events))
}

/// Releases the channel registration when the stream is dropped.
struct ConnectionGuard {
    fanout: Arc<FanoutRegistry>,
    channel_id: String,
    consumer_id: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.fanout.release(&self.channel_id, self.consumer_id);
    }
}

/// Register a consumer for `channel_id` and turn it into SSE events.
///
/// The first event is the connected greeting.
fn open_stream(
    fanout: Arc<FanoutRegistry>,
    channel_id: &str,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static + use<> {
    let consumer = fanout.connect(channel_id);
    if let Err(e) = fanout.broadcast(channel_id, &ConnectedMessage::default()) {
        tracing::warn!(%channel_id, error = %e, "Failed to greet consumer");
    }

    let guard = ConnectionGuard {
        fanout,
        channel_id: consumer.channel_id,
        consumer_id: consumer.consumer_id,
    };

    ReceiverStream::new(consumer.rx).map(move |payload| {
        let _connection = &guard;
        Ok(Event::default().data(payload))
    })
}

async fn stream_events(
    State(state): State<AppState>,
    StreamerSession(streamer): StreamerSession,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(
        streamer_id = %streamer.twitch_profile_id,
        channel_id = %streamer.channel_id,
        "Client connected to event stream"
    );

    let events = open_stream(state.fanout.clone(), &streamer.channel_id);
    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_registers_and_releases() {
        let fanout = Arc::new(FanoutRegistry::new());
        let stream = open_stream(fanout.clone(), "chan");
        assert!(fanout.has_consumer("chan"));

        drop(stream);
        assert!(!fanout.has_consumer("chan"));
    }

    #[tokio::test]
    async fn test_greeting_is_first_event() {
        let fanout = Arc::new(FanoutRegistry::new());
        let mut stream = Box::pin(open_stream(fanout.clone(), "chan"));
        assert!(stream.next().await.is_some());

        fanout
            .broadcast("chan", &serde_json::json!({"itemId": 5}))
            .unwrap();
        assert!(stream.next().await.is_some());
    }

    #[tokio::test]
    async fn test_old_stream_does_not_evict_new_one() {
        let fanout = Arc::new(FanoutRegistry::new());
        let old = open_stream(fanout.clone(), "chan");
        let _new = open_stream(fanout.clone(), "chan");

        drop(old);
        assert!(fanout.has_consumer("chan"));
        assert_eq!(fanout.consumer_count(), 1);
    }
}
