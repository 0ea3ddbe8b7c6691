//! Server-Sent Events framing for negotiation streams.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use negotiator::negotiation::EventStream;
use tracing::{debug, warn};

/// Wrap a negotiation in an SSE response.
///
/// Each event becomes one `data: <json>` frame. The response ends when the
/// negotiation stream ends; dropping the response (client disconnect) drops
/// the negotiation with it.
pub fn negotiation_sse(events: EventStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let mut events = events;
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok(Event::default().data(json)),
                Err(err) => {
                    warn!(error = %err, "failed to encode negotiation event, closing stream");
                    break;
                }
            }
        }
        debug!("negotiation stream closed");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
