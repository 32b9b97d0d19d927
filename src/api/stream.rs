use std::convert::Infallible;

use axum::{
    http::{header, HeaderName},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{
    inference::{CompletionStream, DONE_SENTINEL},
    model::LetterDelta,
};

const RELAY_BUFFER: usize = 32;

/// Wraps an open upstream completion in a `text/event-stream` response.
///
/// A spawned task pulls deltas off the upstream and pushes them through a
/// bounded channel; the response body drains the channel. When the caller
/// goes away the receiver is dropped and the task stops, dropping the
/// upstream response with it.
pub fn relay_response(upstream: CompletionStream) -> Response {
    let (tx, rx) = mpsc::channel::<Event>(RELAY_BUFFER);
    tokio::spawn(relay_deltas(upstream, tx));

    let events = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, Infallible>(event), rx))
    });

    (
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
        .into_response()
}

async fn relay_deltas(mut upstream: CompletionStream, tx: mpsc::Sender<Event>) {
    let mut relayed = 0usize;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                info!(relayed, "caller disconnected, releasing upstream stream");
                return;
            }
            next = upstream.next_delta() => next,
        };

        match next {
            Ok(Some(content)) => {
                let event = match Event::default().json_data(LetterDelta { content }) {
                    Ok(event) => event,
                    Err(err) => {
                        error!("failed to encode letter delta: {err}");
                        return;
                    }
                };

                if tx.send(event).await.is_err() {
                    info!(relayed, "caller disconnected, releasing upstream stream");
                    return;
                }
                relayed += 1;
            }
            Ok(None) => {
                let _ = tx.send(Event::default().data(DONE_SENTINEL)).await;
                debug!(relayed, "letter stream complete");
                return;
            }
            // Ending without the sentinel tells the caller the letter is incomplete.
            Err(err) => {
                error!(
                    kind = ?err.kind,
                    relayed,
                    message = err.message.as_str(),
                    "upstream stream failed mid-letter"
                );
                return;
            }
        }
    }
}
