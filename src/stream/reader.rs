// Background task that turns a response body into stream events

use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connections::ConnectionGuard;
use super::framing::{Frame, FrameDecoder, LineBuffer};
use super::session::StreamEvent;
use crate::providers::BackendError;

/// Channel capacity between the reader task and the session.
const CHANNEL_CAPACITY: usize = 100;

/// Spawn the reader for one streaming response.
///
/// The task owns the body and the connection guard. It stops on the first
/// terminal event, when `cancel` fires, or when the receiving session is
/// dropped; in every case the body (and so the connection) is released and
/// the guard decrements the tracker.
pub fn spawn_reader<S, B, D>(
    backend: String,
    body: S,
    mut decoder: D,
    guard: ConnectionGuard,
    cancel: CancellationToken,
) -> mpsc::Receiver<StreamEvent>
where
    S: Stream<Item = Result<B, BackendError>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    D: FrameDecoder,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let _guard = guard;
        let mut body = Box::pin(body);
        let mut lines = LineBuffer::new();

        tracing::debug!("[STREAM] {} reader started", backend);

        let terminal = loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("[STREAM] {} reader cancelled", backend);
                    break None;
                }
                chunk = body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    lines.push(bytes.as_ref());
                    match drain_lines(&backend, &mut lines, &mut decoder, &tx, &cancel).await {
                        Drained::More => {}
                        Drained::Terminal(event) => break Some(event),
                        Drained::ReceiverGone => break None,
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("[STREAM] {} transport error: {}", backend, e);
                    break Some(StreamEvent::Error(e));
                }
                None => {
                    // Some servers omit the newline after the last frame
                    if let Some(rest) = lines.finish() {
                        match decode_one(&backend, &rest, &mut decoder, &tx, &cancel).await {
                            Drained::More => {}
                            Drained::Terminal(event) => break Some(event),
                            Drained::ReceiverGone => break None,
                        }
                    }
                    break Some(match decoder.finish() {
                        Ok(()) => StreamEvent::End,
                        Err(message) => {
                            tracing::warn!("[STREAM] {} ended early: {}", backend, message);
                            StreamEvent::Error(BackendError::protocol(&backend, message))
                        }
                    });
                }
            }
        };

        if let Some(event) = terminal {
            forward(&tx, &cancel, event).await;
        }
        tracing::debug!("[STREAM] {} reader finished", backend);
    });

    rx
}

enum Drained {
    More,
    Terminal(StreamEvent),
    ReceiverGone,
}

async fn drain_lines<D: FrameDecoder>(
    backend: &str,
    lines: &mut LineBuffer,
    decoder: &mut D,
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> Drained {
    while let Some(line) = lines.next_line() {
        match decode_one(backend, &line, decoder, tx, cancel).await {
            Drained::More => {}
            other => return other,
        }
    }
    Drained::More
}

async fn decode_one<D: FrameDecoder>(
    backend: &str,
    line: &str,
    decoder: &mut D,
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> Drained {
    match decoder.decode_line(line) {
        Ok(Frame::Text(text)) => {
            if !text.is_empty() && !forward(tx, cancel, StreamEvent::Fragment(text)).await {
                return Drained::ReceiverGone;
            }
            Drained::More
        }
        Ok(Frame::Done(text)) => {
            if !text.is_empty() && !forward(tx, cancel, StreamEvent::Fragment(text)).await {
                return Drained::ReceiverGone;
            }
            Drained::Terminal(StreamEvent::End)
        }
        Ok(Frame::Skip) => Drained::More,
        Err(message) => {
            tracing::warn!("[STREAM] {} sent an undecodable frame: {}", backend, message);
            Drained::Terminal(StreamEvent::Error(BackendError::protocol(backend, message)))
        }
    }
}

/// Send one event unless the session is cancelled first. A full channel
/// must not keep the reader (and its connection) alive past a cancel.
async fn forward(tx: &mpsc::Sender<StreamEvent>, cancel: &CancellationToken, event: StreamEvent) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}
