// Streaming sessions: cancellation, idle timeout and connection release

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tern::providers::{
    AdapterOptions, BackendDescriptor, BackendError, BackendKind, GenerationRequest, LlmProvider,
    OllamaProvider,
};
use tern::stream::{spawn_reader, ConnectionTracker, Frame, FrameDecoder, StreamEvent, StreamingSession};
use tokio_util::sync::CancellationToken;

/// One fragment per line, "." ends the stream.
struct LineDecoder;

impl FrameDecoder for LineDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Frame, String> {
        match line.trim() {
            "." => Ok(Frame::Done(String::new())),
            text => Ok(Frame::Text(text.to_string())),
        }
    }
}

fn chunk(text: &str) -> Result<Vec<u8>, BackendError> {
    Ok(text.as_bytes().to_vec())
}

/// Session over a body that sends `chunks` and then stalls forever.
fn stalled_session(
    tracker: &ConnectionTracker,
    chunks: Vec<&str>,
    idle: Duration,
) -> StreamingSession {
    let body = stream::iter(chunks.into_iter().map(chunk).collect::<Vec<_>>()).chain(stream::pending());
    let cancel = CancellationToken::new();
    let rx = spawn_reader(
        "test@local".to_string(),
        body,
        LineDecoder,
        tracker.acquire(),
        cancel.clone(),
    );
    StreamingSession::new("test@local", rx, cancel, idle)
}

async fn wait_for_release(tracker: &ConnectionTracker) {
    for _ in 0..200 {
        if tracker.active() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("connection still held: {}", tracker.active());
}

#[tokio::test]
async fn test_cancel_mid_stream_releases_connection() {
    let tracker = ConnectionTracker::new();
    let mut session = stalled_session(&tracker, vec!["git ", "status\n"], Duration::from_secs(30));
    assert_eq!(tracker.active(), 1);

    assert_eq!(
        session.next_fragment().await,
        Some(StreamEvent::Fragment("git status".into()))
    );
    session.cancel();

    assert_eq!(
        session.next_fragment().await,
        Some(StreamEvent::Error(BackendError::Cancelled))
    );
    assert_eq!(session.next_fragment().await, None);
    assert!(session.is_finished());
    wait_for_release(&tracker).await;
}

#[tokio::test]
async fn test_cancel_with_unread_backlog_releases_connection() {
    let tracker = ConnectionTracker::new();
    let backlog: String = (0..500).map(|i| format!("echo {}\n", i)).collect();
    let session = stalled_session(&tracker, vec![backlog.as_str()], Duration::from_secs(30));

    // Nothing is read, so the reader blocks once the channel is full
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tracker.active(), 1);

    session.cancel();
    wait_for_release(&tracker).await;
    assert!(!session.is_finished());
}

#[tokio::test]
async fn test_external_token_cancels_session() {
    let tracker = ConnectionTracker::new();
    let mut session = stalled_session(&tracker, vec![], Duration::from_secs(30));
    let token = session.cancellation_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    assert_eq!(
        session.next_fragment().await,
        Some(StreamEvent::Error(BackendError::Cancelled))
    );
    assert_eq!(session.fragments_delivered(), 0);
    wait_for_release(&tracker).await;
}

#[tokio::test]
async fn test_dropping_session_releases_connection() {
    let tracker = ConnectionTracker::new();
    let mut session = stalled_session(&tracker, vec!["ls\n"], Duration::from_secs(30));
    assert!(matches!(session.next_fragment().await, Some(StreamEvent::Fragment(_))));

    drop(session);
    wait_for_release(&tracker).await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_ends_session() {
    let tracker = ConnectionTracker::new();
    let idle = Duration::from_secs(30);
    let mut session = stalled_session(&tracker, vec!["df\n"], idle);

    assert_eq!(
        session.next_fragment().await,
        Some(StreamEvent::Fragment("df".into()))
    );
    match session.next_fragment().await {
        Some(StreamEvent::Error(BackendError::Timeout { backend, after })) => {
            assert_eq!(backend, "test@local");
            assert_eq!(after, idle);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(session.next_fragment().await, None);
    wait_for_release(&tracker).await;
}

#[tokio::test]
async fn test_fragments_arrive_in_order_then_end() {
    let tracker = ConnectionTracker::new();
    let body = stream::iter(vec![chunk("fi"), chunk("nd .\n-name\n"), chunk(".\n")]);
    let cancel = CancellationToken::new();
    let rx = spawn_reader("test@local".to_string(), body, LineDecoder, tracker.acquire(), cancel.clone());
    let session = StreamingSession::new("test@local", rx, cancel, Duration::from_secs(5));

    let events: Vec<StreamEvent> = session.into_events().collect().await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Fragment("find .".into()),
            StreamEvent::Fragment("-name".into()),
            StreamEvent::End,
        ]
    );
    wait_for_release(&tracker).await;
}

#[tokio::test]
async fn test_adapter_connection_count_returns_to_baseline() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_header("content-type", "application/x-ndjson")
        .with_body(
            "{\"response\":\"echo \",\"done\":false}\n\
             {\"response\":\"hi\",\"done\":false}\n\
             {\"response\":\"\",\"done\":true}\n",
        )
        .create_async()
        .await;

    let provider = OllamaProvider::new(
        BackendDescriptor::new(BackendKind::Ollama, server.url(), 0),
        AdapterOptions::default(),
    )
    .unwrap();
    assert_eq!(provider.active_connections(), 0);

    let result = provider
        .generate(&GenerationRequest::new("say hi").with_stream(true))
        .await
        .unwrap();
    assert_eq!(result.into_text().await.unwrap(), "echo hi");

    for _ in 0..200 {
        if provider.active_connections() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("adapter still holds {} connection(s)", provider.active_connections());
}
