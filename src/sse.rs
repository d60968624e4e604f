//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! The endpoint sends one `data: {json}` event per chunk and finishes with
//! `data: [DONE]`.  This module turns the raw byte stream into a stream of
//! [`StreamEvent`]s, buffering across network chunk boundaries.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of the reply.
    Chunk(ChatCompletionChunk),
    /// The `[DONE]` terminator.
    Done,
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Bytes are buffered until a whole event has arrived, so a multi-byte
/// character or a `\r\n` pair split across network chunks decodes intact.
/// Events without a `data:` field (keep-alive comments, blank events) are
/// skipped.  An `{"error": ...}` payload in the middle of the stream becomes
/// an error item.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer = BytesMut::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, mut finished)| async move {
            loop {
                if let Some(event) = extract_event(&mut buffer) {
                    match event {
                        Some(event) => return Some((event, (stream, buffer, finished))),
                        None => continue,
                    }
                }

                if finished {
                    return None;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, finished)));
                    }
                    None => {
                        // Flush a final event that arrived without its blank line.
                        finished = true;
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        buffer.extend_from_slice(b"\n\n");
                    }
                }
            }
        },
    )
}

/// Finds the blank line ending the first event: the event's length and the
/// offset where the next event starts.
fn event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    buffer
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == b'\n')
        .find_map(|(idx, _)| match &buffer[idx + 1..] {
            [b'\n', ..] => Some((idx, idx + 2)),
            [b'\r', b'\n', ..] => Some((idx, idx + 3)),
            _ => None,
        })
}

/// Extract a complete SSE event from the front of the buffer.
///
/// Returns `None` when the buffer holds no complete event yet, and
/// `Some(None)` for a complete event that carries no data.
fn extract_event(buffer: &mut BytesMut) -> Option<Option<Result<StreamEvent>>> {
    let (len, next) = event_boundary(buffer)?;
    let raw = buffer.split_to(next);
    let event_text = match std::str::from_utf8(&raw[..len]) {
        Ok(text) => text,
        Err(e) => {
            return Some(Some(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            ))));
        }
    };

    let data: Vec<&str> = event_text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.starts_with(':'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if data.is_empty() {
        return Some(None);
    }
    let data = data.join("\n");

    Some(Some(parse_data(data.trim())))
}

fn parse_data(data: &str) -> Result<StreamEvent> {
    if data == "[DONE]" {
        return Ok(StreamEvent::Done);
    }

    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        let message = envelope
            .error
            .message
            .unwrap_or_else(|| "stream reported an error".to_string());
        return Err(match envelope.error.error_type.as_deref() {
            Some("rate_limit_exceeded") | Some("insufficient_quota") => {
                Error::rate_limit(message, None)
            }
            _ => Error::streaming(message, None),
        });
    }

    serde_json::from_str::<ChatCompletionChunk>(data)
        .map(StreamEvent::Chunk)
        .map_err(|e| {
            Error::serialization(
                format!("Failed to parse event JSON: {e}"),
                Some(Box::new(e)),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunk(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    async fn collect(chunks: Vec<&'static [u8]>) -> Vec<Result<StreamEvent>> {
        let stream = Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<Bytes, reqwest::Error>(Bytes::from(c))),
        ));
        Box::pin(process_sse(stream)).collect().await
    }

    fn fragment(event: &Result<StreamEvent>) -> Option<&str> {
        match event {
            Ok(StreamEvent::Chunk(chunk)) => chunk.fragment(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn parse_chunks_and_done() {
        let body = format!("{}{}data: [DONE]\n\n", chunk("Hel"), chunk("lo"));
        let body: &'static [u8] = Box::leak(body.into_bytes().into_boxed_slice());
        let events = collect(vec![body]).await;

        assert_eq!(events.len(), 3);
        assert_eq!(fragment(&events[0]), Some("Hel"));
        assert_eq!(fragment(&events[1]), Some("lo"));
        assert!(matches!(events[2], Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn handle_split_event() {
        // Simulate an event split across multiple chunks
        let events = collect(vec![
            &b"data: {\"choices\":[{\"delta\":"[..],
            &b"{\"content\":\"hi\"}}]}\n"[..],
            &b"\ndata: [DONE]\n\n"[..],
        ])
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(fragment(&events[0]), Some("hi"));
        assert!(matches!(events[1], Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn skip_comments_and_crlf() {
        let events = collect(vec![
            &b": keep-alive\r\n\r\n"[..],
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\n"[..],
        ])
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(fragment(&events[0]), Some("x"));
    }

    #[tokio::test]
    async fn final_event_without_blank_line() {
        let events = collect(vec![&b"data: [DONE]"[..]]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn handle_malformed_event() {
        let events = collect(vec![&b"data: {not json}\n\n"[..]]).await;
        assert_eq!(events.len(), 1);
        let err = events[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("Failed to parse event JSON"));
    }

    #[tokio::test]
    async fn error_payload_in_stream() {
        let events = collect(vec![
            &b"data: {\"error\":{\"type\":\"rate_limit_exceeded\",\"message\":\"slow down\"}}\n\n"[..],
            &b"data: {\"error\":{\"type\":\"server_error\",\"message\":\"boom\"}}\n\n"[..],
        ])
        .await;
        assert!(events[0].as_ref().unwrap_err().is_rate_limit());
        assert!(events[1].as_ref().unwrap_err().to_string().contains("boom"));
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks() {
        let events = collect(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"caf\xC3"[..],
            &b"\xA9\"}}]}\n\ndata: [DONE]\n\n"[..],
        ])
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(fragment(&events[0]), Some("caf\u{e9}"));
        assert!(matches!(events[1], Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn crlf_split_across_chunks() {
        let events = collect(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"y\"}}]}\r"[..],
            &b"\n\r"[..],
            &b"\ndata: [DONE]\r\n\r\n"[..],
        ])
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(fragment(&events[0]), Some("y"));
        assert!(matches!(events[1], Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let events = collect(vec![&b"data: \xff\xfe\n\n"[..]]).await;
        assert!(events[0].is_err());
    }
}
