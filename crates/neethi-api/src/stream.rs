//! Streaming chunk decoding

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::error::{Error, Result};

/// Literal event payload that marks the normal end of a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// A stream of content fragments. Ends after the sentinel or when the
/// connection closes; yields at most one error, which is always last.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// JSON payload of one stream event
#[derive(Debug, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// What a single event's data means for the reader
#[derive(Debug)]
pub enum EventPayload {
    /// A content fragment, possibly followed by the end of the stream
    Content { text: String, last: bool },
    /// Nothing to deliver (empty content, keep-alive)
    Empty,
    /// Normal end of stream
    Done,
    /// The backend reported a failure mid-stream
    Error(String),
    /// The data was not valid JSON
    Malformed(serde_json::Error),
}

/// Interpret the data carried by one event
pub fn decode_event(data: &str) -> EventPayload {
    if data == DONE_SENTINEL {
        return EventPayload::Done;
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return EventPayload::Malformed(e),
    };

    if let Some(message) = chunk.error {
        return EventPayload::Error(message);
    }

    match chunk.content {
        Some(text) if !text.is_empty() => EventPayload::Content {
            text,
            last: chunk.done,
        },
        _ if chunk.done => EventPayload::Done,
        _ => EventPayload::Empty,
    }
}

/// Turn an event source into a stream of content fragments.
///
/// The event source is closed on every exit path so it never reconnects.
pub(crate) fn chunk_stream(mut event_source: EventSource) -> impl Stream<Item = Result<String>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {
                    tracing::debug!("chat stream opened");
                }
                Ok(Event::Message(msg)) => match decode_event(&msg.data) {
                    EventPayload::Content { text, last } => {
                        yield Ok(text);
                        if last {
                            break;
                        }
                    }
                    EventPayload::Empty => {}
                    EventPayload::Done => {
                        tracing::debug!("chat stream finished");
                        break;
                    }
                    EventPayload::Error(message) => {
                        event_source.close();
                        yield Err(Error::api("stream_error", message));
                        return;
                    }
                    EventPayload::Malformed(e) => {
                        tracing::warn!("Error parsing chunk: {} (data: {:?})", e, msg.data);
                    }
                },
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    tracing::debug!("chat stream closed by server");
                    break;
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    event_source.close();
                    let body = response.text().await.unwrap_or_default();
                    yield Err(Error::Status {
                        status: status.as_u16(),
                        body,
                    });
                    return;
                }
                Err(reqwest_eventsource::Error::Transport(e)) => {
                    event_source.close();
                    yield Err(Error::Http(e));
                    return;
                }
                Err(e) => {
                    event_source.close();
                    yield Err(Error::Sse(e.to_string()));
                    return;
                }
            }
        }
        event_source.close();
    }
}
