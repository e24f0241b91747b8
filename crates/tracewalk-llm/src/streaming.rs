use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;

use tracewalk_core::error::{Result, TracewalkError};

/// Incremental parser for `text/event-stream` bodies.
///
/// Events are separated by a blank line; only `data:` lines carry payload
/// for chat completions, so `event:`/`id:`/comment lines are skipped.
/// Raw bytes are buffered until an event is complete, so a multi-byte
/// character split across network chunks decodes intact.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return the data payloads of every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        // CR never appears unescaped inside a JSON payload
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let block = String::from_utf8_lossy(&block);

            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|val| val.strip_prefix(' ').unwrap_or(val))
                .collect();

            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }

        payloads
    }
}

/// Adapts a byte stream into a stream of SSE data payloads.
///
/// A body error is yielded once as `LlmStream` and ends the stream.
pub struct SseStream<S> {
    inner: S,
    parser: SseParser,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, B, E> Stream for SseStream<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(payload) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(payload)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.pending.extend(this.parser.feed(bytes.as_ref()));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(TracewalkError::LlmStream(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::StreamExt;

    use super::*;

    #[test]
    fn test_sse_parser_basic() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {\"x\":1}\n\n");
        assert_eq!(events, vec!["{\"x\":1}"]);
    }

    #[test]
    fn test_sse_parser_skips_event_and_comment_lines() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keep-alive\n\nevent: chunk\ndata:{\"x\":2}\n\n");
        assert_eq!(events, vec!["{\"x\":2}"]);
    }

    #[test]
    fn test_sse_parser_chunked_crlf() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: [DO").is_empty());
        assert!(parser.feed(b"NE]\r\n\r").is_empty());
        let events = parser.feed(b"\n");
        assert_eq!(events, vec!["[DONE]"]);
    }

    #[test]
    fn test_sse_parser_split_multibyte_char() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"c\":\"caf\xC3").is_empty());
        let events = parser.feed(b"\xA9\"}\n\n");
        assert_eq!(events, vec!["{\"c\":\"caf\u{e9}\"}"]);
    }

    #[tokio::test]
    async fn test_body_error_surfaces_and_ends_stream() {
        let body = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"x\":1}\n\n")),
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from_static(b"data: {\"x\":2}\n\n")),
        ]);

        let items: Vec<Result<String>> = SseStream::new(body).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "{\"x\":1}");
        assert!(matches!(
            &items[1],
            Err(TracewalkError::LlmStream(msg)) if msg.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn test_clean_end_of_body() {
        let body = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"data: a\n\ndata: b")),
            Ok(Bytes::from_static(b"\n\n")),
        ]);

        let items: Vec<String> = SseStream::new(body)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec!["a", "b"]);
    }
}
