//! Pricing stream decoding.
//!
//! The pricing endpoint answers with one JSON object per line. Chunks from
//! the HTTP body do not respect line boundaries, so bytes are buffered until
//! a newline arrives. A line that fails to decode, or runs past
//! [`MAX_LINE_BYTES`], becomes [`StreamMessage::Malformed`]; only transport
//! failures end the stream.

use std::fmt::Display;

use futures::stream::{self, Stream, StreamExt};

use super::api_types::{PriceLine, StreamLine};
use super::symbology::from_oanda;
use crate::application::ports::{RawPrice, StreamMessage, VenueError};

/// Longest line accepted from the pricing stream.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// A line taken from a [`LineBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferedLine {
    /// Complete line without its terminator.
    Line(Vec<u8>),
    /// Line longer than the limit. Its bytes are dropped up to the next newline.
    TooLong {
        /// Limit in bytes.
        limit: usize,
    },
}

/// Accumulates body chunks and yields complete lines.
///
/// Memory stays bounded by the line limit: once the pending line passes it,
/// the buffer reports [`BufferedLine::TooLong`] and skips to the next newline.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    scanned: usize,
    max_line: usize,
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    /// Buffer with a custom line limit.
    #[must_use]
    pub const fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_line,
            discarding: false,
        }
    }

    /// Append a chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        let chunk = if self.discarding {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    &chunk[pos + 1..]
                }
                None => return,
            }
        } else {
            chunk
        };
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete, non-blank line without its terminator.
    pub fn next_line(&mut self) -> Option<BufferedLine> {
        loop {
            // Bytes before `scanned` are known to hold no newline.
            let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
                if self.buf.len() > self.max_line {
                    self.buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                    return Some(BufferedLine::TooLong {
                        limit: self.max_line,
                    });
                }
                self.scanned = self.buf.len();
                return None;
            };

            let pos = self.scanned + offset;
            self.scanned = 0;
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.len() > self.max_line {
                return Some(BufferedLine::TooLong {
                    limit: self.max_line,
                });
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(BufferedLine::Line(line));
            }
        }
    }

    /// Whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        if std::mem::replace(&mut self.discarding, false)
            || rest.iter().all(u8::is_ascii_whitespace)
        {
            None
        } else {
            Some(rest)
        }
    }
}

/// Decode one line into a stream message.
#[must_use]
pub fn parse_stream_line(line: &[u8]) -> StreamMessage {
    match serde_json::from_slice::<StreamLine>(line) {
        Ok(StreamLine::Price(price)) => price_message(price),
        Ok(StreamLine::Heartbeat(heartbeat)) => StreamMessage::Heartbeat {
            time: heartbeat.time,
        },
        Err(e) => StreamMessage::Malformed {
            reason: e.to_string(),
        },
    }
}

fn line_message(line: BufferedLine) -> StreamMessage {
    match line {
        BufferedLine::Line(bytes) => parse_stream_line(&bytes),
        BufferedLine::TooLong { limit } => StreamMessage::Malformed {
            reason: format!("line exceeds {limit} bytes"),
        },
    }
}

fn price_message(price: PriceLine) -> StreamMessage {
    let (Some(bid), Some(ask)) = (price.bids.into_iter().next(), price.asks.into_iter().next())
    else {
        return StreamMessage::Malformed {
            reason: format!("{} price without both sides", price.instrument),
        };
    };
    StreamMessage::Price(RawPrice {
        instrument: from_oanda(&price.instrument),
        bid: bid.price,
        ask: ask.price,
        time: price.time,
    })
}

struct LineState<S> {
    body: S,
    buffer: LineBuffer,
    done: bool,
}

/// Turn an HTTP body into a stream of decoded messages.
///
/// The stream ends when the body ends; a body error is yielded once as a
/// transport error and then the stream ends.
pub fn decode_body<S, B, E>(body: S) -> impl Stream<Item = Result<StreamMessage, VenueError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = LineState {
        body,
        buffer: LineBuffer::default(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.buffer.next_line() {
                return Some((Ok(line_message(line)), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.buffer.push(chunk.as_ref()),
                Some(Err(e)) => {
                    state.done = true;
                    state.buffer = LineBuffer::default();
                    return Some((Err(VenueError::transport(format!("stream read: {e}"))), state));
                }
                None => {
                    state.done = true;
                    if let Some(rest) = state.buffer.finish() {
                        return Some((Ok(parse_stream_line(&rest)), state));
                    }
                    return None;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::InstrumentId;

    const PRICE: &str = r#"{"type":"PRICE","instrument":"EUR_USD","time":"2024-01-02T10:00:00Z","bids":[{"price":"1.10000","liquidity":1000000}],"asks":[{"price":"1.10012","liquidity":1000000}],"tradeable":true}"#;
    const HEARTBEAT: &str = r#"{"type":"HEARTBEAT","time":"2024-01-02T10:00:05Z"}"#;

    #[test]
    fn buffer_splits_lines_across_chunks() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"{\"a\":");
        assert!(buffer.next_line().is_none());
        buffer.push(b"1}\r\n\n{\"b\"");
        assert_eq!(
            buffer.next_line(),
            Some(BufferedLine::Line(b"{\"a\":1}".to_vec()))
        );
        assert!(buffer.next_line().is_none());
        buffer.push(b":2}");
        assert_eq!(buffer.finish().unwrap(), b"{\"b\":2}");
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn overlong_line_is_dropped_up_to_next_newline() {
        let mut buffer = LineBuffer::with_max_line(8);
        buffer.push(b"0123456789");
        assert_eq!(buffer.next_line(), Some(BufferedLine::TooLong { limit: 8 }));
        assert!(buffer.next_line().is_none());

        // Rest of the oversized line, then a good one.
        buffer.push(b"abcdef\nok\n");
        assert_eq!(buffer.next_line(), Some(BufferedLine::Line(b"ok".to_vec())));

        buffer.push(b"0123456789ab\nnext\n");
        assert_eq!(buffer.next_line(), Some(BufferedLine::TooLong { limit: 8 }));
        assert_eq!(buffer.next_line(), Some(BufferedLine::Line(b"next".to_vec())));
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn price_line_takes_top_of_book() {
        let StreamMessage::Price(price) = parse_stream_line(PRICE.as_bytes()) else {
            panic!("expected price");
        };
        assert_eq!(price.instrument, InstrumentId::new("EUR/USD"));
        assert_eq!(price.bid, "1.10000");
        assert_eq!(price.ask, "1.10012");
        assert_eq!(price.time, "2024-01-02T10:00:00Z");
    }

    #[test]
    fn heartbeat_line() {
        assert_eq!(
            parse_stream_line(HEARTBEAT.as_bytes()),
            StreamMessage::Heartbeat {
                time: "2024-01-02T10:00:05Z".to_string()
            }
        );
    }

    #[test]
    fn garbage_and_unknown_types_are_malformed() {
        assert!(matches!(
            parse_stream_line(b"not json"),
            StreamMessage::Malformed { .. }
        ));
        assert!(matches!(
            parse_stream_line(br#"{"type":"ORDER_FILL","id":"1"}"#),
            StreamMessage::Malformed { .. }
        ));
    }

    #[test]
    fn one_sided_price_is_malformed() {
        let line = r#"{"type":"PRICE","instrument":"EUR_USD","time":"t","bids":[],"asks":[{"price":"1.1"}]}"#;
        assert!(matches!(
            parse_stream_line(line.as_bytes()),
            StreamMessage::Malformed { .. }
        ));
    }

    #[tokio::test]
    async fn decode_body_yields_messages_in_order() {
        let body = format!("{PRICE}\n{HEARTBEAT}\nbroken\n");
        let (head, tail) = body.split_at(40);
        let chunks: Vec<Result<Vec<u8>, String>> =
            vec![Ok(head.as_bytes().to_vec()), Ok(tail.as_bytes().to_vec())];

        let messages: Vec<_> = decode_body(stream::iter(chunks)).collect().await;
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], Ok(StreamMessage::Price(_))));
        assert!(matches!(messages[1], Ok(StreamMessage::Heartbeat { .. })));
        assert!(matches!(messages[2], Ok(StreamMessage::Malformed { .. })));
    }

    #[tokio::test]
    async fn oversized_line_does_not_end_the_stream() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(vec![b'x'; MAX_LINE_BYTES + 1]),
            Ok(vec![b'x'; 1024]),
            Ok(format!("\n{HEARTBEAT}\n").into_bytes()),
        ];

        let messages: Vec<_> = decode_body(stream::iter(chunks)).collect().await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            messages[0],
            Ok(StreamMessage::Malformed { ref reason }) if reason.contains("exceeds")
        ));
        assert!(matches!(messages[1], Ok(StreamMessage::Heartbeat { .. })));
    }

    #[tokio::test]
    async fn body_error_ends_stream_with_transport_error() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(format!("{HEARTBEAT}\n").into_bytes()),
            Err("connection reset".to_string()),
            Ok(b"ignored\n".to_vec()),
        ];

        let messages: Vec<_> = decode_body(stream::iter(chunks)).collect().await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[1], Err(ref e) if e.is_transport()));
    }
}
