//! The session tap: records every chunk crossing the transport, serializes
//! the capture, and replays it against a fresh session for deterministic
//! tests without a device.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::{Result, SyncError};
use crate::transport::{BoxedStream, PalmStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapEvent {
    pub direction: Direction,
    pub data: Vec<u8>,
}

/// An ordered capture of everything a session read and wrote.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Vec<TapEvent>,
}

#[derive(Serialize, Deserialize)]
struct SerializedEvent {
    direction: Direction,
    data: String,
}

impl Recorder {
    pub fn record(&mut self, direction: Direction, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        // Coalesce consecutive chunks in the same direction; chunk sizes are
        // an artifact of buffer sizes, not of the protocol.
        if let Some(last) = self.events.last_mut() {
            if last.direction == direction {
                last.data.extend_from_slice(chunk);
                return;
            }
        }
        self.events.push(TapEvent { direction, data: chunk.to_vec() });
    }

    pub fn events(&self) -> &[TapEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        let serialized: Vec<SerializedEvent> = self
            .events
            .iter()
            .map(|e| SerializedEvent { direction: e.direction, data: hex::encode(&e.data) })
            .collect();
        serde_json::to_string_pretty(&serialized)
            .map_err(|e| SyncError::Encoding(format!("recorder serialization: {e}")))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let serialized: Vec<SerializedEvent> = serde_json::from_str(raw)
            .map_err(|e| SyncError::Encoding(format!("recorder deserialization: {e}")))?;
        let mut events = Vec::with_capacity(serialized.len());
        for event in serialized {
            events.push(TapEvent {
                direction: event.direction,
                data: hex::decode(&event.data)
                    .map_err(|e| SyncError::Encoding(format!("recorder hex payload: {e}")))?,
            });
        }
        Ok(Recorder { events })
    }
}

pub type SharedRecorder = Arc<Mutex<Recorder>>;

pub fn shared_recorder() -> SharedRecorder {
    Arc::new(Mutex::new(Recorder::default()))
}

/// Passes all traffic through to the inner stream while mirroring each
/// chunk into the recorder.
pub struct TapStream<S> {
    inner: S,
    recorder: SharedRecorder,
}

impl<S> TapStream<S> {
    pub fn new(inner: S, recorder: SharedRecorder) -> Self {
        TapStream { inner, recorder }
    }
}

/// Wrap a stream with a tap, boxed for session construction.
pub fn tap(stream: impl PalmStream + 'static, recorder: SharedRecorder) -> BoxedStream {
    Box::new(TapStream::new(stream, recorder))
}

impl<S: AsyncRead + Unpin> AsyncRead for TapStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let result = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = result {
            let after = buf.filled().len();
            if after > before {
                if let Ok(mut recorder) = self.recorder.lock() {
                    recorder.record(Direction::Read, &buf.filled()[before..after]);
                }
            }
        }
        result
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TapStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let result = Pin::new(&mut self.inner).poll_write(cx, data);
        if let Poll::Ready(Ok(written)) = result {
            if let Ok(mut recorder) = self.recorder.lock() {
                recorder.record(Direction::Write, &data[..written]);
            }
        }
        result
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Drives a session from a recording instead of a device.
///
/// Every write is checked byte-for-byte against the next recorded WRITE
/// span; once a span is fully matched, the READ events up to the following
/// WRITE become available to the reader. A mismatch surfaces as an
/// `InvalidData` I/O error, which fails the test driving the session.
pub struct ReplayStream {
    events: Vec<TapEvent>,
    cursor: usize,
    matched: usize,
    readable: VecDeque<u8>,
    reader_waker: Option<Waker>,
}

impl ReplayStream {
    pub fn new(recorder: Recorder) -> Self {
        let mut stream = ReplayStream {
            events: recorder.events,
            cursor: 0,
            matched: 0,
            readable: VecDeque::new(),
            reader_waker: None,
        };
        stream.release_reads();
        stream
    }

    /// Queue READ events up to the next WRITE event.
    fn release_reads(&mut self) {
        while let Some(event) = self.events.get(self.cursor) {
            if event.direction != Direction::Read {
                break;
            }
            self.readable.extend(event.data.iter());
            self.cursor += 1;
        }
        if !self.readable.is_empty() {
            if let Some(waker) = self.reader_waker.take() {
                waker.wake();
            }
        }
    }

    /// True once every recorded event has been consumed.
    pub fn exhausted(&self) -> bool {
        self.cursor >= self.events.len() && self.readable.is_empty()
    }
}

impl AsyncRead for ReplayStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.readable.is_empty() {
            if self.cursor >= self.events.len() {
                // Recording exhausted: signal EOF.
                return Poll::Ready(Ok(()));
            }
            self.reader_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let take = buf.remaining().min(self.readable.len());
        let drained: Vec<u8> = self.readable.drain(..take).collect();
        buf.put_slice(&drained);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ReplayStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let mut offset = 0;
        while offset < data.len() {
            let (cursor, matched) = (self.cursor, self.matched);
            let (direction, event_len) = match self.events.get(cursor) {
                Some(event) => (event.direction, event.data.len()),
                None => {
                    return Poll::Ready(Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!(
                            "write of {} bytes past the end of the recording",
                            data.len() - offset
                        ),
                    )))
                }
            };
            if direction != Direction::Write {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "session wrote where the recording expects a read",
                )));
            }
            let len = (event_len - matched).min(data.len() - offset);
            let expected = &self.events[cursor].data[matched..matched + len];
            let chunk = &data[offset..offset + len];
            if expected != chunk {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "replay mismatch at event {cursor}, offset {matched}: \
                         wrote {:02x?}, recorded {:02x?}",
                        &chunk[..len.min(16)],
                        &expected[..len.min(16)],
                    ),
                )));
            }
            offset += len;
            self.matched += len;
            if self.matched == event_len {
                self.cursor += 1;
                self.matched = 0;
                self.release_reads();
            }
        }
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
