use std::io::{self, BufRead, BufReader};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use super::machine::{Connection, JobKind};
use super::sse::SseParser;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Granularity at which a sleeping reader notices it was closed.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("could not connect: {0}")]
    Connect(String),
    #[error("server answered HTTP {0}")]
    Status(u16),
    #[error("read failed: {0}")]
    Read(String),
    #[error("stream ended")]
    Ended,
    #[error("malformed event {data:?}: {reason}")]
    Malformed { data: String, reason: String },
}

#[derive(Debug)]
pub enum StreamMessage<E> {
    Event(E),
    TransportError(StreamError),
}

#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Used until the server sends its own `retry:` hint.
    pub reconnect_delay: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Client for event feeds. A blocking client's timeout bounds each read of
/// the body rather than the whole response, so a quiet feed wakes its reader
/// every `poll` without ending the stream.
pub fn feed_client(poll: Duration) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder().timeout(poll).build()
}

/// Owning handle to a reader thread. Closing (or dropping) stops delivery;
/// nothing is sent to the owner afterwards, and the reader drops its HTTP
/// connection within one poll interval.
pub struct StreamHandle {
    closed: Arc<AtomicBool>,
}

impl Connection for StreamHandle {
    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the feed at `url` on a reader thread. Every message is passed
/// through `wrap` so several feeds can share one channel.
pub fn open<K, M, F>(
    http: reqwest::blocking::Client,
    url: String,
    options: StreamOptions,
    tx: Sender<M>,
    wrap: F,
) -> std::io::Result<StreamHandle>
where
    K: JobKind + 'static,
    M: Send + 'static,
    F: Fn(StreamMessage<K::Event>) -> M + Send + 'static,
{
    let closed = Arc::new(AtomicBool::new(false));
    let reader = Reader::<K, M, F> {
        http,
        url,
        options,
        tx,
        wrap,
        closed: Arc::clone(&closed),
        parser: SseParser::new(),
        _kind: PhantomData,
    };
    thread::Builder::new()
        .name(format!("{}-feed", K::NAME))
        .spawn(move || reader.run())?;
    Ok(StreamHandle { closed })
}

struct Reader<K: JobKind, M, F> {
    http: reqwest::blocking::Client,
    url: String,
    options: StreamOptions,
    tx: Sender<M>,
    wrap: F,
    closed: Arc<AtomicBool>,
    parser: SseParser,
    _kind: PhantomData<fn() -> K>,
}

impl<K, M, F> Reader<K, M, F>
where
    K: JobKind,
    F: Fn(StreamMessage<K::Event>) -> M,
{
    fn run(mut self) {
        log::debug!("[{}] opening {}", K::NAME, self.url);
        while !self.is_closed() {
            let err = match self.read_once() {
                Ok(()) => StreamError::Ended,
                Err(err) => err,
            };
            self.parser.discard_pending();
            if !self.send(StreamMessage::TransportError(err)) {
                break;
            }
            let delay = self.parser.retry().unwrap_or(self.options.reconnect_delay);
            self.sleep(delay);
        }
        log::debug!("[{}] reader for {} stopped", K::NAME, self.url);
    }

    /// One connection: returns when the server ends the body or an error
    /// occurs. Also returns early once closed, dropping the response and with
    /// it the socket.
    fn read_once(&mut self) -> Result<(), StreamError> {
        let mut request = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(id) = self.parser.last_event_id() {
            request = request.header("Last-Event-ID", id);
        }
        let response = request
            .send()
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StreamError::Status(response.status().as_u16()));
        }

        let mut reader = BufReader::new(response);
        // Bytes survive a timed-out read, so a line may arrive in pieces.
        let mut line = Vec::new();
        loop {
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(e) if is_poll_timeout(&e) => {
                    if self.is_closed() {
                        return Ok(());
                    }
                    continue;
                }
                Err(e) => return Err(StreamError::Read(e.to_string())),
            }
            if self.is_closed() {
                return Ok(());
            }
            if line.last() != Some(&b'\n') {
                // End of body mid-line; the next read reports it.
                continue;
            }
            let text = String::from_utf8_lossy(&line).into_owned();
            line.clear();
            let Some(event) = self.parser.feed_line(&text) else {
                continue;
            };
            log::trace!("[{}] event {:?} id {:?}", K::NAME, event.event, event.id);
            let message = match serde_json::from_str::<K::Event>(&event.data) {
                Ok(parsed) => StreamMessage::Event(parsed),
                Err(e) => StreamMessage::TransportError(StreamError::Malformed {
                    data: event.data,
                    reason: e.to_string(),
                }),
            };
            if !self.send(message) {
                return Ok(());
            }
        }
    }

    /// Returns false when the owner is gone or has closed the feed.
    fn send(&self, message: StreamMessage<K::Event>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send((self.wrap)(message)).is_ok()
    }

    fn sleep(&self, total: Duration) {
        let mut left = total;
        while !left.is_zero() && !self.is_closed() {
            let step = left.min(SLEEP_SLICE);
            thread::sleep(step);
            left -= step;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn is_poll_timeout(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::TimedOut
        || err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .is_some_and(reqwest::Error::is_timeout)
}
