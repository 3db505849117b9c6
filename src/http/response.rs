//! The committable HTTP/1.1 response handle.
//!
//! A [`Response`] is a cheap, cloneable handle onto shared state: the
//! dispatcher, the handler, route callbacks and the admission handler all
//! write through the same handle. All state sits behind one lock and
//! [`commit`](Response::commit) is a one-way transition checked and set under
//! that lock, so concurrent writers can never commit twice. Once committed,
//! every mutator is a no-op.

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use super::{Headers, StatusCode};

struct State {
    status: StatusCode,
    headers: Headers,
    body: BytesMut,
    committed: bool,
    keep_alive: bool,
}

/// A shared, committable HTTP response.
///
/// # Examples
///
/// ```
/// use restline::http::{Response, StatusCode};
///
/// let response = Response::new();
/// response.set_header("X-Request-Id", "abc-123");
/// assert!(response.send(StatusCode::Created, Some("application/json"), r#"{"id":1}"#));
///
/// // Committed: later writes are ignored.
/// assert!(!response.send(StatusCode::InternalServerError, None, "boom"));
/// assert_eq!(response.status(), StatusCode::Created);
///
/// let bytes = response.encode();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
/// assert!(text.contains("Content-Length: 8\r\n"));
/// ```
#[derive(Clone)]
pub struct Response {
    state: Arc<Mutex<State>>,
}

impl Response {
    /// Creates an uncommitted `200 OK` response with an empty body.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                status: StatusCode::Ok,
                headers: Headers::new(),
                body: BytesMut::new(),
                committed: false,
                keep_alive: true,
            })),
        }
    }

    /// Returns the current status code.
    pub fn status(&self) -> StatusCode {
        self.state.lock().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.mutate(|s| s.status = status);
    }

    /// Returns the first value of a response header.
    pub fn header(&self, name: &str) -> Option<String> {
        self.state.lock().headers.get(name).map(str::to_owned)
    }

    /// Appends a header. Multiple calls with the same name are additive.
    pub fn add_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        self.mutate(|s| s.headers.insert(name, value));
    }

    /// Replaces every value of a header.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        self.mutate(|s| s.headers.set(name, value));
    }

    /// Returns `true` if a `Content-Type` header has been set.
    pub fn has_content_type(&self) -> bool {
        self.state.lock().headers.contains("content-type")
    }

    /// Appends bytes to the body.
    pub fn write(&self, bytes: impl AsRef<[u8]>) {
        self.mutate(|s| s.body.put_slice(bytes.as_ref()));
    }

    /// Replaces the body.
    pub fn set_body(&self, bytes: impl AsRef<[u8]>) {
        self.mutate(|s| {
            s.body.clear();
            s.body.put_slice(bytes.as_ref());
        });
    }

    /// Returns a copy of the body written so far.
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().body)
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is
    /// written. A transport concern, so still honoured after commit.
    pub fn set_keep_alive(&self, keep_alive: bool) {
        self.state.lock().keep_alive = keep_alive;
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    /// Commits the response as it stands.
    ///
    /// Returns `false` if it was already committed.
    pub fn commit(&self) -> bool {
        let mut state = self.state.lock();
        if state.committed {
            return false;
        }
        state.committed = true;
        true
    }

    /// Atomically replaces status, content type and body, then commits.
    ///
    /// Returns `false`, leaving the response untouched, if it was already
    /// committed.
    pub fn send(
        &self,
        status: StatusCode,
        content_type: Option<&str>,
        body: impl AsRef<[u8]>,
    ) -> bool {
        let mut state = self.state.lock();
        if state.committed {
            return false;
        }
        state.status = status;
        if let Some(content_type) = content_type {
            state.headers.set("Content-Type", content_type);
        }
        state.body.clear();
        state.body.put_slice(body.as_ref());
        state.committed = true;
        true
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Content-Length: <n>` (always written).
    /// - `Connection: keep-alive` or `Connection: close`.
    pub fn encode(&self) -> BytesMut {
        let state = self.state.lock();
        let content_length = state.body.len();

        let mut headers = state.headers.clone();
        if !state.body.is_empty() && !headers.contains("content-type") {
            headers.insert("Content-Type", "text/plain; charset=utf-8");
        }
        let connection = if state.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        headers.set("Connection", connection);

        let estimated_size = 128 + headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                state.status.as_u16(),
                state.status.canonical_reason()
            )
            .as_bytes(),
        );

        // Headers
        for (name, value) in headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        buf.put_slice(&state.body);
        buf
    }

    fn mutate(&self, f: impl FnOnce(&mut State)) {
        let mut state = self.state.lock();
        if !state.committed {
            f(&mut state);
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Response")
            .field("status", &state.status)
            .field("committed", &state.committed)
            .field("body", &state.body.len())
            .finish()
    }
}
