use serde::Serialize;

use super::types::HeaderMap;

/// An outgoing HTTP response under construction.
///
/// Handlers and middleware mutate the response; the serializer owns the
/// wire framing (status line, `Date`, `Server`, `Content-Length`). Once
/// `ended` is set, further writes return `false` without mutating state.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
    ended: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: Vec::new(),
            ended: false,
        }
    }

    /// Set the status code. Accepts a bare `u16` or a
    /// [`Status`](crate::http::Status) value.
    pub fn status(&mut self, code: impl Into<u16>) -> &mut Self {
        self.status = code.into();
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.set_header("Content-Type", content_type)
    }

    /// Add a `Set-Cookie` header. Each cookie gets its own header line on
    /// emission; cookies are never joined into one field.
    pub fn set_cookie(&mut self, cookie: &str) -> &mut Self {
        self.headers.append("Set-Cookie", cookie);
        self
    }

    /// Buffer `body` and finalize the response. Sets a
    /// `text/plain; charset=utf-8` content type unless one is already
    /// present. Returns `false` if the response was already ended.
    pub fn send(&mut self, body: impl AsRef<[u8]>) -> bool {
        self.send_with_type(body.as_ref(), "text/plain; charset=utf-8")
    }

    /// Buffer an HTML body and finalize.
    pub fn html(&mut self, html: impl AsRef<[u8]>) -> bool {
        self.send_with_type(html.as_ref(), "text/html; charset=utf-8")
    }

    /// Serialize `value` as JSON, buffer it, and finalize. Returns `false`
    /// if serialization fails or the response was already ended; the
    /// response is left untouched on failure.
    pub fn json<T: Serialize>(&mut self, value: &T) -> bool {
        if self.ended {
            return false;
        }
        match serde_json::to_vec(value) {
            Ok(bytes) => self.send_with_type(&bytes, "application/json"),
            Err(_) => false,
        }
    }

    /// Redirect to `location` with the given 3xx status code.
    pub fn redirect(&mut self, location: &str, code: u16) -> bool {
        if self.ended {
            return false;
        }
        self.status = code;
        self.headers.insert("Location", location);
        self.ended = true;
        true
    }

    /// Append to the body without finalizing. Returns `false` once ended.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) -> bool {
        if self.ended {
            return false;
        }
        self.body.extend_from_slice(chunk.as_ref());
        true
    }

    /// Finalize the response; no more writes are accepted.
    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    fn send_with_type(&mut self, body: &[u8], content_type: &str) -> bool {
        if self.ended {
            return false;
        }
        if !self.headers.contains("Content-Type") {
            self.headers.insert("Content-Type", content_type);
        }
        self.body.extend_from_slice(body);
        self.ended = true;
        true
    }
}
