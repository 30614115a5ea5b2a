use tracing::debug;

use super::types::{HeaderMap, Method};

/// Parser states. Transitions are monotonic: `StartLine` → `Headers` →
/// (`Body` | `Complete`); `Error` is a terminal sink; `Complete` is
/// terminal until [`HttpParser::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    StartLine,
    Headers,
    Body,
    Complete,
    Error,
}

/// Diagnostic carried by the `Error` state. The parser never returns
/// `Result`; every failure is a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed start-line")]
    MalformedStartLine,
    #[error("Unknown HTTP method")]
    UnknownMethod,
    #[error("Unsupported HTTP version")]
    UnsupportedVersion,
    #[error("Header missing ':'")]
    HeaderMissingColon,
    #[error("Chunked transfer-encoding unsupported")]
    ChunkedUnsupported,
    #[error("Invalid Content-Length")]
    InvalidContentLength,
}

/// Incremental HTTP/1.1 request parser.
///
/// Feed bytes from the socket with [`consume`](Self::consume); the return
/// value is how many bytes were taken, and partial consumption is fine —
/// call again as more data arrives. The final parse result is independent
/// of how the byte stream was split across calls.
#[derive(Debug)]
pub struct HttpParser {
    state: ParseState,
    line_buf: Vec<u8>,
    method: Option<Method>,
    target: String,
    path: String,
    version: String,
    headers: HeaderMap,
    content_length: usize,
    body_received: usize,
    body: Vec<u8>,
    error: Option<ParseError>,
}

impl Default for HttpParser {
    fn default() -> Self {
        Self {
            state: ParseState::StartLine,
            line_buf: Vec::new(),
            method: None,
            target: String::new(),
            path: String::new(),
            version: String::new(),
            headers: HeaderMap::new(),
            content_length: 0,
            body_received: 0,
            body: Vec::new(),
            error: None,
        }
    }
}

impl HttpParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn complete(&self) -> bool {
        self.state == ParseState::Complete
    }

    pub fn error(&self) -> bool {
        self.state == ParseState::Error
    }

    pub fn parse_error(&self) -> Option<ParseError> {
        self.error
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.map(|e| e.to_string())
    }

    /// Parsed method; `None` until the start line has been accepted.
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// Raw request-target, including any query string.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Target up to (not including) the first `?`. No percent-decoding
    /// happens at this layer.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Version token, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn has_body(&self) -> bool {
        self.content_length > 0 || !self.body.is_empty()
    }

    /// Body bytes received so far; the full body only once `complete()`.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Move the accumulated headers out of the parser.
    pub fn take_headers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.headers)
    }

    /// Move the owned body out of the parser.
    pub fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }

    /// Clear everything back to `StartLine` so the instance can parse the
    /// next request on a kept-alive connection.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed bytes; returns how many were consumed. Returns 0 once the
    /// parser is in a terminal state.
    pub fn consume(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        let mut consumed = 0;
        while consumed < data.len() {
            let n = match self.state {
                ParseState::StartLine => self.consume_start_line(&data[consumed..]),
                ParseState::Headers => self.consume_headers(&data[consumed..]),
                ParseState::Body => self.consume_body(&data[consumed..]),
                ParseState::Complete | ParseState::Error => break,
            };
            consumed += n;
            if matches!(self.state, ParseState::Complete | ParseState::Error) {
                break;
            }
        }
        consumed
    }

    fn fail(&mut self, err: ParseError) {
        debug!(error = %err, "request parse failed");
        self.state = ParseState::Error;
        self.error = Some(err);
    }

    // METHOD SP TARGET SP VERSION, terminated by LF (a missing CR before
    // the LF is tolerated by trimming).
    fn consume_start_line(&mut self, data: &[u8]) -> usize {
        for (i, &b) in data.iter().enumerate() {
            if b != b'\n' {
                self.line_buf.push(b);
                continue;
            }
            let mut line = std::mem::take(&mut self.line_buf);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();

            let Some(p1) = line.find(' ') else {
                self.fail(ParseError::MalformedStartLine);
                return i + 1;
            };
            let Some(p2) = line[p1 + 1..].find(' ').map(|p| p + p1 + 1) else {
                self.fail(ParseError::MalformedStartLine);
                return i + 1;
            };

            let method_token = &line[..p1];
            let target = &line[p1 + 1..p2];
            let version = &line[p2 + 1..];

            let Ok(method) = method_token.parse::<Method>() else {
                self.fail(ParseError::UnknownMethod);
                return i + 1;
            };
            if version != "HTTP/1.1" && version != "HTTP/1.0" {
                self.fail(ParseError::UnsupportedVersion);
                return i + 1;
            }

            self.method = Some(method);
            self.version = version.to_string();
            self.target = target.to_string();
            self.path = match target.find('?') {
                Some(q) => target[..q].to_string(),
                None => target.to_string(),
            };
            self.state = ParseState::Headers;
            return i + 1;
        }
        data.len()
    }

    // Header lines until the blank line ends the block.
    fn consume_headers(&mut self, data: &[u8]) -> usize {
        for (i, &b) in data.iter().enumerate() {
            if b != b'\n' {
                self.line_buf.push(b);
                continue;
            }
            let mut line = std::mem::take(&mut self.line_buf);
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.is_empty() {
                self.finish_headers();
                return i + 1;
            }

            let line = String::from_utf8_lossy(&line).into_owned();
            let Some(colon) = line.find(':') else {
                self.fail(ParseError::HeaderMissingColon);
                return i + 1;
            };
            let key = line[..colon].trim_end_matches(|c| c == ' ' || c == '\t');
            let value = line[colon + 1..].trim_start_matches(|c| c == ' ' || c == '\t');
            self.headers.insert(key, value);
        }
        data.len()
    }

    fn finish_headers(&mut self) {
        if let Some(te) = self.headers.get("Transfer-Encoding") {
            if te.to_ascii_lowercase().contains("chunked") {
                self.fail(ParseError::ChunkedUnsupported);
                return;
            }
        }
        if let Some(cl) = self.headers.get("Content-Length") {
            let Ok(len) = cl.trim().parse::<usize>() else {
                self.fail(ParseError::InvalidContentLength);
                return;
            };
            self.content_length = len;
            if len > 0 {
                self.body.reserve(len);
                self.state = ParseState::Body;
                return;
            }
        }
        self.state = ParseState::Complete;
    }

    // Fixed-length body per Content-Length.
    fn consume_body(&mut self, data: &[u8]) -> usize {
        let need = self.content_length - self.body_received;
        let take = need.min(data.len());
        self.body.extend_from_slice(&data[..take]);
        self.body_received += take;
        if self.body_received == self.content_length {
            self.state = ParseState::Complete;
        }
        take
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut HttpParser, bytes: &[u8]) {
        let mut off = 0;
        while off < bytes.len() {
            let n = parser.consume(&bytes[off..]);
            if n == 0 {
                break;
            }
            off += n;
        }
    }

    #[test]
    fn parses_simple_get() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"GET /hello?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert!(p.complete());
        assert_eq!(p.method(), Some(Method::Get));
        assert_eq!(p.target(), "/hello?x=1");
        assert_eq!(p.path(), "/hello");
        assert_eq!(p.version(), "HTTP/1.1");
        assert_eq!(p.headers().get("host"), Some("localhost"));
        assert!(!p.has_body());
    }

    #[test]
    fn split_insensitive_byte_by_byte() {
        let raw = b"POST /submit HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello";
        let mut whole = HttpParser::new();
        feed_all(&mut whole, raw);

        let mut trickled = HttpParser::new();
        for &b in raw.iter() {
            trickled.consume(&[b]);
        }

        assert!(whole.complete() && trickled.complete());
        assert_eq!(whole.method(), trickled.method());
        assert_eq!(whole.target(), trickled.target());
        assert_eq!(whole.body(), trickled.body());
        assert_eq!(whole.body(), b"hello");
    }

    #[test]
    fn split_insensitive_across_arbitrary_partitions() {
        let raw: &[u8] = b"PUT /a/b HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\n\r\nabc";
        for split in 1..raw.len() {
            let mut p = HttpParser::new();
            feed_all(&mut p, &raw[..split]);
            feed_all(&mut p, &raw[split..]);
            assert!(p.complete(), "split at {split}");
            assert_eq!(p.body(), b"abc", "split at {split}");
            assert_eq!(p.path(), "/a/b", "split at {split}");
        }
    }

    #[test]
    fn tolerates_lf_only_line_endings() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"GET / HTTP/1.1\nHost: x\n\n");
        assert!(p.complete());
        assert_eq!(p.headers().get("Host"), Some("x"));
    }

    #[test]
    fn empty_request_line_is_an_error() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"\r\n");
        assert!(p.error());
        assert_eq!(p.parse_error(), Some(ParseError::MalformedStartLine));
    }

    #[test]
    fn unknown_method_is_an_error() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"BREW /pot HTTP/1.1\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.error_message().as_deref(), Some("Unknown HTTP method"));
    }

    #[test]
    fn unsupported_version_is_an_error() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"GET / HTTP/2.0\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.parse_error(), Some(ParseError::UnsupportedVersion));
    }

    #[test]
    fn header_without_colon_is_an_error() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"GET / HTTP/1.1\r\nBogus header line\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.parse_error(), Some(ParseError::HeaderMissingColon));
    }

    #[test]
    fn chunked_transfer_encoding_is_rejected() {
        let mut p = HttpParser::new();
        feed_all(
            &mut p,
            b"POST / HTTP/1.1\r\nTransfer-Encoding: Chunked\r\n\r\n",
        );
        assert!(p.error());
        assert_eq!(p.parse_error(), Some(ParseError::ChunkedUnsupported));
    }

    #[test]
    fn invalid_content_length_is_an_error() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"POST / HTTP/1.1\r\nContent-Length: nope\r\n\r\n");
        assert!(p.error());
        assert_eq!(p.parse_error(), Some(ParseError::InvalidContentLength));
    }

    #[test]
    fn zero_content_length_completes_immediately() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        assert!(p.complete());
        assert!(p.body().is_empty());
    }

    #[test]
    fn short_body_stays_incomplete() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc");
        assert!(!p.complete());
        assert!(!p.error());
        assert_eq!(p.state(), ParseState::Body);
        assert_eq!(p.body(), b"abc");
    }

    #[test]
    fn consume_stops_at_request_boundary() {
        // Pipelined second request must be left unconsumed.
        let raw = b"GET /one HTTP/1.1\r\n\r\nGET /two HTTP/1.1\r\n\r\n";
        let mut p = HttpParser::new();
        let n = p.consume(raw);
        assert!(p.complete());
        assert_eq!(n, b"GET /one HTTP/1.1\r\n\r\n".len());
        assert_eq!(p.path(), "/one");
    }

    #[test]
    fn duplicate_headers_overwrite_case_insensitively() {
        let mut p = HttpParser::new();
        feed_all(
            &mut p,
            b"GET / HTTP/1.1\r\nX-Tag: one\r\nx-tag: two\r\n\r\n",
        );
        assert!(p.complete());
        assert_eq!(p.headers().get("X-Tag"), Some("two"));
        assert_eq!(p.headers().len(), 1);
    }

    #[test]
    fn reset_allows_reuse() {
        let mut p = HttpParser::new();
        feed_all(&mut p, b"GET /a HTTP/1.1\r\n\r\n");
        assert!(p.complete());
        p.reset();
        assert_eq!(p.state(), ParseState::StartLine);
        feed_all(&mut p, b"GET /b HTTP/1.1\r\n\r\n");
        assert!(p.complete());
        assert_eq!(p.path(), "/b");
    }
}
