//! Per-connection request loop and response serialization.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, trace};

use crate::compression::{self, Encoding};
use crate::http::{
    parse_cookie_header, parse_query_params, reason_phrase, HttpParser, Method, ParseState,
    Request, Response,
};
use crate::router::Router;
use crate::server::options::ServerOptions;

pub(crate) const SERVER_NAME: &str = concat!("microserve/", env!("CARGO_PKG_VERSION"));

const READ_BUF_SIZE: usize = 8 * 1024;

fn set_timeout(stream: &TcpStream, ms: u64) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_millis(ms.max(1))))
}

/// Drive one connection: read and parse requests, dispatch through the
/// router, serialize responses, and keep the connection alive until a
/// close decision, a timeout, or an error.
pub(crate) fn handle_connection(
    mut stream: TcpStream,
    router: Arc<Router>,
    opts: Arc<ServerOptions>,
) {
    let peer = stream.peer_addr().ok();
    let mut pending: Vec<u8> = Vec::new();
    // Between requests on a kept-alive connection the idle timeout
    // governs the wait for the first byte; header timeout from then on.
    let mut idle_wait = false;

    if set_timeout(&stream, opts.header_timeout_ms).is_err() {
        return;
    }

    loop {
        let mut parser = HttpParser::new();
        let mut in_body = false;
        let mut header_bytes: usize = 0;

        while !parser.complete() && !parser.error() {
            let fed = if !pending.is_empty() {
                if idle_wait {
                    if set_timeout(&stream, opts.header_timeout_ms).is_err() {
                        return;
                    }
                    idle_wait = false;
                }
                let n = parser.consume(&pending);
                pending.drain(..n);
                n
            } else {
                let mut buf = [0u8; READ_BUF_SIZE];
                match stream.read(&mut buf) {
                    // Peer closed; an incomplete request gets no response.
                    Ok(0) => return,
                    Ok(n) => {
                        if idle_wait {
                            if set_timeout(&stream, opts.header_timeout_ms).is_err() {
                                return;
                            }
                            idle_wait = false;
                        }
                        let consumed = parser.consume(&buf[..n]);
                        if consumed < n {
                            pending.extend_from_slice(&buf[consumed..n]);
                        }
                        consumed
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                        ) =>
                    {
                        debug!(peer = ?peer, "receive timeout; closing connection");
                        return;
                    }
                    Err(e) => {
                        debug!(peer = ?peer, error = %e, "receive failed; closing connection");
                        return;
                    }
                }
            };

            let pre_body = matches!(parser.state(), ParseState::StartLine | ParseState::Headers);
            if pre_body {
                header_bytes += fed;
                if header_bytes > opts.max_header_bytes {
                    let (code, text) = if parser.state() == ParseState::StartLine {
                        (414, "URI Too Long\n")
                    } else {
                        (400, "Bad Request\n")
                    };
                    let _ = stream.write_all(&simple_response_bytes(code, text));
                    return;
                }
            } else {
                if parser.content_length() > opts.max_body_bytes {
                    let _ = stream.write_all(&simple_response_bytes(413, "Payload Too Large\n"));
                    return;
                }
                if !in_body && parser.state() == ParseState::Body {
                    in_body = true;
                    if set_timeout(&stream, opts.body_timeout_ms).is_err() {
                        return;
                    }
                }
            }
        }

        if parser.error() {
            debug!(error = ?parser.error_message(), "bad request");
            let _ = stream.write_all(&simple_response_bytes(400, "Bad Request\n"));
            return;
        }

        let Some(method) = parser.method() else {
            let _ = stream.write_all(&simple_response_bytes(400, "Bad Request\n"));
            return;
        };

        let mut req = Request::new(method, parser.target());
        req.set_version(parser.version());
        *req.headers_mut() = parser.take_headers();
        req.set_body(parser.take_body());
        req.set_remote_addr(peer);
        *req.query_mut() = parse_query_params(req.raw_target());
        let cookie_header = req.header("Cookie").map(str::to_string);
        if let Some(cookies) = cookie_header {
            *req.cookies_mut() = parse_cookie_header(&cookies);
        }

        let mut res = Response::new();
        let handled = router.dispatch(&mut req, &mut res);
        if !handled && !res.ended() {
            res.status(404u16).send("Not Found\n");
        }
        if !res.ended() {
            // Handler forgot to finalize; fix the framing for it.
            res.end();
        }

        let close = should_close(&req, &res);
        let wire = serialize_response(&req, &res, &opts.compression);
        if stream.write_all(&wire).is_err() {
            return;
        }
        trace!(status = res.status_code(), bytes = wire.len(), "response written");

        if close {
            return;
        }
        if set_timeout(&stream, opts.idle_timeout_ms).is_err() {
            return;
        }
        idle_wait = true;
    }
}

/// Keep-alive decision. The response-side `Connection` header is
/// authoritative; the request side is consulted next; the HTTP/1.1
/// default is keep-alive.
pub(crate) fn should_close(req: &Request, res: &Response) -> bool {
    if let Some(close) = connection_directive(res.headers().get("Connection")) {
        return close;
    }
    if let Some(close) = connection_directive(req.header("Connection")) {
        return close;
    }
    false
}

// Some(true) => close, Some(false) => keep-alive, None => no directive.
// Any occurrence of `close` wins within a value.
fn connection_directive(value: Option<&str>) -> Option<bool> {
    let value = value?;
    let mut verdict = None;
    for token in value.split(',') {
        let token = token.trim();
        if token.eq_ignore_ascii_case("close") {
            return Some(true);
        }
        if token.eq_ignore_ascii_case("keep-alive") {
            verdict = Some(false);
        }
    }
    verdict
}

/// Serialize a finalized response for the wire.
///
/// The serializer owns the status line, `Date`, `Server`, and
/// `Content-Length`; user headers are emitted as-is in insertion order.
/// When the application set `Content-Length` itself the body is emitted
/// verbatim with that length and compression is skipped. A HEAD response
/// carries headers for the full entity but no body bytes.
pub(crate) fn serialize_response(
    req: &Request,
    res: &Response,
    copts: &compression::Options,
) -> Vec<u8> {
    let user_content_length = res.headers().get("Content-Length").map(str::to_string);
    let mut body: Vec<u8> = res.body().to_vec();
    let mut inserted_encoding: Option<&'static str> = None;

    let content_type = res.headers().get("Content-Type").unwrap_or("");
    if copts.enable
        && !body.is_empty()
        && user_content_length.is_none()
        && res.headers().get("Content-Encoding").is_none()
        && body.len() >= copts.min_size
        && compression::is_compressible_type(content_type, copts)
    {
        let accept = req.header("Accept-Encoding").unwrap_or("");
        match compression::negotiate_accept_encoding(accept, copts) {
            Encoding::Gzip => {
                // A failed encode falls back to the uncompressed body.
                if let Ok(z) = compression::gzip_compress(&body) {
                    body = z;
                    inserted_encoding = Some("gzip");
                }
            }
            Encoding::Deflate => {
                if let Ok(z) = compression::deflate_compress(&body) {
                    body = z;
                    inserted_encoding = Some("deflate");
                }
            }
            Encoding::None => {}
        }
    }

    let status = res.status_code();
    let mut out = Vec::with_capacity(256 + body.len());
    out.extend_from_slice(
        format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status)).as_bytes(),
    );
    out.extend_from_slice(
        format!("Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now())).as_bytes(),
    );
    out.extend_from_slice(format!("Server: {SERVER_NAME}\r\n").as_bytes());

    for (name, value) in res.headers().iter() {
        // The serializer always emits its own Content-Length line below.
        if name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    if let Some(encoding) = inserted_encoding {
        out.extend_from_slice(format!("Content-Encoding: {encoding}\r\n").as_bytes());
        if res.headers().get("Vary").is_none() {
            out.extend_from_slice(b"Vary: Accept-Encoding\r\n");
        }
    }

    let content_length = user_content_length.unwrap_or_else(|| body.len().to_string());
    out.extend_from_slice(format!("Content-Length: {content_length}\r\n\r\n").as_bytes());

    if req.method() != Method::Head {
        out.extend_from_slice(&body);
    }
    out
}

fn simple_response_bytes(code: u16, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {} {}\r\nDate: {}\r\nServer: {}\r\nContent-Type: text/plain; charset=utf-8\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{}",
        code,
        reason_phrase(code),
        httpdate::fmt_http_date(SystemTime::now()),
        SERVER_NAME,
        body.len(),
        body
    )
    .into_bytes()
}
