use std::fmt;
use std::str::FromStr;

/// HTTP request methods.
///
/// Declaration order is load-bearing: the 405 handler sorts the `Allow`
/// header entries by this order. `Any` is a route filter that admits every
/// method; it never appears on the wire as a request method (its canonical
/// form is `*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
    Connect,
    Trace,
    Any,
}

/// Error returned when a method token cannot be recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidMethod;

impl Method {
    /// Canonical upper-case token for this method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
            Method::Any => "*",
        }
    }
}

impl FromStr for Method {
    type Err = InvalidMethod;

    /// Case-insensitive parse of a method token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let m = match s.len() {
            1 if s == "*" => Method::Any,
            3 if s.eq_ignore_ascii_case("GET") => Method::Get,
            3 if s.eq_ignore_ascii_case("PUT") => Method::Put,
            4 if s.eq_ignore_ascii_case("POST") => Method::Post,
            4 if s.eq_ignore_ascii_case("HEAD") => Method::Head,
            5 if s.eq_ignore_ascii_case("PATCH") => Method::Patch,
            5 if s.eq_ignore_ascii_case("TRACE") => Method::Trace,
            6 if s.eq_ignore_ascii_case("DELETE") => Method::Delete,
            7 if s.eq_ignore_ascii_case("OPTIONS") => Method::Options,
            7 if s.eq_ignore_ascii_case("CONNECT") => Method::Connect,
            _ => return Err(InvalidMethod),
        };
        Ok(m)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status codes emitted by the core.
///
/// Handlers may set any numeric code on a [`Response`](crate::http::Response);
/// this enum covers the codes the library itself produces plus the common
/// success codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    PartialContent = 206,

    MovedPermanently = 301,
    Found = 302,
    SeeOther = 303,
    NotModified = 304,
    TemporaryRedirect = 307,
    PermanentRedirect = 308,

    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    RequestTimeout = 408,
    Conflict = 409,
    Gone = 410,
    PayloadTooLarge = 413,
    UriTooLong = 414,
    UnsupportedMediaType = 415,
    RangeNotSatisfiable = 416,
    TooManyRequests = 429,

    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
    GatewayTimeout = 504,
}

impl Status {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s as u16
    }
}

/// Fixed reason phrase for a status code; "Unknown" for anything outside
/// the table.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",

        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",

        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        429 => "Too Many Requests",

        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",

        _ => "Unknown",
    }
}

/// Ordered header container with case-insensitive names.
///
/// Names compare by folding ASCII `A–Z` to `a–z` only (no locale, no UTF-8
/// case folding). Insertion order is preserved for emission; `insert`
/// overwrites an existing entry in place, `append` adds another line with
/// the same name, which is how multiple `Set-Cookie` headers are
/// represented (each is emitted on its own line).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set `name` to `value`, overwriting in place. The entry keeps the
    /// position of its first occurrence; later duplicates are dropped.
    pub fn insert(&mut self, name: &str, value: &str) {
        let mut first = None;
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].0.eq_ignore_ascii_case(name) {
                if first.is_none() {
                    first = Some(i);
                    i += 1;
                } else {
                    self.entries.remove(i);
                }
            } else {
                i += 1;
            }
        }
        match first {
            Some(i) => self.entries[i].1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Add another entry under `name` without touching existing ones.
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Remove every entry stored under `name`; returns whether any existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in insertion order, as stored.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

const DEFAULT_MIME: &str = "application/octet-stream";

// Extension table lifted from the static file responder; linear scan over
// a small constant table.
const MIME_TABLE: &[(&str, &str)] = &[
    // html/css/js
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    // images
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    // fonts
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    // data
    ("json", "application/json"),
    ("txt", "text/plain; charset=utf-8"),
    ("xml", "application/xml"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    // audio/video
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
];

/// MIME type for a file extension (leading dot tolerated); defaults to
/// `application/octet-stream`.
pub fn mime_from_ext(ext: &str) -> &'static str {
    let ext = ext.strip_prefix('.').unwrap_or(ext);
    MIME_TABLE
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, m)| *m)
        .unwrap_or(DEFAULT_MIME)
}

/// Content type for a path: the extension is the text after the last `.`
/// that follows the last `/`; no extension means the default type.
pub fn content_type_for_path(path: &str) -> &'static str {
    let slash = path.rfind('/');
    match path.rfind('.') {
        None => DEFAULT_MIME,
        Some(dot) => {
            if let Some(slash) = slash {
                if dot < slash {
                    return DEFAULT_MIME;
                }
            }
            mime_from_ext(&path[dot + 1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!("get".parse::<Method>(), Ok(Method::Get));
        assert_eq!("DeLeTe".parse::<Method>(), Ok(Method::Delete));
        assert_eq!("*".parse::<Method>(), Ok(Method::Any));
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn method_emits_upper_case() {
        assert_eq!(Method::Patch.as_str(), "PATCH");
        assert_eq!(Method::Any.as_str(), "*");
    }

    #[test]
    fn method_order_matches_allow_ordering() {
        let mut methods = vec![Method::Head, Method::Get, Method::Delete];
        methods.sort();
        assert_eq!(methods, vec![Method::Get, Method::Delete, Method::Head]);
    }

    #[test]
    fn header_map_lookup_folds_ascii_case() {
        let mut h = HeaderMap::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(h.get("content_type"), None);
    }

    #[test]
    fn header_map_insert_overwrites_in_place() {
        let mut h = HeaderMap::new();
        h.insert("X-A", "1");
        h.insert("X-B", "2");
        h.insert("x-a", "3");
        let order: Vec<_> = h.iter().collect();
        assert_eq!(order, vec![("X-A", "3"), ("X-B", "2")]);
    }

    #[test]
    fn header_map_append_keeps_every_line() {
        let mut h = HeaderMap::new();
        h.append("Set-Cookie", "a=1");
        h.append("Set-Cookie", "b=2");
        let cookies: Vec<_> = h.get_all("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn mime_lookup() {
        assert_eq!(mime_from_ext("HTML"), "text/html");
        assert_eq!(mime_from_ext(".png"), "image/png");
        assert_eq!(mime_from_ext("tar"), "application/octet-stream");
    }

    #[test]
    fn content_type_for_path_uses_last_dot_after_last_slash() {
        assert_eq!(content_type_for_path("/a/b/page.html"), "text/html");
        assert_eq!(content_type_for_path("/a.b/file"), "application/octet-stream");
        assert_eq!(content_type_for_path("README"), "application/octet-stream");
        assert_eq!(content_type_for_path("archive.tar.zip"), "application/zip");
    }

    #[test]
    fn reason_phrases_are_fixed() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(405), "Method Not Allowed");
        assert_eq!(reason_phrase(416), "Range Not Satisfiable");
        assert_eq!(reason_phrase(299), "Unknown");
    }
}
