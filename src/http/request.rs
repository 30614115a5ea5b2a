use std::collections::HashMap;
use std::net::SocketAddr;

use super::types::{HeaderMap, Method};

/// Key/value map for query parameters, path parameters, and cookies.
pub type ParamMap = HashMap<String, String>;

/// An incoming HTTP request.
///
/// Populated by the connection handler from the parser's output; immutable
/// once dispatch begins except for `params`, which the router fills on a
/// successful match, and `query`/`cookies`, which helpers fill.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    target: String,
    version: String,
    headers: HeaderMap,
    query: ParamMap,
    params: ParamMap,
    cookies: ParamMap,
    body: Vec<u8>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Build a request from a method and a raw target. The path is the
    /// portion of the target before the first `?`.
    pub fn new(method: Method, target: &str) -> Self {
        let path = match target.find('?') {
            Some(q) => target[..q].to_string(),
            None => target.to_string(),
        };
        Self {
            method,
            path,
            target: target.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: HeaderMap::new(),
            query: ParamMap::new(),
            params: ParamMap::new(),
            cookies: ParamMap::new(),
            body: Vec::new(),
            remote_addr: None,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Decoded path (the target up to the first `?`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw request-target including any query string.
    pub fn raw_target(&self) -> &str {
        &self.target
    }

    /// Version token, e.g. `HTTP/1.1`.
    pub fn http_version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn query(&self) -> &ParamMap {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut ParamMap {
        &mut self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Path parameters bound by the router from `:name` and `*name`
    /// pattern segments.
    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamMap {
        &mut self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &ParamMap {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut ParamMap {
        &mut self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Peer address of the connection this request arrived on.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub(crate) fn set_version(&mut self, version: &str) {
        self.version = version.to_string();
    }

    pub(crate) fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    pub(crate) fn set_remote_addr(&mut self, addr: Option<SocketAddr>) {
        self.remote_addr = addr;
    }
}

/// Decode the query portion of a raw target (everything after the first
/// `?`) into a parameter map. Later duplicates overwrite earlier ones.
pub fn parse_query_params(target: &str) -> ParamMap {
    match target.find('?') {
        Some(pos) => url::form_urlencoded::parse(target[pos + 1..].as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        None => ParamMap::new(),
    }
}

/// Parse a `Cookie` request header (`name=value; name2=value2`) into a
/// map. Values wrapped in double quotes are unwrapped; pairs without `=`
/// are skipped.
pub fn parse_cookie_header(header: &str) -> ParamMap {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            let mut value = parts.next()?.trim();
            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
