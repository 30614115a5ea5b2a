//! Request body helpers for the common media types.

use serde_json::Value;

use crate::http::{ParamMap, Request};

/// Decode a JSON request body. Returns `None` unless the request has a
/// body, declares a `application/json` content type, and parses cleanly.
pub fn parse_json_body(req: &Request) -> Option<Value> {
    if !req.has_body() {
        return None;
    }
    let content_type = req.header("Content-Type")?;
    if !content_type
        .to_ascii_lowercase()
        .contains("application/json")
    {
        return None;
    }
    serde_json::from_slice(req.body()).ok()
}

/// Decode an `application/x-www-form-urlencoded` request body into a
/// parameter map.
pub fn parse_form_body(req: &Request) -> Option<ParamMap> {
    if !req.has_body() {
        return None;
    }
    let content_type = req.header("Content-Type")?;
    if !content_type
        .to_ascii_lowercase()
        .contains("application/x-www-form-urlencoded")
    {
        return None;
    }
    let params = url::form_urlencoded::parse(req.body())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| !k.is_empty())
        .collect();
    Some(params)
}
