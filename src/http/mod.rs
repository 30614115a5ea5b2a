//! Core HTTP types: methods, statuses, headers, MIME detection, the
//! incremental request parser, and the request/response values.

mod parser;
mod request;
mod response;
mod types;

pub use parser::{HttpParser, ParseError, ParseState};
pub use request::{parse_cookie_header, parse_query_params, ParamMap, Request};
pub use response::Response;
pub use types::{content_type_for_path, mime_from_ext, reason_phrase, HeaderMap, Method, Status};
