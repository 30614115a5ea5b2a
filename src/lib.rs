//! microserve — an embeddable HTTP/1.1 server library.
//!
//! Register handlers against URL patterns, interpose middleware, and call
//! [`Server::run`]. The library owns wire-level HTTP/1.1 parsing, routing
//! with path parameters and wildcards, middleware chaining, response
//! serialization with negotiated gzip/deflate compression, connection
//! lifecycle (keep-alive and per-phase timeouts), a CORS helper, and a
//! static-file responder with conditional and range request support.
//!
//! # Quick start
//!
//! ```no_run
//! use microserve::{Method, Server, ServerOptions};
//!
//! let mut server = Server::new(ServerOptions::default());
//! server.add_route(Method::Get, "/hello/:name", |req, res| {
//!     let name = req.param("name").unwrap_or("world");
//!     res.send(format!("hi {name}"));
//! });
//! server.wrap(microserve::middleware::logging::middleware());
//! if !server.run("127.0.0.1", 8080) {
//!     eprintln!("failed to bind");
//! }
//! ```

pub mod body;
pub mod compression;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;
pub mod static_files;

pub use http::{
    content_type_for_path, mime_from_ext, reason_phrase, HeaderMap, HttpParser, Method, ParamMap,
    ParseError, ParseState, Request, Response, Status,
};
pub use middleware::{from_fn, Handler, Middleware, Next};
pub use router::{Route, RouteGroup, Router, Segment};
pub use server::{Server, ServerOptions, TlsConfig};
