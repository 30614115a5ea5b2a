//! Middleware chain types and the bundled middleware: CORS, rate
//! limiting, and request logging.

mod core;
pub mod cors;
pub mod logging;
pub mod rate_limit;

pub use self::core::{from_fn, Handler, HandlerFn, Middleware, MiddlewareFn, Next};
