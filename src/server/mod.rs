//! Server surface: options, the acceptor, and the per-connection
//! request loop.

mod conn;
mod core;
mod options;

pub use self::core::{ErrorHandler, Server};
pub use self::options::{ServerOptions, TlsConfig};
