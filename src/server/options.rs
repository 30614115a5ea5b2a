use crate::compression;

/// TLS configuration consumed by the acceptor. The library does not
/// terminate TLS itself; this bundle exists so embedders can hand it to
/// their terminating layer.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub cert_file: String,
    pub key_file: String,
    pub key_password: Option<String>,
    pub dh_params_file: Option<String>,
}

/// Server tuning knobs.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Socket receive timeout while reading the start line and headers.
    pub header_timeout_ms: u64,
    /// Socket receive timeout once the parser enters the body.
    pub body_timeout_ms: u64,
    /// Socket receive timeout between requests on a kept-alive
    /// connection.
    pub idle_timeout_ms: u64,
    /// Listen backlog.
    pub backlog: i32,
    pub reuse_addr: bool,
    pub reuse_port: bool,
    /// Connection worker threads; 0 spawns a thread per connection.
    pub workers: usize,
    /// Acceptor threads looping on `accept`.
    pub acceptors: usize,
    /// Reject requests whose start line plus header block exceeds this.
    pub max_header_bytes: usize,
    /// Reject requests declaring a Content-Length above this.
    pub max_body_bytes: usize,
    pub compression: compression::Options,
    pub tls: Option<TlsConfig>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            header_timeout_ms: 15_000,
            body_timeout_ms: 60_000,
            idle_timeout_ms: 60_000,
            backlog: 256,
            reuse_addr: true,
            reuse_port: false,
            workers: 0,
            acceptors: 1,
            max_header_bytes: 64 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
            compression: compression::Options::default(),
            tls: None,
        }
    }
}
