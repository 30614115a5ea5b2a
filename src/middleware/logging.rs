use std::time::Instant;

use tracing::info;

use crate::middleware::{from_fn, Middleware};

/// Request logger: records method, target, version, final status, and
/// latency once the rest of the chain has finished.
pub fn middleware() -> Middleware {
    from_fn(|req, res, next| {
        let start = Instant::now();
        let method = req.method();
        let target = req.raw_target().to_string();
        let version = req.http_version().to_string();

        next.run(req, res);

        info!(
            method = %method,
            target = %target,
            version = %version,
            status = res.status_code(),
            latency_ms = start.elapsed().as_millis() as u64,
            "request complete"
        );
    })
}
