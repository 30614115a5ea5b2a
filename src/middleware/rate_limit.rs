use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::middleware::{from_fn, Middleware};

/// Sliding-window rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    /// Window length the request count is measured over.
    pub window: Duration,
    /// Requests allowed per client key within the window.
    pub max_requests: usize,
    /// Status code for rejected requests.
    pub status_code: u16,
    /// Body for rejected requests.
    pub message: String,
    /// Header to read the client key from (e.g. `X-Forwarded-For`);
    /// empty falls back to the connection's peer address.
    pub ip_header: String,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 100,
            status_code: 429,
            message: "Too Many Requests\n".to_string(),
            ip_header: String::new(),
        }
    }
}

// Per-client timestamp queues behind one lock; middleware state is shared
// across connections and must synchronize itself.
struct LimiterState {
    opts: RateLimitOptions,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl LimiterState {
    fn check(&self, key: &str) -> bool {
        let mut hits = self.hits.lock().expect("rate limiter lock poisoned");
        let timestamps = hits.entry(key.to_string()).or_default();
        let now = Instant::now();
        if let Some(window_start) = now.checked_sub(self.opts.window) {
            while timestamps.front().is_some_and(|t| *t < window_start) {
                timestamps.pop_front();
            }
        }
        if timestamps.len() >= self.opts.max_requests {
            return false;
        }
        timestamps.push_back(now);
        true
    }
}

/// Build the rate-limiting middleware. Returns 429 (configurable) with a
/// `Retry-After` header once a client exceeds the window budget.
pub fn middleware(opts: RateLimitOptions) -> Middleware {
    let retry_after = opts.window.as_secs().to_string();
    let state = Arc::new(LimiterState {
        opts,
        hits: Mutex::new(HashMap::new()),
    });

    from_fn(move |req, res, next| {
        let key = if !state.opts.ip_header.is_empty() {
            req.header(&state.opts.ip_header).map(str::to_string)
        } else {
            None
        }
        .or_else(|| req.remote_addr().map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

        if state.check(&key) {
            next.run(req, res);
        } else {
            warn!(client = %key, "rate limit exceeded");
            res.status(state.opts.status_code)
                .set_header("Retry-After", &retry_after)
                .send(&state.opts.message);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, Request, Response};
    use crate::middleware::Next;

    fn run_once(mw: &Middleware, req: &mut Request) -> Response {
        let endpoint = |_req: &mut Request, res: &mut Response| {
            res.send("ok");
        };
        let chain = std::slice::from_ref(mw);
        let mut res = Response::new();
        Next::new(chain, &endpoint).run(req, &mut res);
        res
    }

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let mw = middleware(RateLimitOptions {
            window: Duration::from_secs(60),
            max_requests: 2,
            ip_header: "X-Real-IP".to_string(),
            ..RateLimitOptions::default()
        });
        let mut req = Request::new(Method::Get, "/");
        req.headers_mut().insert("X-Real-IP", "10.0.0.1");

        assert_eq!(run_once(&mw, &mut req).status_code(), 200);
        assert_eq!(run_once(&mw, &mut req).status_code(), 200);
        let rejected = run_once(&mw, &mut req);
        assert_eq!(rejected.status_code(), 429);
        assert_eq!(rejected.headers().get("Retry-After"), Some("60"));
        assert_eq!(rejected.body(), b"Too Many Requests\n");
    }

    #[test]
    fn distinct_clients_have_separate_windows() {
        let mw = middleware(RateLimitOptions {
            max_requests: 1,
            ip_header: "X-Real-IP".to_string(),
            ..RateLimitOptions::default()
        });
        let mut a = Request::new(Method::Get, "/");
        a.headers_mut().insert("X-Real-IP", "10.0.0.1");
        let mut b = Request::new(Method::Get, "/");
        b.headers_mut().insert("X-Real-IP", "10.0.0.2");

        assert_eq!(run_once(&mw, &mut a).status_code(), 200);
        assert_eq!(run_once(&mw, &mut b).status_code(), 200);
        assert_eq!(run_once(&mw, &mut a).status_code(), 429);
    }
}
