use std::sync::Arc;

use crate::http::{Request, Response};

/// Terminal request handler: mutates the response; the library finalizes
/// framing on emit.
pub type HandlerFn = dyn Fn(&Request, &mut Response) + Send + Sync;
pub type Handler = Arc<HandlerFn>;

/// A middleware mutates the request and/or response, then either calls
/// `next.run(req, res)` exactly once or finalizes the response and
/// returns. `Next` is consumed by value, so invoking it twice does not
/// compile.
pub type MiddlewareFn = dyn Fn(&mut Request, &mut Response, Next<'_>) + Send + Sync;
pub type Middleware = Arc<MiddlewareFn>;

/// Wrap a closure as a [`Middleware`]. The explicit bound pins down the
/// higher-ranked signature so plain closures infer cleanly.
pub fn from_fn<F>(f: F) -> Middleware
where
    F: Fn(&mut Request, &mut Response, Next<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Cursor over the remainder of a middleware chain.
///
/// The chain is a slice of middleware plus a terminal endpoint; each
/// `run` peels off the head and hands the tail to it. If the response has
/// already been ended the rest of the chain is skipped.
pub struct Next<'a> {
    chain: &'a [Middleware],
    endpoint: &'a (dyn Fn(&mut Request, &mut Response) + 'a),
}

impl<'a> Next<'a> {
    /// Build a cursor over `chain` ending in `endpoint`. Mostly used by
    /// the router; also handy for exercising middleware directly in
    /// tests.
    pub fn new(
        chain: &'a [Middleware],
        endpoint: &'a (dyn Fn(&mut Request, &mut Response) + 'a),
    ) -> Self {
        Self { chain, endpoint }
    }

    /// Advance to the next middleware, or the endpoint once the chain is
    /// exhausted. A no-op if the response has been ended.
    pub fn run(self, req: &mut Request, res: &mut Response) {
        if res.ended() {
            return;
        }
        match self.chain.split_first() {
            Some((mw, rest)) => mw(
                req,
                res,
                Next {
                    chain: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => (self.endpoint)(req, res),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[test]
    fn chain_runs_in_order_then_endpoint() {
        let chain = vec![
            from_fn(|req, res, next| {
                res.write("a");
                next.run(req, res);
            }),
            from_fn(|req, res, next| {
                res.write("b");
                next.run(req, res);
            }),
        ];
        let endpoint = |_req: &mut Request, res: &mut Response| {
            res.write("h");
        };
        let mut req = Request::new(Method::Get, "/");
        let mut res = Response::new();
        Next::new(&chain, &endpoint).run(&mut req, &mut res);
        assert_eq!(res.body(), b"abh");
    }

    #[test]
    fn short_circuit_skips_rest_of_chain() {
        let chain = vec![
            from_fn(|_req, res, _next| {
                res.status(403u16).send("denied");
            }),
            from_fn(|req, res, next| {
                res.write("unreachable");
                next.run(req, res);
            }),
        ];
        let endpoint = |_req: &mut Request, res: &mut Response| {
            res.write("unreachable");
        };
        let mut req = Request::new(Method::Get, "/");
        let mut res = Response::new();
        Next::new(&chain, &endpoint).run(&mut req, &mut res);
        assert_eq!(res.body(), b"denied");
        assert_eq!(res.status_code(), 403);
    }
}
