//! URL routing: pattern compilation, path matching with parameter
//! binding, and middleware chain dispatch.

use std::cell::Cell;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::http::{Method, Request, Response};
use crate::middleware::{Handler, Middleware, Next};

/// Path/param scratch entries kept inline; route patterns rarely carry
/// more parameters than this.
pub const MAX_INLINE_PARAMS: usize = 8;

type ParamScratch = SmallVec<[(String, String); MAX_INLINE_PARAMS]>;

/// One compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, compared case-insensitively.
    Static(String),
    /// `:name` — binds exactly one path segment.
    Param(String),
    /// `*name` — binds the `/`-joined remainder, possibly empty. Always
    /// the last segment; anything after it is discarded at compile time.
    Wildcard(String),
}

/// A registered route: method filter, compiled pattern, handler, and
/// per-route middleware. The segment list is immutable after
/// compilation.
#[derive(Clone)]
pub struct Route {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    handler: Handler,
    middlewares: Vec<Middleware>,
}

impl Route {
    /// Attach middleware that runs only for this route, after any group
    /// middleware and before the handler.
    pub fn wrap(&mut self, mw: Middleware) -> &mut Self {
        self.middlewares.push(mw);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

#[derive(Clone)]
struct GroupEntry {
    prefix: String,
    middlewares: Vec<Middleware>,
}

/// Ordered route table with global middleware and named groups.
///
/// Routes are tried in registration order; the first whose method filter
/// admits the request and whose segments match the path wins. The router
/// is read-only after startup, so concurrent dispatch from multiple
/// threads needs no synchronization.
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
    global: Vec<Middleware>,
    groups: Vec<GroupEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. The returned reference allows chaining
    /// [`Route::wrap`] for per-route middleware.
    pub fn add_route<F>(&mut self, method: Method, pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        let segments = compile_pattern(pattern);
        debug!(method = %method, pattern = pattern, segments = segments.len(), "route registered");
        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            segments,
            handler: Arc::new(handler),
            middlewares: Vec::new(),
        });
        self.routes.last_mut().expect("route just pushed")
    }

    /// Register a global middleware; it runs before route matching for
    /// every request.
    pub fn wrap(&mut self, mw: Middleware) -> &mut Self {
        self.global.push(mw);
        self
    }

    /// Open a route group under `prefix`. Routes added through the group
    /// get the concatenated pattern; group middleware applies at dispatch
    /// time, so middleware registered after the routes still takes
    /// effect.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        self.groups.push(GroupEntry {
            prefix: prefix.to_string(),
            middlewares: Vec::new(),
        });
        let index = self.groups.len() - 1;
        RouteGroup {
            router: self,
            index,
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Run the global middleware chain with route matching as the
    /// terminal stage. Returns `true` when the request was handled (a
    /// route ran, a 405 was emitted, or middleware ended the response);
    /// `false` means nothing matched and the caller should emit 404.
    pub fn dispatch(&self, req: &mut Request, res: &mut Response) -> bool {
        let handled = Cell::new(false);
        let endpoint = |req: &mut Request, res: &mut Response| {
            handled.set(self.dispatch_terminal(req, res));
        };
        Next::new(&self.global, &endpoint).run(req, res);
        handled.get() || res.ended()
    }

    // Terminal stage: first path-and-method match wins; a path-only match
    // set produces 405 with an Allow header; no path match returns false.
    fn dispatch_terminal(&self, req: &mut Request, res: &mut Response) -> bool {
        let path = req.path().to_string();
        let mut scratch = ParamScratch::new();
        let mut allowed: Vec<Method> = Vec::new();

        for route in &self.routes {
            scratch.clear();
            if !match_and_bind(&path, &route.segments, &mut scratch) {
                continue;
            }
            if route.method != Method::Any && route.method != req.method() {
                allowed.push(route.method);
                continue;
            }

            // Commit the trial bindings only now that the match won.
            *req.params_mut() = scratch.drain(..).collect();
            debug!(
                method = %req.method(),
                path = %path,
                pattern = %route.pattern,
                "route matched"
            );

            let mut chain: Vec<Middleware> = Vec::new();
            for group in &self.groups {
                if route.pattern.starts_with(&group.prefix) {
                    chain.extend(group.middlewares.iter().cloned());
                }
            }
            chain.extend(route.middlewares.iter().cloned());

            let handler = route.handler.clone();
            let endpoint = move |req: &mut Request, res: &mut Response| {
                (handler)(&*req, res);
            };
            Next::new(&chain, &endpoint).run(req, res);
            return true;
        }

        if !allowed.is_empty() {
            allowed.sort();
            allowed.dedup();
            if allowed.contains(&Method::Get) && !allowed.contains(&Method::Head) {
                allowed.push(Method::Head);
                allowed.sort();
            }
            let allow = allowed
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            debug!(method = %req.method(), path = %path, allow = %allow, "method not allowed");
            res.status(405u16).set_header("Allow", &allow);
            res.send("Method Not Allowed\n");
            return true;
        }

        warn!(method = %req.method(), path = %path, "no route matched");
        false
    }
}

/// Handle for adding routes and middleware under a shared prefix.
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    index: usize,
}

impl RouteGroup<'_> {
    /// Register a route with the group's prefix prepended (a trailing
    /// slash on the prefix collapses against a leading slash on the
    /// sub-pattern).
    pub fn add_route<F>(&mut self, method: Method, pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        let mut full = self.router.groups[self.index].prefix.clone();
        if full.ends_with('/') && pattern.starts_with('/') {
            full.pop();
        }
        full.push_str(pattern);
        self.router.add_route(method, &full, handler)
    }

    /// Attach middleware to every route whose pattern falls under this
    /// group's prefix, including routes registered earlier.
    pub fn wrap(&mut self, mw: Middleware) -> &mut Self {
        self.router.groups[self.index].middlewares.push(mw);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.router.groups[self.index].prefix
    }
}

/// Compile a pattern into segments. Empty segments are discarded, so `/`
/// and the empty string compile to an empty list, which matches only the
/// root path.
pub fn compile_pattern(pattern: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in pattern.split('/').filter(|p| !p.is_empty()) {
        if let Some(name) = part.strip_prefix('*') {
            segments.push(Segment::Wildcard(name.to_string()));
            // A wildcard eats the rest of the path; later pattern
            // segments are unreachable.
            break;
        } else if let Some(name) = part.strip_prefix(':') {
            segments.push(Segment::Param(name.to_string()));
        } else {
            segments.push(Segment::Static(part.to_string()));
        }
    }
    segments
}

/// Match `path` against compiled segments, binding parameters into
/// `params`. The caller commits the bindings only on success.
fn match_and_bind(path: &str, segments: &[Segment], params: &mut ParamScratch) -> bool {
    if segments.is_empty() {
        return path == "/" || path.is_empty();
    }

    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    let mut i = 0; // index into parts
    let mut j = 0; // index into segments
    while i < parts.len() && j < segments.len() {
        match &segments[j] {
            Segment::Static(text) => {
                if !parts[i].eq_ignore_ascii_case(text) {
                    return false;
                }
                i += 1;
                j += 1;
            }
            Segment::Param(name) => {
                params.push((name.clone(), parts[i].to_string()));
                i += 1;
                j += 1;
            }
            Segment::Wildcard(name) => {
                params.push((name.clone(), parts[i..].join("/")));
                i = parts.len();
                j += 1;
            }
        }
    }

    // A single trailing wildcard may match zero remaining segments.
    if j < segments.len() {
        match &segments[j] {
            Segment::Wildcard(name) if j + 1 == segments.len() => {
                params.push((name.clone(), String::new()));
                j += 1;
            }
            _ => return false,
        }
    }

    i == parts.len() && j == segments.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_match(path: &str, pattern: &str) -> Option<Vec<(String, String)>> {
        let segs = compile_pattern(pattern);
        let mut params = ParamScratch::new();
        match_and_bind(path, &segs, &mut params).then(|| params.into_vec())
    }

    #[test]
    fn compile_segments() {
        assert_eq!(compile_pattern("/"), vec![]);
        assert_eq!(compile_pattern(""), vec![]);
        assert_eq!(
            compile_pattern("/a/:b/*rest"),
            vec![
                Segment::Static("a".into()),
                Segment::Param("b".into()),
                Segment::Wildcard("rest".into()),
            ]
        );
        // Segments after a wildcard are discarded.
        assert_eq!(
            compile_pattern("/files/*path/ignored"),
            vec![
                Segment::Static("files".into()),
                Segment::Wildcard("path".into()),
            ]
        );
    }

    #[test]
    fn root_pattern_matches_only_root() {
        assert!(try_match("/", "/").is_some());
        assert!(try_match("", "/").is_some());
        assert!(try_match("/x", "/").is_none());
    }

    #[test]
    fn static_match_is_case_insensitive() {
        assert!(try_match("/API/Users", "/api/users").is_some());
        assert!(try_match("/api/userz", "/api/users").is_none());
    }

    #[test]
    fn param_and_wildcard_binding() {
        let params = try_match("/a/x/y/z", "/a/:b/*rest").unwrap();
        assert_eq!(
            params,
            vec![("b".to_string(), "x".to_string()), ("rest".to_string(), "y/z".to_string())]
        );
    }

    #[test]
    fn wildcard_matches_empty_remainder() {
        let params = try_match("/files", "/files/*path").unwrap();
        assert_eq!(params, vec![("path".to_string(), String::new())]);
    }

    #[test]
    fn shorter_path_than_pattern_fails() {
        assert!(try_match("/a", "/a/:b").is_none());
        assert!(try_match("/a/b/c", "/a/:b").is_none());
    }
}
