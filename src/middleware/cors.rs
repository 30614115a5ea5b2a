use tracing::debug;

use crate::http::{HeaderMap, Method, Request};
use crate::middleware::{from_fn, Middleware};

/// CORS policy configuration.
#[derive(Debug, Clone)]
pub struct CorsOptions {
    /// Value for `Access-Control-Allow-Origin`; `*` allows every origin.
    pub allow_origin: String,
    /// Reflect the request's `Origin` header instead of a fixed value
    /// (adds `Vary: Origin`).
    pub reflect_origin: bool,
    /// Value for `Access-Control-Allow-Methods`; empty echoes the
    /// preflight's requested method.
    pub allow_methods: String,
    /// Value for `Access-Control-Allow-Headers`; empty echoes the
    /// preflight's requested headers.
    pub allow_headers: String,
    /// Value for `Access-Control-Expose-Headers` on actual requests.
    pub expose_headers: String,
    /// Emit `Access-Control-Allow-Credentials: true`. Browsers reject a
    /// wildcard origin with credentials; combine with `reflect_origin`.
    pub allow_credentials: bool,
    /// Value for `Access-Control-Max-Age`; 0 omits the header.
    pub max_age_seconds: u32,
    /// Answer Chrome Private Network Access preflights.
    pub allow_private_network: bool,
    /// Pass preflights on to the chain instead of ending them with 204.
    pub preflight_continue: bool,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            reflect_origin: false,
            allow_methods: "GET,POST,PUT,PATCH,DELETE,OPTIONS,HEAD".to_string(),
            allow_headers: String::new(),
            expose_headers: String::new(),
            allow_credentials: false,
            max_age_seconds: 600,
            allow_private_network: false,
            preflight_continue: false,
        }
    }
}

/// Append a token to the `Vary` header unless it is already present
/// (token comparison is case-insensitive).
pub(crate) fn append_vary(headers: &mut HeaderMap, token: &str) {
    match headers.get("Vary") {
        None => headers.insert("Vary", token),
        Some(current) => {
            let present = current
                .split(',')
                .any(|t| t.trim().eq_ignore_ascii_case(token));
            if !present {
                let merged = format!("{current}, {token}");
                headers.insert("Vary", &merged);
            }
        }
    }
}

fn is_preflight(req: &Request) -> bool {
    req.method() == Method::Options && req.header("Access-Control-Request-Method").is_some()
}

// Effective allow-origin value for a request origin, plus whether the
// response must vary on Origin. `None` means no CORS headers are set and
// the browser will reject the cross-origin read.
fn origin_allowed(request_origin: &str, opts: &CorsOptions) -> Option<(String, bool)> {
    if request_origin.is_empty() {
        return None;
    }
    if opts.allow_origin == "*" {
        if !opts.allow_credentials {
            return Some(("*".to_string(), false));
        }
        // Credentialed requests cannot use the wildcard; reflect if
        // configured, otherwise emit nothing.
        if opts.reflect_origin {
            return Some((request_origin.to_string(), true));
        }
        return None;
    }
    if opts.reflect_origin {
        return Some((request_origin.to_string(), true));
    }
    Some((opts.allow_origin.clone(), false))
}

/// Build the CORS middleware. Non-CORS requests (no `Origin` header) pass
/// straight through.
pub fn middleware(opts: CorsOptions) -> Middleware {
    from_fn(move |req, res, next| {
        let origin = match req.header("Origin") {
            Some(o) if !o.is_empty() => o.to_string(),
            _ => {
                next.run(req, res);
                return;
            }
        };

        let allowed = origin_allowed(&origin, &opts);
        if let Some((value, vary_origin)) = &allowed {
            res.set_header("Access-Control-Allow-Origin", value);
            if opts.allow_credentials {
                res.set_header("Access-Control-Allow-Credentials", "true");
            }
            if *vary_origin {
                append_vary(res.headers_mut(), "Origin");
            }
        } else {
            debug!(origin = %origin, "origin not allowed; no CORS headers set");
        }

        if is_preflight(req) {
            let requested_method = req
                .header("Access-Control-Request-Method")
                .unwrap_or_default()
                .to_string();
            if !opts.allow_methods.is_empty() {
                res.set_header("Access-Control-Allow-Methods", &opts.allow_methods);
            } else if !requested_method.is_empty() {
                res.set_header("Access-Control-Allow-Methods", &requested_method);
            }

            let requested_headers = req
                .header("Access-Control-Request-Headers")
                .unwrap_or_default()
                .to_string();
            if !opts.allow_headers.is_empty() {
                res.set_header("Access-Control-Allow-Headers", &opts.allow_headers);
            } else if !requested_headers.is_empty() {
                // Echoing the requested headers means the response varies
                // on that header.
                res.set_header("Access-Control-Allow-Headers", &requested_headers);
                append_vary(res.headers_mut(), "Access-Control-Request-Headers");
            }

            if opts.allow_private_network
                && req
                    .header("Access-Control-Request-Private-Network")
                    .is_some()
            {
                res.set_header("Access-Control-Allow-Private-Network", "true");
            }

            if opts.max_age_seconds > 0 {
                res.set_header("Access-Control-Max-Age", &opts.max_age_seconds.to_string());
            }

            if allowed.is_none() {
                if !opts.preflight_continue {
                    res.status(204u16).set_header("Content-Length", "0");
                    res.end();
                    return;
                }
                next.run(req, res);
                return;
            }

            if !opts.preflight_continue {
                res.status(204u16)
                    .set_header("Content-Length", "0")
                    .set_content_type("text/plain; charset=utf-8");
                res.end();
                return;
            }

            next.run(req, res);
            return;
        }

        // Actual (non-preflight) request.
        if !opts.expose_headers.is_empty() {
            res.set_header("Access-Control-Expose-Headers", &opts.expose_headers);
        }
        next.run(req, res);
    })
}
