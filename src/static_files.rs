//! Static file responder: safe filesystem mapping under a mount prefix,
//! caching headers, conditional GET, and single byte-range support.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::debug;

use crate::http::{content_type_for_path, Method, Request, Response, Status};
use crate::middleware::{from_fn, Middleware, Next};

/// Static file serving configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Filesystem root files are served from.
    pub root: String,
    /// URL prefix this responder owns.
    pub mount: String,
    /// Call `next` instead of answering 404/405 when a request cannot be
    /// served.
    pub fallthrough: bool,
    /// Serve an index file when a directory is requested.
    pub auto_index: bool,
    /// Candidate index file names, tried in order.
    pub index_names: Vec<String>,
    /// Render a minimal HTML listing for directories without an index.
    pub directory_listing: bool,
    /// Serve dotfiles and dot-directories.
    pub allow_hidden: bool,
    /// Emit a weak `ETag`.
    pub etag: bool,
    /// Emit `Last-Modified`.
    pub last_modified: bool,
    /// `Cache-Control: public, max-age={n}` when positive.
    pub cache_max_age: u32,
    /// Append `, immutable` to `Cache-Control`.
    pub immutable: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            root: String::new(),
            mount: "/".to_string(),
            fallthrough: true,
            auto_index: true,
            index_names: vec!["index.html".to_string(), "index.htm".to_string()],
            directory_listing: false,
            allow_hidden: false,
            etag: true,
            last_modified: true,
            cache_max_age: 0,
            immutable: false,
        }
    }
}

/// Build a static-file middleware serving `root` with default options.
pub fn serve_dir(root: &str) -> Middleware {
    serve(Options {
        root: root.to_string(),
        ..Options::default()
    })
}

/// Build a static-file middleware from full options.
pub fn serve(mut opts: Options) -> Middleware {
    opts.mount = normalize_mount(&opts.mount);
    // Canonicalize the sandbox root up front; if the root does not exist
    // every request will fall through or 404 against it.
    let root = fs::canonicalize(&opts.root).unwrap_or_else(|_| PathBuf::from(&opts.root));

    from_fn(move |req, res, next| handle(&opts, &root, req, res, next))
}

fn handle(
    opts: &Options,
    root: &Path,
    req: &mut Request,
    res: &mut Response,
    next: Next<'_>,
) {
    if req.method() != Method::Get && req.method() != Method::Head {
        if opts.fallthrough {
            next.run(req, res);
        } else {
            res.status(Status::MethodNotAllowed)
                .set_header("Allow", "GET, HEAD")
                .send("Method Not Allowed\n");
        }
        return;
    }

    let path = if req.path().is_empty() { "/" } else { req.path() };
    if !path.starts_with(opts.mount.as_str()) {
        next.run(req, res);
        return;
    }

    let sub = path[opts.mount.len()..].trim_start_matches('/');
    let full = match safe_join(root, sub, opts.allow_hidden) {
        Some(p) => p,
        None => {
            debug!(path = %path, "rejected unsafe static path");
            miss(opts, req, res, next);
            return;
        }
    };

    let meta = match fs::metadata(&full) {
        Ok(m) => m,
        Err(_) => {
            miss(opts, req, res, next);
            return;
        }
    };

    let (full, meta) = if meta.is_dir() {
        match resolve_dir(opts, &full, path, res) {
            DirOutcome::File(f, m) => (f, m),
            DirOutcome::Responded => return,
            DirOutcome::Miss => {
                miss(opts, req, res, next);
                return;
            }
        }
    } else {
        (full, meta)
    };

    serve_file(opts, &full, &meta, req, res, next);
}

enum DirOutcome {
    File(PathBuf, fs::Metadata),
    Responded,
    Miss,
}

fn resolve_dir(opts: &Options, dir: &Path, url_path: &str, res: &mut Response) -> DirOutcome {
    if opts.auto_index {
        for name in &opts.index_names {
            let candidate = dir.join(name);
            if let Ok(meta) = fs::metadata(&candidate) {
                if meta.is_file() {
                    return DirOutcome::File(candidate, meta);
                }
            }
        }
    }
    if !opts.directory_listing {
        return DirOutcome::Miss;
    }
    let html = list_directory_html(dir, url_path);
    res.set_content_type("text/html; charset=utf-8");
    apply_cache_control(opts, res);
    res.send(html);
    DirOutcome::Responded
}

fn serve_file(
    opts: &Options,
    full: &Path,
    meta: &fs::Metadata,
    req: &mut Request,
    res: &mut Response,
    next: Next<'_>,
) {
    let size = meta.len();
    let mtime_secs = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    res.set_content_type(content_type_for_path(&full.to_string_lossy()));
    apply_cache_control(opts, res);
    if opts.last_modified {
        let when = UNIX_EPOCH + std::time::Duration::from_secs(mtime_secs);
        res.set_header("Last-Modified", &httpdate::fmt_http_date(when));
    }
    let etag = opts.etag.then(|| format!("W/\"{size}-{mtime_secs}\""));
    if let Some(tag) = &etag {
        res.set_header("ETag", tag);
    }

    // Conditional GET: If-None-Match wins over If-Modified-Since.
    if let Some(tag) = &etag {
        if req.header("If-None-Match") == Some(tag.as_str()) {
            res.status(Status::NotModified)
                .set_header("Content-Length", "0");
            res.end();
            return;
        }
    }
    if opts.last_modified {
        if let Some(since) = req.header("If-Modified-Since") {
            if let Ok(since) = httpdate::parse_http_date(since) {
                let since_secs = since
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                if mtime_secs <= since_secs {
                    res.status(Status::NotModified)
                        .set_header("Content-Length", "0");
                    res.end();
                    return;
                }
            }
        }
    }

    let mut start = 0u64;
    let mut end = size.saturating_sub(1);
    let mut ranged = false;
    if let Some(range) = req.header("Range") {
        match parse_single_range(range, size) {
            Some((s, e)) => {
                start = s;
                end = e;
                ranged = true;
            }
            None => {
                res.status(Status::RangeNotSatisfiable)
                    .set_header("Content-Range", &format!("bytes */{size}"))
                    .set_header("Content-Length", "0");
                res.end();
                return;
            }
        }
    }

    let content_len = if size == 0 { 0 } else { end - start + 1 };
    if ranged {
        res.status(Status::PartialContent)
            .set_header("Content-Range", &format!("bytes {start}-{end}/{size}"));
    }

    if req.method() == Method::Head {
        res.set_header("Content-Length", &content_len.to_string());
        res.end();
        return;
    }

    let mut data = Vec::new();
    if content_len > 0 {
        if read_file_range(full, start, content_len, &mut data).is_err() {
            if opts.fallthrough {
                next.run(req, res);
            } else {
                res.status(Status::InternalServerError)
                    .send("Failed to read file\n");
            }
            return;
        }
    }
    res.send(data);
}

fn miss(opts: &Options, req: &mut Request, res: &mut Response, next: Next<'_>) {
    if opts.fallthrough {
        next.run(req, res);
    } else {
        res.status(Status::NotFound).send("Not Found\n");
    }
}

fn apply_cache_control(opts: &Options, res: &mut Response) {
    if opts.cache_max_age > 0 {
        let mut value = format!("public, max-age={}", opts.cache_max_age);
        if opts.immutable {
            value.push_str(", immutable");
        }
        res.set_header("Cache-Control", &value);
    }
}

fn normalize_mount(mount: &str) -> String {
    if mount.is_empty() {
        return "/".to_string();
    }
    let mut m = mount.to_string();
    if !m.starts_with('/') {
        m.insert(0, '/');
    }
    while m.len() > 1 && m.ends_with('/') {
        m.pop();
    }
    m
}

// Join the URL sub-path onto the root, rejecting dot segments, hidden
// components (unless allowed), and anything that resolves outside the
// canonicalized root.
fn safe_join(root: &Path, sub: &str, allow_hidden: bool) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    for part in sub.split('/').filter(|p| !p.is_empty()) {
        if part == "." || part == ".." {
            return None;
        }
        if !allow_hidden && part.starts_with('.') {
            return None;
        }
        // Windows-style separators inside a component would smuggle
        // traversal past the split above.
        if part.contains('\\') {
            return None;
        }
        joined.push(part);
    }
    let resolved = fs::canonicalize(&joined).ok()?;
    resolved.starts_with(root).then_some(resolved)
}

fn parse_single_range(header: &str, size: u64) -> Option<(u64, u64)> {
    let (unit, spec) = header.split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return None;
    }
    if spec.contains(',') {
        return None;
    }
    let spec = spec.trim();
    let (a, b) = spec.split_once('-')?;

    if a.is_empty() {
        // Suffix form: last n bytes.
        let n: u64 = b.parse().ok()?;
        if n == 0 || size == 0 {
            return None;
        }
        let start = size.saturating_sub(n);
        return Some((start, size - 1));
    }

    let start: u64 = a.parse().ok()?;
    if start >= size {
        return None;
    }
    let end = if b.is_empty() {
        size - 1
    } else {
        let e: u64 = b.parse().ok()?;
        if e < start {
            return None;
        }
        e.min(size - 1)
    };
    Some((start, end))
}

fn read_file_range(path: &Path, start: u64, len: u64, out: &mut Vec<u8>) -> std::io::Result<()> {
    let mut file = fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    file.take(len).read_to_end(out)?;
    Ok(())
}

fn list_directory_html(dir: &Path, url_path: &str) -> String {
    let mut names: Vec<(String, bool)> = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            names.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
        }
    }
    names.sort();

    let mut html = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Index of {url_path}</title></head><body><h1>Index of {url_path}</h1><ul>"
    );
    for (name, is_dir) in names {
        let suffix = if is_dir { "/" } else { "" };
        html.push_str(&format!(
            "<li><a href=\"{name}{suffix}\">{name}{suffix}</a></li>"
        ));
    }
    html.push_str("</ul></body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_normalization() {
        assert_eq!(normalize_mount(""), "/");
        assert_eq!(normalize_mount("static"), "/static");
        assert_eq!(normalize_mount("/static/"), "/static");
        assert_eq!(normalize_mount("/"), "/");
    }

    #[test]
    fn range_forms() {
        // bytes=a-b
        assert_eq!(parse_single_range("bytes=0-4", 10), Some((0, 4)));
        // open end
        assert_eq!(parse_single_range("bytes=3-", 10), Some((3, 9)));
        // suffix
        assert_eq!(parse_single_range("bytes=-5", 10), Some((5, 9)));
        // suffix longer than the file clamps to the whole file
        assert_eq!(parse_single_range("bytes=-50", 10), Some((0, 9)));
        // end clamped to size
        assert_eq!(parse_single_range("bytes=2-99", 10), Some((2, 9)));
    }

    #[test]
    fn range_rejections() {
        assert_eq!(parse_single_range("bytes=10-", 10), None);
        assert_eq!(parse_single_range("bytes=5-3", 10), None);
        assert_eq!(parse_single_range("bytes=-0", 10), None);
        assert_eq!(parse_single_range("bytes=0-1,3-4", 10), None);
        assert_eq!(parse_single_range("items=0-4", 10), None);
        assert_eq!(parse_single_range("bytes=x-4", 10), None);
        assert_eq!(parse_single_range("bytes=-5", 0), None);
    }
}
