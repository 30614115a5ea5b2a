use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{error, info, warn};

use crate::http::{Method, Request, Response};
use crate::middleware::Middleware;
use crate::router::{Route, RouteGroup, Router};
use crate::server::conn::handle_connection;
use crate::server::options::ServerOptions;

/// Callback invoked with transport-level error descriptions.
pub type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Embeddable HTTP/1.1 server.
///
/// Register handlers and middleware, then call [`run`](Self::run); the
/// acceptor threads hand each connection to a worker that drives its own
/// blocking request loop. The route table is cloned into the workers at
/// startup and is read-only from then on.
pub struct Server {
    options: ServerOptions,
    router: Router,
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    acceptor_handles: Vec<JoinHandle<()>>,
    worker_pool: Option<WorkerPool>,
    on_error: Option<ErrorHandler>,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            router: Router::new(),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            acceptor_handles: Vec::new(),
            worker_pool: None,
            on_error: None,
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Register a global middleware.
    pub fn wrap(&mut self, mw: Middleware) -> &mut Self {
        self.router.wrap(mw);
        self
    }

    /// Register a route; chain [`Route::wrap`] on the return value for
    /// per-route middleware.
    pub fn add_route<F>(&mut self, method: Method, pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.router.add_route(method, pattern, handler)
    }

    /// Open a route group under `prefix`.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        self.router.group(prefix)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Install a callback for transport-level errors (accept failures and
    /// the like). Errors are also logged.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Bound address once running; useful when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind and start accepting. Returns `false` if socket setup fails
    /// (or the server is already running); the acceptors run on
    /// background threads.
    pub fn run(&mut self, ip: &str, port: u16) -> bool {
        if self.running.load(Ordering::SeqCst) {
            self.report_error("run called while already running");
            return false;
        }

        let addr: SocketAddr = match format!("{ip}:{port}").parse() {
            Ok(a) => a,
            Err(e) => {
                self.report_error(&format!("invalid listen address {ip}:{port}: {e}"));
                return false;
            }
        };

        let listener = match build_listener(addr, &self.options) {
            Ok(l) => l,
            Err(e) => {
                self.report_error(&format!("socket setup failed for {addr}: {e}"));
                return false;
            }
        };
        self.local_addr = listener.local_addr().ok();

        if self.options.tls.is_some() {
            // TLS termination is the embedder's concern; the bundle is
            // passed through untouched.
            warn!("tls configured; termination must be provided by the embedding layer");
        }

        self.running.store(true, Ordering::SeqCst);
        let router = Arc::new(self.router.clone());
        let opts = Arc::new(self.options.clone());

        if self.options.workers > 0 {
            self.worker_pool = Some(WorkerPool::start(
                self.options.workers,
                router.clone(),
                opts.clone(),
            ));
        }

        let acceptors = self.options.acceptors.max(1);
        for id in 0..acceptors {
            let listener = match listener.try_clone() {
                Ok(l) => l,
                Err(e) => {
                    self.report_error(&format!("acceptor clone failed: {e}"));
                    continue;
                }
            };
            let running = self.running.clone();
            let router = router.clone();
            let opts = opts.clone();
            let pool_tx = self.worker_pool.as_ref().map(|p| p.sender());
            let on_error = self.on_error.clone();

            let handle = std::thread::Builder::new()
                .name(format!("microserve-acceptor-{id}"))
                .spawn(move || {
                    accept_loop(listener, running, router, opts, pool_tx, on_error);
                });
            match handle {
                Ok(h) => self.acceptor_handles.push(h),
                Err(e) => self.report_error(&format!("failed to spawn acceptor: {e}")),
            }
        }

        if self.acceptor_handles.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            return false;
        }

        info!(addr = %self.local_addr.map(|a| a.to_string()).unwrap_or_default(),
              acceptors = acceptors,
              workers = self.options.workers,
              "server started");
        true
    }

    /// Stop accepting and join the acceptor and pool threads. In-flight
    /// connections finish on their own, bounded by the next timeout.
    /// Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        // Poke the listener so blocked accept calls wake up and observe
        // the stopped flag. The wake connections may land unevenly across
        // acceptors, so keep poking until each thread has exited.
        if let Some(addr) = self.local_addr {
            for handle in self.acceptor_handles.drain(..) {
                while !handle.is_finished() {
                    let _ = TcpStream::connect(addr);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                let _ = handle.join();
            }
        } else {
            for handle in self.acceptor_handles.drain(..) {
                let _ = handle.join();
            }
        }
        if let Some(pool) = self.worker_pool.take() {
            pool.shutdown();
        }
        info!("server stopped");
    }

    fn report_error(&self, message: &str) {
        error!("{message}");
        if let Some(cb) = &self.on_error {
            cb(message);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    running: Arc<AtomicBool>,
    router: Arc<Router>,
    opts: Arc<ServerOptions>,
    pool_tx: Option<mpsc::Sender<TcpStream>>,
    on_error: Option<ErrorHandler>,
) {
    loop {
        match listener.accept() {
            Ok((stream, _peer)) => {
                if !running.load(Ordering::SeqCst) {
                    // Wake-up connection from stop(); drop it and exit.
                    break;
                }
                match &pool_tx {
                    Some(tx) => {
                        if tx.send(stream).is_err() {
                            break;
                        }
                    }
                    None => {
                        let router = router.clone();
                        let opts = opts.clone();
                        let spawned = std::thread::Builder::new()
                            .name("microserve-conn".to_string())
                            .spawn(move || handle_connection(stream, router, opts));
                        if let Err(e) = spawned {
                            error!(error = %e, "failed to spawn connection thread");
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                error!(error = %e, "accept failed");
                if let Some(cb) = &on_error {
                    cb(&format!("accept failed: {e}"));
                }
            }
        }
    }
}

// Bounded fan-out: N worker threads drain a shared connection queue.
struct WorkerPool {
    tx: mpsc::Sender<TcpStream>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn start(workers: usize, router: Arc<Router>, opts: Arc<ServerOptions>) -> Self {
        let (tx, rx) = mpsc::channel::<TcpStream>();
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let rx = rx.clone();
            let router = router.clone();
            let opts = opts.clone();
            let handle = std::thread::Builder::new()
                .name(format!("microserve-worker-{id}"))
                .spawn(move || loop {
                    let stream = {
                        let guard = rx.lock().expect("worker queue lock poisoned");
                        guard.recv()
                    };
                    match stream {
                        Ok(s) => handle_connection(s, router.clone(), opts.clone()),
                        Err(_) => break,
                    }
                });
            if let Ok(h) = handle {
                handles.push(h);
            }
        }
        Self { tx, handles }
    }

    fn sender(&self) -> mpsc::Sender<TcpStream> {
        self.tx.clone()
    }

    fn shutdown(self) {
        drop(self.tx);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn build_listener(addr: SocketAddr, opts: &ServerOptions) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if opts.reuse_addr {
        socket.set_reuse_address(true)?;
    }
    #[cfg(unix)]
    if opts.reuse_port {
        socket.set_reuse_port(true)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(opts.backlog)?;
    Ok(socket.into())
}
