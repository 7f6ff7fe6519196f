//! Minimal in-process HTTP origin for exercising the transport and
//! downloader without external network access
//!
//! Serves canned routes over a local listener, understands `If-None-Match`
//! conditional requests, and records per-path hit counts plus the maximum
//! number of simultaneously active requests (used to assert the concurrency
//! ceiling).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// A canned response for one path
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    pub etag: Option<String>,
    /// Overrides `etag` in HEAD responses only, letting tests simulate an
    /// origin whose advertised etag moves between the probe and the fetch
    pub head_etag: Option<String>,
    pub delay: Option<Duration>,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            status: 200,
            body: Vec::new(),
            etag: None,
            head_etag: None,
            delay: None,
        }
    }
}

#[derive(Default)]
struct OriginState {
    routes: Mutex<HashMap<String, Route>>,
    hits: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// In-process HTTP origin bound to an ephemeral local port
pub struct MockOrigin {
    addr: SocketAddr,
    state: Arc<OriginState>,
}

impl MockOrigin {
    /// Bind a listener and start serving installed routes
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(OriginState::default());

        let serve_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let conn_state = Arc::clone(&serve_state);
                tokio::spawn(handle_connection(stream, conn_state));
            }
        });

        Self { addr, state }
    }

    /// Base URL of the origin, e.g. `http://127.0.0.1:PORT`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Begin installing a route for the given absolute path
    pub fn route(&self, path: &str) -> RouteBuilder<'_> {
        RouteBuilder {
            origin: self,
            path: path.to_string(),
            route: Route::default(),
        }
    }

    /// Number of requests (any method) seen for a path
    pub async fn hits(&self, path: &str) -> usize {
        self.state.hits.lock().await.get(path).copied().unwrap_or(0)
    }

    /// Highest number of simultaneously active requests observed
    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    async fn install_route(&self, path: String, route: Route) {
        self.state.routes.lock().await.insert(path, route);
    }
}

/// Builder for a canned route
pub struct RouteBuilder<'a> {
    origin: &'a MockOrigin,
    path: String,
    route: Route,
}

impl RouteBuilder<'_> {
    pub fn status(mut self, status: u16) -> Self {
        self.route.status = status;
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.route.body = body;
        self
    }

    pub fn etag(mut self, etag: &str) -> Self {
        self.route.etag = Some(etag.to_string());
        self
    }

    pub fn head_etag(mut self, etag: &str) -> Self {
        self.route.head_etag = Some(etag.to_string());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.route.delay = Some(delay);
        self
    }

    pub async fn install(self) {
        self.origin.install_route(self.path, self.route).await;
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<OriginState>) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };

    {
        let mut hits = state.hits.lock().await;
        *hits.entry(request.path.clone()).or_insert(0) += 1;
    }

    let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_active.fetch_max(active, Ordering::SeqCst);

    let route = state.routes.lock().await.get(&request.path).cloned();
    let response = match route {
        Some(route) => {
            if let Some(delay) = route.delay {
                tokio::time::sleep(delay).await;
            }
            render_response(&request, &route)
        }
        None => render_response(&request, &Route {
            status: 404,
            body: b"no such route".to_vec(),
            ..Default::default()
        }),
    };

    let _ = stream.write_all(&response).await;
    let _ = stream.flush().await;
    state.active.fetch_sub(1, Ordering::SeqCst);
}

struct ParsedRequest {
    method: String,
    path: String,
    if_none_match: Option<String>,
}

async fn read_request(stream: &mut TcpStream) -> Option<ParsedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut if_none_match = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("if-none-match") {
                if_none_match = Some(value.trim().to_string());
            }
        }
    }

    Some(ParsedRequest {
        method,
        path,
        if_none_match,
    })
}

fn render_response(request: &ParsedRequest, route: &Route) -> Vec<u8> {
    let is_head = request.method == "HEAD";
    let cache_valid = !is_head
        && route.status < 400
        && route.etag.is_some()
        && request.if_none_match.as_deref() == route.etag.as_deref();

    let (status, body): (u16, &[u8]) = if cache_valid {
        (304, b"")
    } else {
        (route.status, &route.body)
    };

    let response_etag = if is_head {
        route.head_etag.as_ref().or(route.etag.as_ref())
    } else {
        route.etag.as_ref()
    };

    let mut response = format!("HTTP/1.1 {} Mock\r\n", status);
    response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    response.push_str("Connection: close\r\n");
    if let Some(etag) = response_etag {
        response.push_str(&format!("ETag: {}\r\n", etag));
    }
    response.push_str("\r\n");

    let mut bytes = response.into_bytes();
    if request.method != "HEAD" && status != 304 {
        bytes.extend_from_slice(body);
    }
    bytes
}
