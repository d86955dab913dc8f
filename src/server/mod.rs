//! Development server with live reload.
//!
//! A blocking HTTP/1.1 server, one thread per connection, serving the site
//! root with the same path resolution as [`SiteFetcher`](crate::sw::SiteFetcher).
//! HTML responses get a small client injected before `</body>` that opens a
//! WebSocket to `/livereload`; a background [`Watcher`] broadcasts `reload`
//! to every subscriber whenever a watched file changes.
//!
//! Only what a browser needs during development is implemented: `GET` and
//! `HEAD`, no keep-alive, no range requests, no compression.

pub mod watch;
pub mod websocket;

pub use watch::Watcher;

use crate::config::SiteConfig;
use crate::mime;
use crate::site::{self, Resolution};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use thiserror::Error;

const LIVE_RELOAD_JS: &str = include_str!("../../static/livereload.js");
const LIVE_RELOAD_PATH: &str = "/livereload";
const NOT_FOUND_HTML: &str = "<h1>404 Not Found</h1>";
const MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("could not bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Open live-reload connections.
#[derive(Debug, Clone, Default)]
pub struct Subscribers {
    streams: Arc<Mutex<Vec<TcpStream>>>,
}

impl Subscribers {
    fn lock(&self) -> MutexGuard<'_, Vec<TcpStream>> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, stream: TcpStream) {
        self.lock().push(stream);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send a text frame to everyone; connections that fail are dropped.
    /// Returns how many subscribers received it.
    pub fn broadcast(&self, message: &str) -> usize {
        let frame = websocket::text_frame(message);
        let mut streams = self.lock();
        streams.retain_mut(|s| s.write_all(&frame).and_then(|_| s.flush()).is_ok());
        streams.len()
    }
}

/// Insert the live-reload client before the first `</body>`. Documents
/// without one are returned unchanged.
pub fn inject_live_reload(html: &str) -> String {
    html.replacen(
        "</body>",
        &format!("<script>\n{LIVE_RELOAD_JS}</script>\n</body>"),
        1,
    )
}

/// Parsed request head.
#[derive(Debug)]
struct RequestHead {
    method: String,
    path: String,
    headers: HashMap<String, String>,
}

impl RequestHead {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    }
}

fn read_head(stream: &mut TcpStream) -> io::Result<Option<RequestHead>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk)?;
        if n == 0 || buf.len() + n > MAX_HEAD_BYTES {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.split("\r\n");
    let mut request_line = lines.next().unwrap_or("").split_whitespace();
    let (Some(method), Some(path)) = (request_line.next(), request_line.next()) else {
        return Ok(None);
    };
    let headers = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    Ok(Some(RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        headers,
    }))
}

fn write_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &[u8],
    include_body: bool,
    extra_headers: &[(&str, &str)],
) -> io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n",
        body.len()
    );
    for (name, value) in extra_headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())?;
    if include_body {
        stream.write_all(body)?;
    }
    stream.flush()
}

/// The dev server, bound but not yet serving.
pub struct DevServer {
    listener: TcpListener,
    root: PathBuf,
    offline_url: String,
    subscribers: Subscribers,
}

impl DevServer {
    /// Bind `127.0.0.1:<port>`. Port 0 picks a free port.
    pub fn bind(root: impl Into<PathBuf>, port: u16, offline_url: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .map_err(|source| ServerError::Bind { port, source })?;
        Ok(Self {
            listener,
            root: root.into(),
            offline_url: offline_url.to_string(),
            subscribers: Subscribers::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn subscribers(&self) -> Subscribers {
        self.subscribers.clone()
    }

    /// Start the watcher thread, then serve forever.
    pub fn run(self, config: &SiteConfig) -> Result<(), ServerError> {
        let mut watcher = Watcher::new(
            &self.root,
            &config.server.watch,
            &config.cache.store_dir,
            Duration::from_millis(config.server.poll_ms),
        );
        tracing::info!(files = watcher.watched_files(), "watching for changes");

        let subscribers = self.subscribers();
        thread::spawn(move || {
            loop {
                thread::sleep(watcher.interval());
                let changed = watcher.poll();
                if changed.is_empty() {
                    continue;
                }
                for path in &changed {
                    tracing::info!(path = %path.display(), "file changed");
                }
                let delivered = subscribers.broadcast("reload");
                tracing::debug!(clients = delivered, "reload sent");
            }
        });

        self.serve()
    }

    /// Accept connections forever, one thread each.
    pub fn serve(self) -> Result<(), ServerError> {
        let root = Arc::new(self.root);
        let offline_url = Arc::new(self.offline_url);
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let root = Arc::clone(&root);
            let offline_url = Arc::clone(&offline_url);
            let subscribers = self.subscribers.clone();
            thread::spawn(move || {
                if let Err(e) = handle_connection(stream, &root, &offline_url, &subscribers) {
                    tracing::debug!(error = %e, "connection error");
                }
            });
        }
        Ok(())
    }
}

fn handle_connection(
    mut stream: TcpStream,
    root: &Path,
    offline_url: &str,
    subscribers: &Subscribers,
) -> io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let Some(request) = read_head(&mut stream)? else {
        return Ok(());
    };
    tracing::debug!(method = %request.method, path = %request.path, "request");

    let include_body = match request.method.as_str() {
        "GET" => true,
        "HEAD" => false,
        _ => {
            return write_response(
                &mut stream,
                "405 Method Not Allowed",
                "text/plain",
                b"Method Not Allowed",
                true,
                &[("Allow", "GET, HEAD")],
            );
        }
    };

    if request.path == LIVE_RELOAD_PATH {
        return match (request.is_websocket_upgrade(), request.header("sec-websocket-key")) {
            (true, Some(key)) => {
                stream.write_all(websocket::handshake_response(key).as_bytes())?;
                stream.flush()?;
                stream.set_read_timeout(None)?;
                subscribers.add(stream);
                tracing::debug!(clients = subscribers.len(), "live reload client connected");
                Ok(())
            }
            _ => write_response(
                &mut stream,
                "426 Upgrade Required",
                "text/plain",
                b"Upgrade Required",
                include_body,
                &[("Upgrade", "websocket")],
            ),
        };
    }

    match site::resolve(root, &request.path) {
        Resolution::File(path) => match std::fs::read(&path) {
            Ok(body) => {
                let content_type = mime::content_type(&path);
                let body = if content_type == "text/html" {
                    inject_live_reload(&String::from_utf8_lossy(&body)).into_bytes()
                } else {
                    body
                };
                write_response(&mut stream, "200 OK", content_type, &body, include_body, &[])
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "read failed");
                let body = format!("Error loading file: {e}");
                write_response(
                    &mut stream,
                    "500 Internal Server Error",
                    "text/plain",
                    body.as_bytes(),
                    include_body,
                    &[],
                )
            }
        },
        Resolution::Forbidden => write_response(
            &mut stream,
            "403 Forbidden",
            "text/plain",
            b"Forbidden",
            include_body,
            &[],
        ),
        Resolution::NotFound => {
            let page = std::fs::read(root.join(offline_url.trim_start_matches('/')))
                .unwrap_or_else(|_| NOT_FOUND_HTML.as_bytes().to_vec());
            write_response(
                &mut stream,
                "404 Not Found",
                "text/html",
                &page,
                include_body,
                &[],
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // =========================================================================
    // Helpers
    // =========================================================================

    fn start(root: &Path) -> (SocketAddr, Subscribers) {
        let server = DevServer::bind(root, 0, "/offline.html").unwrap();
        let addr = server.local_addr().unwrap();
        let subscribers = server.subscribers();
        thread::spawn(move || server.serve());
        (addr, subscribers)
    }

    fn raw_request(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    fn get(addr: SocketAddr, path: &str) -> String {
        raw_request(addr, &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"))
    }

    fn site() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("index.html"),
            "<html><body><h1>home</h1></body></html>",
        )
        .unwrap();
        fs::write(tmp.path().join("resume.html"), "<body>cv</body>").unwrap();
        fs::write(tmp.path().join("style.css"), "body{}").unwrap();
        tmp
    }

    // =========================================================================
    // Pure helpers
    // =========================================================================

    #[test]
    fn injects_before_first_closing_body() {
        let html = inject_live_reload("<body>a</body>");
        assert!(html.starts_with("<body>a<script>"));
        assert!(html.ends_with("</script>\n</body>"));
        assert!(html.contains("/livereload"));
    }

    #[test]
    fn no_body_tag_unchanged() {
        assert_eq!(inject_live_reload("<p>fragment</p>"), "<p>fragment</p>");
    }

    // =========================================================================
    // Over the wire
    // =========================================================================

    #[test]
    fn root_serves_index_with_live_reload() {
        let tmp = site();
        let (addr, _) = start(tmp.path());
        let resp = get(addr, "/");
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("Content-Type: text/html\r\n"));
        assert!(resp.contains("<h1>home</h1><script>"));
    }

    #[test]
    fn css_is_not_injected() {
        let tmp = site();
        let (addr, _) = start(tmp.path());
        let resp = get(addr, "/style.css");
        assert!(resp.contains("Content-Type: text/css\r\n"));
        assert!(resp.ends_with("\r\n\r\nbody{}"));
    }

    #[test]
    fn extensionless_path_falls_back_to_html() {
        let tmp = site();
        let (addr, _) = start(tmp.path());
        assert!(get(addr, "/resume").contains("cv"));
    }

    #[test]
    fn traversal_is_forbidden() {
        let tmp = site();
        let (addr, _) = start(tmp.path());
        assert!(get(addr, "/../etc/passwd").starts_with("HTTP/1.1 403 Forbidden"));
    }

    #[test]
    fn missing_uses_offline_page_when_present() {
        let tmp = site();
        let (addr, _) = start(tmp.path());
        let resp = get(addr, "/nope.png");
        assert!(resp.starts_with("HTTP/1.1 404 Not Found"));
        assert!(resp.ends_with(NOT_FOUND_HTML));

        fs::write(tmp.path().join("offline.html"), "<h1>offline</h1>").unwrap();
        let resp = get(addr, "/nope.png");
        assert!(resp.starts_with("HTTP/1.1 404 Not Found"));
        assert!(resp.ends_with("<h1>offline</h1>"));
    }

    #[test]
    fn head_has_length_but_no_body() {
        let tmp = site();
        let (addr, _) = start(tmp.path());
        let resp = raw_request(addr, "HEAD /style.css HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert!(resp.contains("Content-Length: 6\r\n"));
        assert!(resp.ends_with("\r\n\r\n"));
    }

    #[test]
    fn post_is_rejected() {
        let tmp = site();
        let (addr, _) = start(tmp.path());
        let resp = raw_request(
            addr,
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n",
        );
        assert!(resp.starts_with("HTTP/1.1 405 Method Not Allowed"));
        assert!(resp.contains("Allow: GET, HEAD\r\n"));
    }

    #[test]
    fn livereload_without_upgrade_is_426() {
        let tmp = site();
        let (addr, _) = start(tmp.path());
        assert!(get(addr, "/livereload").starts_with("HTTP/1.1 426"));
    }

    #[test]
    fn websocket_subscriber_receives_reload() {
        let tmp = site();
        let (addr, subscribers) = start(tmp.path());

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(
                b"GET /livereload HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\
                  Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                  Sec-WebSocket-Version: 13\r\n\r\n",
            )
            .unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            client.read_exact(&mut byte).unwrap();
            head.push(byte[0]);
        }
        let head = String::from_utf8(head).unwrap();
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols"));
        assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

        // The handshake is written before the stream is registered
        for _ in 0..100 {
            if !subscribers.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(subscribers.broadcast("reload"), 1);

        let mut frame = [0u8; 8];
        client.read_exact(&mut frame).unwrap();
        assert_eq!(frame, [0x81, 6, b'r', b'e', b'l', b'o', b'a', b'd']);
    }

    #[test]
    fn dead_subscribers_are_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();

        let subscribers = Subscribers::default();
        subscribers.add(server_side);
        drop(client);

        // A write to a closed peer can succeed once before the reset arrives
        let mut remaining = 1;
        for _ in 0..50 {
            remaining = subscribers.broadcast("reload");
            if remaining == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(remaining, 0);
    }
}
