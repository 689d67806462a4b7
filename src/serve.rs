//! Development server with live reload.
//!
//! Serves the minified tree over plain HTTP/1.1 on a std `TcpListener`,
//! one thread per connection, one request per connection. Only `GET` and
//! `HEAD` are answered.
//!
//! ## Live reload
//!
//! | Path | Response |
//! |---|---|
//! | `/__livereload` | Server-Sent Events stream of [`ReloadEvent`] JSON |
//! | `/__livereload.js` | client script: CSS events swap stylesheets, others reload |
//!
//! Every HTML page served gets `<script src="/__livereload.js"></script>`
//! inserted before its last `</body>`. Stages push events through the
//! [`ReloadHub`]; each open event stream holds one subscription.
//!
//! ## Path handling
//!
//! Request paths are percent-decoded and resolved under the served root.
//! `..` segments and anything that canonicalizes outside the root get 403.
//! Directories serve their index file. Missing files get a small HTML 404.

use crate::mime;
use maud::{DOCTYPE, Markup, html};
use serde::Serialize;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const EVENTS_PATH: &str = "/__livereload";
pub const CLIENT_PATH: &str = "/__livereload.js";

const CLIENT_TAG: &str = "<script src=\"/__livereload.js\"></script>";

/// Keep-alive comment interval on idle event streams. A failed write is
/// how a closed browser tab is noticed.
const PING_INTERVAL: Duration = Duration::from_secs(15);

const CLIENT_SCRIPT: &str = r#"(function () {
  var source = new EventSource('/__livereload');
  source.onmessage = function (e) {
    var msg = JSON.parse(e.data);
    if (msg.kind === 'css') {
      var links = document.querySelectorAll('link[rel="stylesheet"]');
      for (var i = 0; i < links.length; i++) {
        var href = links[i].getAttribute('href').split('?')[0];
        links[i].setAttribute('href', href + '?v=' + Date.now());
      }
    } else {
      window.location.reload();
    }
  };
})();
"#;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadKind {
    /// Reload the page.
    Reload,
    /// Swap stylesheets in place.
    Css,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadEvent {
    pub kind: ReloadKind,
    /// Changed file, relative to the served root.
    pub path: Option<String>,
}

impl ReloadEvent {
    pub fn new(kind: ReloadKind, path: Option<String>) -> Self {
        Self { kind, path }
    }

    pub fn full(path: Option<String>) -> Self {
        Self::new(ReloadKind::Reload, path)
    }

    pub fn css(path: Option<String>) -> Self {
        Self::new(ReloadKind::Css, path)
    }

    /// The event as one SSE `data:` frame.
    pub fn sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

/// Fan-out of reload events to connected clients.
#[derive(Debug, Default)]
pub struct ReloadHub {
    subscribers: Mutex<Vec<Sender<ReloadEvent>>>,
}

impl ReloadHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ReloadEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Send to every live subscriber, dropping those that have gone away.
    /// Returns how many received the event.
    pub fn notify(&self, event: ReloadEvent) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn client_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Where a request path leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    NotFound,
    Forbidden,
}

/// Decode `%XX` escapes. `None` on malformed escapes or non-UTF-8 results.
pub fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Map a request path onto a file under `root`.
pub fn resolve_path(root: &Path, url_path: &str, index: &str) -> Resolved {
    let Some(decoded) = percent_decode(url_path) else {
        return Resolved::NotFound;
    };
    let mut candidate = root.to_path_buf();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Resolved::Forbidden,
            s if s.contains('\\') || s.contains('\0') => return Resolved::Forbidden,
            s => candidate.push(s),
        }
    }
    if candidate.is_dir() {
        candidate.push(index);
    }
    if !candidate.is_file() {
        return Resolved::NotFound;
    }
    match (candidate.canonicalize(), root.canonicalize()) {
        (Ok(file), Ok(root)) if file.starts_with(&root) => Resolved::File(file),
        (Ok(_), Ok(_)) => Resolved::Forbidden,
        _ => Resolved::NotFound,
    }
}

/// Insert the live-reload client before the last `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], CLIENT_TAG, &html[at..]),
        None => format!("{html}{CLIENT_TAG}"),
    }
}

pub fn not_found_page(path: &str) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "404 Not Found" }
            }
            body {
                h1 { "Not Found" }
                p { "Nothing is built at " code { (path) } "." }
            }
        }
    }
}

/// A bound dev server.
pub struct DevServer {
    listener: TcpListener,
    root: PathBuf,
    index: String,
    hub: Arc<ReloadHub>,
}

struct Request {
    method: String,
    path: String,
}

fn read_request(stream: &TcpStream) -> io::Result<Option<Request>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(None);
    }
    // Drain headers; none of them change the response.
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header)? == 0 || header.trim_end().is_empty() {
            break;
        }
    }
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Ok(None);
    };
    let path = target.split(['?', '#']).next().unwrap_or("/").to_string();
    Ok(Some(Request {
        method: method.to_string(),
        path,
    }))
}

fn respond(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &[u8],
    head_only: bool,
) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    if !head_only {
        stream.write_all(body)?;
    }
    stream.flush()
}

fn stream_events(mut stream: TcpStream, hub: &ReloadHub) -> io::Result<()> {
    stream.write_all(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\n\r\n",
    )?;
    let events = hub.subscribe();
    stream.write_all(b": connected\n\n")?;
    stream.flush()?;
    loop {
        match events.recv_timeout(PING_INTERVAL) {
            Ok(event) => {
                let frame = event.sse_frame().map_err(io::Error::other)?;
                stream.write_all(frame.as_bytes())?;
            }
            Err(RecvTimeoutError::Timeout) => stream.write_all(b": ping\n\n")?,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
        stream.flush()?;
    }
}

fn handle(mut stream: TcpStream, root: &Path, index: &str, hub: &ReloadHub) -> io::Result<()> {
    let Some(request) = read_request(&stream)? else {
        return Ok(());
    };
    let head_only = match request.method.as_str() {
        "GET" => false,
        "HEAD" => true,
        _ => {
            return respond(
                &mut stream,
                "405 Method Not Allowed",
                "text/plain; charset=utf-8",
                b"method not allowed\n",
                false,
            );
        }
    };

    match request.path.as_str() {
        EVENTS_PATH => return stream_events(stream, hub),
        CLIENT_PATH => {
            return respond(
                &mut stream,
                "200 OK",
                mime::content_type(Path::new(CLIENT_PATH)),
                CLIENT_SCRIPT.as_bytes(),
                head_only,
            );
        }
        _ => {}
    }

    match resolve_path(root, &request.path, index) {
        Resolved::File(path) => {
            let content_type = mime::content_type(&path);
            let body = std::fs::read(&path)?;
            if content_type.starts_with("text/html") {
                let page = inject_client(&String::from_utf8_lossy(&body));
                respond(&mut stream, "200 OK", content_type, page.as_bytes(), head_only)
            } else {
                respond(&mut stream, "200 OK", content_type, &body, head_only)
            }
        }
        Resolved::Forbidden => respond(
            &mut stream,
            "403 Forbidden",
            "text/plain; charset=utf-8",
            b"forbidden\n",
            head_only,
        ),
        Resolved::NotFound => {
            let page = not_found_page(&request.path).into_string();
            respond(
                &mut stream,
                "404 Not Found",
                "text/html; charset=utf-8",
                page.as_bytes(),
                head_only,
            )
        }
    }
}

impl DevServer {
    /// Bind to `addr` (e.g. `127.0.0.1:8000`; port 0 picks a free port).
    pub fn bind(
        addr: &str,
        root: &Path,
        index: &str,
        hub: Arc<ReloadHub>,
    ) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr).map_err(|source| ServeError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            listener,
            root: root.to_path_buf(),
            index: index.to_string(),
            hub,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever.
    pub fn run(self) -> Result<(), ServeError> {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    eprintln!("dev server: accept failed: {e}");
                    continue;
                }
            };
            let root = self.root.clone();
            let index = self.index.clone();
            let hub = Arc::clone(&self.hub);
            thread::spawn(move || {
                // Clients disconnecting mid-response are not worth reporting.
                let _ = handle(stream, &root, &index, &hub);
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("css")).unwrap();
        std::fs::create_dir_all(tmp.path().join("docs")).unwrap();
        std::fs::write(
            tmp.path().join("index.html"),
            "<html><body><p>home</p></body></html>",
        )
        .unwrap();
        std::fs::write(tmp.path().join("docs/index.html"), "<p>docs</p>").unwrap();
        std::fs::write(tmp.path().join("css/style.css"), "p{color:red}").unwrap();
        tmp
    }

    fn start(root: &Path) -> (SocketAddr, Arc<ReloadHub>) {
        let hub = Arc::new(ReloadHub::new());
        let server = DevServer::bind("127.0.0.1:0", root, "index.html", Arc::clone(&hub)).unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || server.run());
        (addr, hub)
    }

    fn request(addr: SocketAddr, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    // =========================================================================
    // Reload hub
    // =========================================================================

    #[test]
    fn hub_fans_out_and_drops_closed_subscribers() {
        let hub = ReloadHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.notify(ReloadEvent::full(None)), 2);
        assert_eq!(a.try_recv().unwrap(), ReloadEvent::full(None));
        assert_eq!(b.try_recv().unwrap(), ReloadEvent::full(None));

        drop(b);
        assert_eq!(hub.notify(ReloadEvent::css(Some("css/style.css".into()))), 1);
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn event_json_shape() {
        let frame = ReloadEvent::css(Some("css/style.css".into())).sse_frame().unwrap();
        assert_eq!(frame, "data: {\"kind\":\"css\",\"path\":\"css/style.css\"}\n\n");
        let frame = ReloadEvent::full(None).sse_frame().unwrap();
        assert_eq!(frame, "data: {\"kind\":\"reload\",\"path\":null}\n\n");
    }

    // =========================================================================
    // Path resolution and injection
    // =========================================================================

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("/a%20b.html").as_deref(), Some("/a b.html"));
        assert_eq!(percent_decode("/bad%2"), None);
        assert_eq!(percent_decode("/%2e%2e/x").as_deref(), Some("/../x"));
    }

    #[test]
    fn resolves_files_and_directory_index() {
        let tmp = site();
        let root = tmp.path().canonicalize().unwrap();
        assert_eq!(
            resolve_path(tmp.path(), "/css/style.css", "index.html"),
            Resolved::File(root.join("css/style.css"))
        );
        assert_eq!(
            resolve_path(tmp.path(), "/docs/", "index.html"),
            Resolved::File(root.join("docs/index.html"))
        );
        assert_eq!(
            resolve_path(tmp.path(), "/", "index.html"),
            Resolved::File(root.join("index.html"))
        );
        assert_eq!(resolve_path(tmp.path(), "/nope.js", "index.html"), Resolved::NotFound);
    }

    #[test]
    fn traversal_is_forbidden() {
        let tmp = site();
        assert_eq!(resolve_path(tmp.path(), "/../etc/passwd", "index.html"), Resolved::Forbidden);
        assert_eq!(
            resolve_path(tmp.path(), "/css/%2e%2e/%2e%2e/x", "index.html"),
            Resolved::Forbidden
        );
    }

    #[test]
    fn injection_before_last_body_close() {
        assert_eq!(
            inject_client("<html><BODY>x</BODY></html>"),
            format!("<html><BODY>x{CLIENT_TAG}</BODY></html>")
        );
        assert_eq!(inject_client("<p>frag</p>"), format!("<p>frag</p>{CLIENT_TAG}"));
    }

    #[test]
    fn not_found_page_escapes_path() {
        let page = not_found_page("/<script>").into_string();
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.starts_with("<!DOCTYPE html>"));
    }

    // =========================================================================
    // Over the wire
    // =========================================================================

    #[test]
    fn serves_index_with_client_injected() {
        let tmp = site();
        let (addr, _hub) = start(tmp.path());
        let response = request(addr, "GET", "/");
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("Content-Type: text/html; charset=utf-8"));
        assert!(response.contains(&format!("home</p>{CLIENT_TAG}</body>")));
    }

    #[test]
    fn serves_static_files_untouched() {
        let tmp = site();
        let (addr, _hub) = start(tmp.path());
        let response = request(addr, "GET", "/css/style.css?v=3");
        assert!(response.contains("Content-Type: text/css"));
        assert!(response.ends_with("\r\n\r\np{color:red}"));
    }

    #[test]
    fn head_has_no_body() {
        let tmp = site();
        let (addr, _hub) = start(tmp.path());
        let response = request(addr, "HEAD", "/css/style.css");
        assert!(response.contains("Content-Length: 12"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[test]
    fn missing_file_is_html_404() {
        let tmp = site();
        let (addr, _hub) = start(tmp.path());
        let response = request(addr, "GET", "/missing.html");
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
        assert!(response.contains("<h1>Not Found</h1>"));
    }

    #[test]
    fn traversal_over_the_wire_is_403() {
        let tmp = site();
        let (addr, _hub) = start(tmp.path());
        let response = request(addr, "GET", "/../../etc/passwd");
        assert!(response.starts_with("HTTP/1.1 403 Forbidden"));
    }

    #[test]
    fn other_methods_are_405() {
        let tmp = site();
        let (addr, _hub) = start(tmp.path());
        let response = request(addr, "POST", "/");
        assert!(response.starts_with("HTTP/1.1 405"));
    }

    #[test]
    fn client_script_is_served() {
        let tmp = site();
        let (addr, _hub) = start(tmp.path());
        let response = request(addr, "GET", CLIENT_PATH);
        assert!(response.contains("application/javascript"));
        assert!(response.contains("new EventSource('/__livereload')"));
    }

    #[test]
    fn event_stream_delivers_notifications() {
        let tmp = site();
        let (addr, hub) = start(tmp.path());
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "GET {EVENTS_PATH} HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut reader = BufReader::new(stream);

        let mut line = String::new();
        loop {
            line.clear();
            reader.read_line(&mut line).unwrap();
            if line.starts_with(": connected") {
                break;
            }
        }

        assert_eq!(hub.notify(ReloadEvent::full(Some("index.html".into()))), 1);
        loop {
            line.clear();
            reader.read_line(&mut line).unwrap();
            if line.starts_with("data: ") {
                break;
            }
        }
        assert_eq!(line, "data: {\"kind\":\"reload\",\"path\":\"index.html\"}\n");
    }
}
