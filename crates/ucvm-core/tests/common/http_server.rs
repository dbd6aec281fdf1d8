//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one static body to every GET. Can answer with an error status, and
//! can trickle the body out in small delayed chunks to keep a transfer
//! running long enough to cancel it.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Status line code and reason, e.g. (404, "Not Found").
    pub status: (u16, &'static str),
    /// Body bytes written per chunk.
    pub chunk_size: usize,
    /// Pause after each chunk.
    pub chunk_delay: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            status: (200, "OK"),
            chunk_size: 64 * 1024,
            chunk_delay: Duration::ZERO,
        }
    }
}

impl ServerOptions {
    pub fn status(code: u16, reason: &'static str) -> Self {
        Self {
            status: (code, reason),
            ..Self::default()
        }
    }

    /// Body dribbled out `chunk_size` bytes at a time with `delay` between chunks.
    pub fn slow(chunk_size: usize, delay: Duration) -> Self {
        Self {
            chunk_size,
            chunk_delay: delay,
            ..Self::default()
        }
    }
}

/// Handle to a running server. The server thread lives until the process exits.
pub struct TestServer {
    pub base_url: String,
    requests: Arc<AtomicUsize>,
}

impl TestServer {
    /// URL for `path` on this server (`path` without leading slash).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET requests received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Serve `body` with status 200.
pub fn start(body: Vec<u8>) -> TestServer {
    start_with_options(body, ServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let counter = Arc::clone(&counter);
            thread::spawn(move || handle(stream, &body, opts, &counter));
        }
    });
    TestServer {
        base_url: format!("http://127.0.0.1:{}/", port),
        requests,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: ServerOptions, counter: &AtomicUsize) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let method = request.split_whitespace().next().unwrap_or("");
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(
            b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }
    counter.fetch_add(1, Ordering::SeqCst);

    let (code, reason) = opts.status;
    let payload: &[u8] = if (200..300).contains(&code) {
        body
    } else {
        reason.as_bytes()
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        code,
        reason,
        payload.len()
    );
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for chunk in payload.chunks(opts.chunk_size.max(1)) {
        if stream.write_all(chunk).is_err() || stream.flush().is_err() {
            // Client went away (e.g. cancelled transfer).
            return;
        }
        if !opts.chunk_delay.is_zero() {
            thread::sleep(opts.chunk_delay);
        }
    }
}
