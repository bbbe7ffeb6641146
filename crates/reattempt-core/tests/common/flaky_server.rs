//! Minimal HTTP/1.1 server that answers each connection from a script.
//!
//! Connection N gets the N-th scripted status; once the script runs out every
//! connection gets `200 OK` with the configured body.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

pub struct FlakyServer {
    pub addr: String,
    served: Arc<AtomicUsize>,
}

impl FlakyServer {
    /// Number of connections answered so far.
    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. Runs until the process exits.
pub fn start(script: Vec<u16>, body: &'static str) -> FlakyServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().unwrap().to_string();
    let served = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&served);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let status = script.get(index).copied().unwrap_or(200);
            handle(stream, status, body);
        }
    });
    FlakyServer { addr, served }
}

/// Address with nothing listening on it.
pub fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().unwrap().to_string()
}

fn handle(mut stream: std::net::TcpStream, status: u16, body: &str) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 1024];
    if !matches!(stream.read(&mut buf), Ok(n) if n > 0) {
        return;
    }
    let body = if status == 200 { body } else { "" };
    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}
