//! Newline-delimited JSON over TCP. One request per line, one response per
//! line, one thread per connection.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crosslink_protocol::{ApiResponse, ErrorKind, Request};

use crate::dispatch::dispatch;
use crate::service::LinkService;

/// Upper bound on one request line. Uploads travel base64-encoded inline.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Concurrent connections; further clients are refused.
pub const MAX_CONNECTIONS: usize = 32;

/// Consecutive malformed lines before a client is dropped.
const MAX_PARSE_FAILURES: u32 = 3;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_TIMEOUT: Duration = Duration::from_millis(200);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Server {
    service: Arc<LinkService>,
    listener_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    bound_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(service: Arc<LinkService>) -> Self {
        Self {
            service,
            listener_handle: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            bound_addr: None,
        }
    }

    /// Bind and start accepting on a background thread.
    pub fn start(&mut self, listen: &str) -> std::io::Result<SocketAddr> {
        if let (true, Some(addr)) = (self.is_running(), self.bound_addr) {
            return Ok(addr);
        }
        let listener = TcpListener::bind(listen)?;
        let addr = listener.local_addr()?;
        // Non-blocking so the loop can observe the shutdown flag.
        listener.set_nonblocking(true)?;

        self.shutdown.store(false, Ordering::SeqCst);
        self.bound_addr = Some(addr);

        let shutdown = Arc::clone(&self.shutdown);
        let service = Arc::clone(&self.service);
        self.listener_handle = Some(thread::spawn(move || run_listener(listener, shutdown, service)));

        log::info!("listening on {addr}");
        Ok(addr)
    }

    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
        self.bound_addr = None;
        log::info!("server stopped");
    }

    /// Block until the listener exits.
    pub fn wait(&mut self) {
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener_handle.is_some() && !self.shutdown.load(Ordering::SeqCst)
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_listener(listener: TcpListener, shutdown: Arc<AtomicBool>, service: Arc<LinkService>) {
    let active = Arc::new(AtomicUsize::new(0));

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((mut stream, addr)) => {
                if active.load(Ordering::SeqCst) >= MAX_CONNECTIONS {
                    log::warn!("refusing {addr}: {MAX_CONNECTIONS} connections open");
                    let _ = send(
                        &mut stream,
                        &ApiResponse::error(ErrorKind::Transient, "too many connections"),
                    );
                    continue;
                }

                log::debug!("accepted {addr}");
                active.fetch_add(1, Ordering::SeqCst);
                let service = Arc::clone(&service);
                let shutdown = Arc::clone(&shutdown);
                let active = Arc::clone(&active);
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, &service, &shutdown) {
                        log::warn!("connection {addr}: {e}");
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                    log::debug!("closed {addr}");
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::error!("accept failed: {e}");
                break;
            }
        }
    }
}

fn handle_connection(stream: TcpStream, service: &LinkService, shutdown: &AtomicBool) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut buf: Vec<u8> = Vec::new();
    let mut parse_failures: u32 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        // A timed-out read keeps what it consumed in `buf`; the next read
        // appends to it.
        let at_eof = match reader.read_until(b'\n', &mut buf) {
            Ok(0) if buf.is_empty() => return Ok(()),
            Ok(_) => !buf.ends_with(b"\n"),
            Err(ref e)
                if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
            {
                if buf.len() > MAX_MESSAGE_SIZE {
                    return oversized(&mut writer, buf.len());
                }
                continue;
            }
            Err(e) => return Err(e),
        };

        if buf.len() > MAX_MESSAGE_SIZE {
            return oversized(&mut writer, buf.len());
        }

        let line = String::from_utf8_lossy(&buf).trim().to_string();
        buf.clear();
        if !line.is_empty() {
            match serde_json::from_str::<Request>(&line) {
                Ok(request) => {
                    parse_failures = 0;
                    send(&mut writer, &dispatch(service, request))?;
                }
                Err(e) => {
                    parse_failures += 1;
                    log::debug!("malformed request ({parse_failures}/{MAX_PARSE_FAILURES}): {e}");
                    send(
                        &mut writer,
                        &ApiResponse::error(ErrorKind::Validation, format!("malformed request: {e}")),
                    )?;
                    if parse_failures >= MAX_PARSE_FAILURES {
                        log::warn!("dropping client after {parse_failures} malformed requests");
                        return Ok(());
                    }
                }
            }
        }
        if at_eof {
            return Ok(());
        }
    }
}

fn oversized(writer: &mut TcpStream, len: usize) -> std::io::Result<()> {
    log::warn!("request of {len} bytes exceeds {MAX_MESSAGE_SIZE}, disconnecting");
    send(
        writer,
        &ApiResponse::error(ErrorKind::Validation, "request exceeds maximum message size"),
    )
}

fn send(stream: &mut TcpStream, response: &ApiResponse) -> std::io::Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(stream, "{json}")?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslink_recon::EngineConfig;
    use crosslink_store::MemoryStore;

    fn start() -> (Server, SocketAddr, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let service =
            LinkService::with_store(Arc::new(MemoryStore::new()), EngineConfig::default(), dir.path()).unwrap();
        let mut server = Server::new(Arc::new(service));
        let addr = server.start("127.0.0.1:0").unwrap();
        (server, addr, dir)
    }

    fn roundtrip(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, line: &str) -> ApiResponse {
        writeln!(stream, "{line}").unwrap();
        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        serde_json::from_str(&response).unwrap()
    }

    #[test]
    fn lifecycle() {
        let (mut server, _addr, _dir) = start();
        assert!(server.is_running());
        assert!(server.bound_addr().is_some());
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn one_response_per_line() {
        let (mut server, addr, _dir) = start();
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let resp = roundtrip(&mut stream, &mut reader, r#"{"id":"1","op":"field_options"}"#);
        assert_eq!(resp.id.as_deref(), Some("1"));
        assert!(resp.is_success());

        let resp = roundtrip(
            &mut stream,
            &mut reader,
            r#"{"id":"2","op":"configure_field","field_name":"email","type":"string"}"#,
        );
        assert_eq!(resp.status_code, 201);

        let resp = roundtrip(&mut stream, &mut reader, r#"{"id":"3","op":"list_fields"}"#);
        assert_eq!(resp.data.unwrap()[0]["field_name"], "email");
        server.stop();
    }

    #[test]
    fn repeated_garbage_disconnects() {
        let (mut server, addr, _dir) = start();
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        for _ in 0..MAX_PARSE_FAILURES {
            let resp = roundtrip(&mut stream, &mut reader, "garbage");
            assert_eq!(resp.status_code, 400);
        }
        let mut rest = String::new();
        assert_eq!(reader.read_line(&mut rest).unwrap(), 0);
        server.stop();
    }
}
