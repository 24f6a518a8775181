//! ---
//! blinker_section: "03-transport"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Transport implementations for the auxiliary receive task."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{Transport, TransportError};

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const STOP_POLL: Duration = Duration::from_millis(20);
const RECV_BUFFER: usize = 4096;

/// Callback receiving each chunk read from the socket.
pub type ReceiveHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Debug, Clone)]
struct Endpoint {
    host: String,
    port: u16,
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
}

/// Shared between the transport handle and its receive thread.
struct Link {
    stop: AtomicBool,
    stream: Mutex<Option<TcpStream>>,
    bytes_received: AtomicU64,
    handler: ReceiveHandler,
}

/// TCP client whose receive thread connects to the configured endpoint and
/// forwards every received chunk to a [`ReceiveHandler`].
pub struct TcpClientTransport {
    endpoint: Mutex<Option<Endpoint>>,
    link: Arc<Link>,
    worker: Mutex<Option<Worker>>,
}

impl TcpClientTransport {
    pub fn new(handler: ReceiveHandler) -> Self {
        Self {
            endpoint: Mutex::new(None),
            link: Arc::new(Link {
                stop: AtomicBool::new(false),
                stream: Mutex::new(None),
                bytes_received: AtomicU64::new(0),
                handler,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Transport whose received bytes are only counted.
    pub fn discarding() -> Self {
        Self::new(Arc::new(|_: &[u8]| {}))
    }

    pub fn bytes_received(&self) -> u64 {
        self.link.bytes_received.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.link.stream.lock().is_some()
    }

    /// Write `payload` on the current connection.
    pub fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.link.stream.lock();
        let stream = guard.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(payload)?;
        Ok(())
    }
}

impl Transport for TcpClientTransport {
    fn configure(&self, host: &str, port: u16) -> Result<(), TransportError> {
        if host.is_empty() || port == 0 {
            return Err(TransportError::InvalidEndpoint {
                host: host.to_owned(),
                port,
            });
        }
        info!(host, port, "transport configured");
        *self.endpoint.lock() = Some(Endpoint {
            host: host.to_owned(),
            port,
        });
        Ok(())
    }

    fn start_receive_task(
        &self,
        name: &str,
        reconnect: bool,
        priority: u32,
        stack_size: usize,
    ) -> Result<(), TransportError> {
        let endpoint = self
            .endpoint
            .lock()
            .clone()
            .ok_or(TransportError::NotConfigured)?;
        let mut worker = self.worker.lock();
        if let Some(existing) = worker.as_ref() {
            return Err(TransportError::AlreadyRunning(existing.name.clone()));
        }

        self.link.stop.store(false, Ordering::SeqCst);
        let link = Arc::clone(&self.link);
        let mut builder = thread::Builder::new().name(name.to_owned());
        if stack_size > 0 {
            builder = builder.stack_size(stack_size);
        }
        let handle = builder
            .spawn(move || receive_loop(link, endpoint, reconnect))
            .map_err(|source| TransportError::Spawn {
                name: name.to_owned(),
                source,
            })?;
        info!(task = name, reconnect, priority, stack_size, "receive task started");
        *worker = Some(Worker {
            name: name.to_owned(),
            handle,
        });
        Ok(())
    }

    fn stop_receive_task(&self) {
        self.link.stop.store(true, Ordering::SeqCst);
        if let Some(stream) = self.link.stream.lock().as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        debug!("receive task stop requested");
    }

    fn join_receive_task(&self, timeout: Duration) -> Result<(), TransportError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        let deadline = Instant::now() + timeout;
        while !worker.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(task = %worker.name, "receive task join timed out");
                return Err(TransportError::JoinTimeout {
                    name: worker.name,
                    timeout,
                });
            }
            thread::sleep(STOP_POLL);
        }
        worker
            .handle
            .join()
            .map_err(|_| TransportError::Panicked {
                name: worker.name.clone(),
            })?;
        info!(task = %worker.name, "receive task joined");
        Ok(())
    }
}

fn resolve(endpoint: &Endpoint) -> std::io::Result<SocketAddr> {
    (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "endpoint resolved to no address"))
}

fn connect(endpoint: &Endpoint) -> std::io::Result<TcpStream> {
    let addr = resolve(endpoint)?;
    let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    Ok(stream)
}

/// Sleep in short slices so a stop request is not held up by the full delay.
fn pause(link: &Link, delay: Duration) {
    let deadline = Instant::now() + delay;
    while !link.stop.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(STOP_POLL);
    }
}

fn receive_loop(link: Arc<Link>, endpoint: Endpoint, reconnect: bool) {
    let mut buffer = vec![0u8; RECV_BUFFER];
    while !link.stop.load(Ordering::SeqCst) {
        let mut stream = match connect(&endpoint) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(host = %endpoint.host, port = endpoint.port, error = %err, "transport connect failed");
                if !reconnect {
                    break;
                }
                pause(&link, RECONNECT_DELAY);
                continue;
            }
        };
        match stream.try_clone() {
            Ok(shared) => *link.stream.lock() = Some(shared),
            Err(err) => warn!(error = %err, "unable to share transport stream"),
        }
        info!(host = %endpoint.host, port = endpoint.port, "transport connected");

        while !link.stop.load(Ordering::SeqCst) {
            match stream.read(&mut buffer) {
                Ok(0) => {
                    info!("transport peer closed connection");
                    break;
                }
                Ok(len) => {
                    link.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
                    (link.handler)(&buffer[..len]);
                }
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(error = %err, "transport read failed");
                    break;
                }
            }
        }
        link.stream.lock().take();

        if !reconnect {
            break;
        }
        pause(&link, RECONNECT_DELAY);
    }
    debug!("receive loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn channel_handler() -> (ReceiveHandler, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        let handler: ReceiveHandler = Arc::new(move |bytes: &[u8]| {
            let _ = tx.lock().send(bytes.to_vec());
        });
        (handler, rx)
    }

    #[test]
    fn start_requires_configuration() {
        let transport = TcpClientTransport::discarding();
        let err = transport
            .start_receive_task("ReceiveTask", true, 100, 0)
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConfigured));
        assert!(transport.join_receive_task(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn rejects_disabled_endpoint() {
        let transport = TcpClientTransport::discarding();
        assert!(matches!(
            transport.configure("10.0.0.5", 0),
            Err(TransportError::InvalidEndpoint { port: 0, .. })
        ));
        assert!(transport.configure("", 50000).is_err());
    }

    #[test]
    fn receives_bytes_and_stops_promptly() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (handler, rx) = channel_handler();
        let transport = TcpClientTransport::new(handler);
        transport.configure("127.0.0.1", port).unwrap();
        transport
            .start_receive_task("ReceiveTask", true, 100, 64 * 1024)
            .unwrap();

        let (mut peer, _) = listener.accept().unwrap();
        peer.write_all(b"blink").unwrap();
        let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received, b"blink");
        assert_eq!(transport.bytes_received(), 5);

        assert!(matches!(
            transport.start_receive_task("ReceiveTask", true, 100, 0),
            Err(TransportError::AlreadyRunning(_))
        ));

        transport.stop_receive_task();
        transport.join_receive_task(Duration::from_secs(2)).unwrap();
        assert!(!transport.is_connected());
    }

    #[test]
    fn send_writes_to_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let transport = TcpClientTransport::discarding();
        assert!(matches!(transport.send(b"x"), Err(TransportError::NotConnected)));
        transport.configure("127.0.0.1", port).unwrap();
        transport
            .start_receive_task("ReceiveTask", false, 100, 0)
            .unwrap();

        let (mut peer, _) = listener.accept().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !transport.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        transport.send(b"ping").unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        transport.stop_receive_task();
        transport.join_receive_task(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn without_reconnect_a_refused_connection_ends_the_task() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = TcpClientTransport::discarding();
        transport.configure("127.0.0.1", port).unwrap();
        transport
            .start_receive_task("ReceiveTask", false, 100, 0)
            .unwrap();
        transport.join_receive_task(Duration::from_secs(5)).unwrap();
    }
}
