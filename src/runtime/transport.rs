//! Byte streams to the remote endpoint.
//!
//! Sockets are connected in blocking mode (TLS handshakes complete there
//! too), then switched to non-blocking and handed to mio. After that the
//! event loop drains reads until `WouldBlock`, and writers retry on
//! `WouldBlock` until the whole line is out.

use super::buffer::LineBuffer;
use super::error::PoolError;
use super::pool::PoolConfig;
use mio::net::TcpStream;
use socket2::SockRef;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::thread;
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "tls")]
use std::sync::Arc;

/// Bytes requested per read syscall.
const READ_CHUNK: usize = 4096;

/// Back-off while a non-blocking socket has no send buffer space.
const WRITE_STALL: Duration = Duration::from_millis(1);

/// Result of draining a readable connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReadOutcome {
    pub bytes: usize,
    /// The peer closed its side.
    pub closed: bool,
}

/// An established connection, plain or encrypted.
pub(crate) enum Transport {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream>),
}

#[cfg(feature = "tls")]
pub(crate) struct TlsStream {
    session: rustls::ClientConnection,
    sock: TcpStream,
}

impl Transport {
    /// Underlying socket, for poll registration.
    pub fn source(&mut self) -> &mut TcpStream {
        match self {
            Transport::Plain(sock) => sock,
            #[cfg(feature = "tls")]
            Transport::Tls(tls) => &mut tls.sock,
        }
    }

    /// Read everything currently available into `buffer`.
    pub fn read_available(&mut self, buffer: &mut LineBuffer) -> io::Result<ReadOutcome> {
        match self {
            Transport::Plain(sock) => drain(sock, buffer),
            #[cfg(feature = "tls")]
            Transport::Tls(tls) => tls.read_available(buffer),
        }
    }

    /// Write one complete line.
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        match self {
            Transport::Plain(sock) => write_fully(sock, line),
            #[cfg(feature = "tls")]
            Transport::Tls(tls) => {
                tls.session.writer().write_all(line)?;
                tls.flush()
            }
        }
    }
}

/// Read from `reader` until it would block or reports end of stream.
fn drain<R: Read>(reader: &mut R, buffer: &mut LineBuffer) -> io::Result<ReadOutcome> {
    let mut chunk = [0u8; READ_CHUNK];
    let mut outcome = ReadOutcome::default();

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => {
                outcome.closed = true;
                return Ok(outcome);
            }
            Ok(n) => {
                buffer.extend(&chunk[..n]);
                outcome.bytes += n;
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(outcome),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

fn write_fully<W: Write>(writer: &mut W, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match writer.write(data) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
            }
            Ok(n) => data = &data[n..],
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(WRITE_STALL),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(feature = "tls")]
impl TlsStream {
    fn read_available(&mut self, buffer: &mut LineBuffer) -> io::Result<ReadOutcome> {
        // Records decrypted during the handshake are already in the session.
        let mut outcome = self.drain_plaintext(buffer)?;

        while !outcome.closed {
            match self.session.read_tls(&mut self.sock) {
                Ok(0) => outcome.closed = true,
                Ok(_) => {
                    self.session
                        .process_new_packets()
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    let plain = self.drain_plaintext(buffer)?;
                    outcome.bytes += plain.bytes;
                    outcome.closed = plain.closed;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        // Post-handshake messages (key updates, alerts) may need sending.
        self.flush()?;
        Ok(outcome)
    }

    /// Move decrypted bytes from the session into `buffer`.
    fn drain_plaintext(&mut self, buffer: &mut LineBuffer) -> io::Result<ReadOutcome> {
        match drain(&mut self.session.reader(), buffer) {
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(ReadOutcome {
                bytes: 0,
                closed: true,
            }),
            other => other,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        while self.session.wants_write() {
            match self.session.write_tls(&mut self.sock) {
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(WRITE_STALL),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Opens connections to one endpoint.
pub(crate) struct Connector {
    addrs: Vec<SocketAddr>,
    timeout: Duration,
    #[cfg(feature = "tls")]
    tls: Option<TlsSettings>,
}

#[cfg(feature = "tls")]
struct TlsSettings {
    config: Arc<rustls::ClientConfig>,
    server_name: rustls::pki_types::ServerName<'static>,
}

impl Connector {
    /// Check encryption support and resolve the endpoint. Opens no sockets.
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        if config.tls && cfg!(not(feature = "tls")) {
            return Err(PoolError::TlsUnavailable);
        }

        #[cfg(feature = "tls")]
        let tls = if config.tls {
            Some(TlsSettings::new(&config.host)?)
        } else {
            None
        };

        let resolve_error = |source| PoolError::Resolve {
            host: config.host.clone(),
            source,
        };
        let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(resolve_error)?
            .collect();
        if addrs.is_empty() {
            return Err(resolve_error(io::Error::new(
                io::ErrorKind::NotFound,
                "no addresses found",
            )));
        }

        Ok(Self {
            addrs,
            timeout: config.connect_timeout,
            #[cfg(feature = "tls")]
            tls,
        })
    }

    /// Connect slot `index`, trying each resolved address in order.
    pub fn open(&self, index: usize) -> Result<(Transport, SocketAddr), PoolError> {
        let mut last_error = None;

        for &addr in &self.addrs {
            let attempt = std::net::TcpStream::connect_timeout(&addr, self.timeout)
                .and_then(|stream| self.establish(stream));
            match attempt {
                Ok(transport) => return Ok((transport, addr)),
                Err(e) => {
                    debug!(index, addr = %addr, error = %e, "Connect attempt failed");
                    last_error = Some((addr, e));
                }
            }
        }

        match last_error {
            Some((addr, source)) => Err(PoolError::Connect {
                index,
                addr,
                source,
            }),
            None => Err(PoolError::InvalidSettings("no addresses to connect to".into())),
        }
    }

    fn establish(&self, stream: std::net::TcpStream) -> io::Result<Transport> {
        {
            let sock = SockRef::from(&stream);
            sock.set_nodelay(true)?;
            sock.set_keepalive(true)?;
        }
        self.wrap(stream)
    }

    #[cfg(not(feature = "tls"))]
    fn wrap(&self, stream: std::net::TcpStream) -> io::Result<Transport> {
        stream.set_nonblocking(true)?;
        Ok(Transport::Plain(TcpStream::from_std(stream)))
    }

    #[cfg(feature = "tls")]
    fn wrap(&self, stream: std::net::TcpStream) -> io::Result<Transport> {
        let session = match &self.tls {
            Some(tls) => Some(tls.handshake(&stream, self.timeout)?),
            None => None,
        };
        stream.set_nonblocking(true)?;
        let sock = TcpStream::from_std(stream);

        Ok(match session {
            Some(session) => Transport::Tls(Box::new(TlsStream { session, sock })),
            None => Transport::Plain(sock),
        })
    }
}

#[cfg(feature = "tls")]
impl TlsSettings {
    fn new(host: &str) -> Result<Self, PoolError> {
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| PoolError::InvalidSettings(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| {
                PoolError::InvalidSettings(format!("invalid TLS server name '{host}': {e}"))
            })?;

        Ok(Self {
            config: Arc::new(config),
            server_name,
        })
    }

    /// Complete the handshake on a blocking socket.
    fn handshake(
        &self,
        stream: &std::net::TcpStream,
        timeout: Duration,
    ) -> io::Result<rustls::ClientConnection> {
        let mut session =
            rustls::ClientConnection::new(Arc::clone(&self.config), self.server_name.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        stream.set_read_timeout(Some(timeout))?;
        let mut sock = stream;
        while session.is_handshaking() {
            session.complete_io(&mut sock)?;
        }
        stream.set_read_timeout(None)?;

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_drain_reads_until_eof() {
        let mut reader = Cursor::new(b"PING :a\r\nPING".to_vec());
        let mut buffer = LineBuffer::new(512);

        let outcome = drain(&mut reader, &mut buffer).unwrap();
        assert_eq!(outcome, ReadOutcome { bytes: 13, closed: true });
        assert!(buffer.next_line().is_some());
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_write_fully() {
        let mut out = Vec::new();
        write_fully(&mut out, b"NICK bot\r\n").unwrap();
        assert_eq!(out, b"NICK bot\r\n");
    }

    #[test]
    fn test_unresolvable_host() {
        let config = PoolConfig {
            host: "host.invalid".into(),
            ..PoolConfig::default()
        };
        assert!(matches!(
            Connector::new(&config),
            Err(PoolError::Resolve { .. })
        ));
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn test_tls_unavailable_fails_before_resolving() {
        let config = PoolConfig {
            host: "host.invalid".into(),
            tls: true,
            ..PoolConfig::default()
        };
        assert!(matches!(
            Connector::new(&config),
            Err(PoolError::TlsUnavailable)
        ));
    }
}
