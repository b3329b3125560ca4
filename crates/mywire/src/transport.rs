//! Blocking byte stream underneath the packet channel.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use mywire_core::{Error, Result};

/// A connected stream, TCP or unix domain socket.
///
/// Addresses containing a path separator dial a unix socket; anything
/// else is treated as `host:port`.
#[derive(Debug)]
pub enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    /// Dial `addr`, waiting at most `connect_timeout` when given.
    pub fn connect(addr: &str, connect_timeout: Option<Duration>) -> Result<Self> {
        if addr.contains('/') {
            return Self::connect_unix(addr);
        }

        let stream = match connect_timeout {
            Some(timeout) => {
                use std::net::ToSocketAddrs;
                let mut last_err = None;
                let addrs = addr.to_socket_addrs().map_err(Error::Io)?;
                let mut connected = None;
                for sock_addr in addrs {
                    match TcpStream::connect_timeout(&sock_addr, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                match connected {
                    Some(stream) => stream,
                    None => {
                        return Err(Error::Io(last_err.unwrap_or_else(|| {
                            io::Error::new(
                                io::ErrorKind::InvalidInput,
                                format!("address {addr} did not resolve"),
                            )
                        })));
                    }
                }
            }
            None => TcpStream::connect(addr).map_err(Error::Io)?,
        };
        stream.set_nodelay(true).map_err(Error::Io)?;
        Ok(Self::Tcp(stream))
    }

    #[cfg(unix)]
    fn connect_unix(path: &str) -> Result<Self> {
        Ok(Self::Unix(UnixStream::connect(path).map_err(Error::Io)?))
    }

    #[cfg(not(unix))]
    fn connect_unix(path: &str) -> Result<Self> {
        Err(Error::Io(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unix socket {path} not supported on this platform"),
        )))
    }

    /// Set the read deadline for subsequent reads. `None` blocks forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match self {
            Self::Tcp(s) => s.set_read_timeout(timeout).map_err(Error::Io),
            #[cfg(unix)]
            Self::Unix(s) => s.set_read_timeout(timeout).map_err(Error::Io),
        }
    }

    /// Set the write deadline for subsequent writes.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match self {
            Self::Tcp(s) => s.set_write_timeout(timeout).map_err(Error::Io),
            #[cfg(unix)]
            Self::Unix(s) => s.set_write_timeout(timeout).map_err(Error::Io),
        }
    }

    /// Shut down both directions. Errors are ignored: the peer may have
    /// closed first.
    pub fn shutdown(&self) {
        match self {
            Self::Tcp(s) => {
                let _ = s.shutdown(std::net::Shutdown::Both);
            }
            #[cfg(unix)]
            Self::Unix(s) => {
                let _ = s.shutdown(std::net::Shutdown::Both);
            }
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Self::Unix(s) => s.flush(),
        }
    }
}
