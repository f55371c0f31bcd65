use std::fmt;
use std::io::ErrorKind;
use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use linesock_transport::{StreamTransport, TransportError};
use tracing::{debug, info};

const UNIX_PREFIX: &str = "unix:";
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Where to connect or listen: `host:port`, or `unix:<path>` on Unix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err("unix socket path must not be empty".to_string());
            }
            #[cfg(unix)]
            return Ok(Self::Unix(PathBuf::from(path)));
            #[cfg(not(unix))]
            return Err("unix sockets are not supported on this platform".to_string());
        }
        if !s.contains(':') {
            return Err(format!("expected host:port or unix:<path>, got {s:?}"));
        }
        Ok(Self::Tcp(s.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => f.write_str(addr),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

impl Endpoint {
    pub fn connect(&self) -> Result<StreamTransport, TransportError> {
        match self {
            Self::Tcp(addr) => StreamTransport::connect_tcp(addr),
            #[cfg(unix)]
            Self::Unix(path) => {
                let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
                    addr: self.to_string(),
                    source,
                })?;
                debug!(path = %path.display(), "connected unix stream");
                StreamTransport::from_unix(stream)
            }
        }
    }

    pub fn bind(&self) -> Result<Listener, TransportError> {
        let bind_error = |source| TransportError::Bind {
            addr: self.to_string(),
            source,
        };
        // Non-blocking so `accept_while` can notice Ctrl-C between clients.
        let listener = match self {
            Self::Tcp(addr) => {
                let listener = TcpListener::bind(addr).map_err(bind_error)?;
                listener.set_nonblocking(true)?;
                Listener::Tcp(listener)
            }
            #[cfg(unix)]
            Self::Unix(path) => {
                remove_stale_socket(path);
                let listener = UnixListener::bind(path).map_err(bind_error)?;
                listener.set_nonblocking(true)?;
                Listener::Unix(listener, path.clone())
            }
        };
        info!(addr = %listener.local_addr(), "listening");
        Ok(listener)
    }
}

pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

impl Listener {
    /// Wait for a client while `running` stays set.
    ///
    /// Returns the client's transport and a label, or `None` once `running`
    /// is cleared.
    pub fn accept_while(
        &self,
        running: &AtomicBool,
    ) -> Result<Option<(StreamTransport, String)>, TransportError> {
        while running.load(Ordering::SeqCst) {
            if let Some(client) = self.try_accept()? {
                return Ok(Some(client));
            }
            thread::sleep(ACCEPT_POLL);
        }
        debug!("accept interrupted");
        Ok(None)
    }

    fn try_accept(&self) -> Result<Option<(StreamTransport, String)>, TransportError> {
        match self {
            Self::Tcp(listener) => {
                let Some((stream, peer)) = pending(listener.accept())? else {
                    return Ok(None);
                };
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                Ok(Some((StreamTransport::from_tcp(stream)?, peer.to_string())))
            }
            #[cfg(unix)]
            Self::Unix(listener, path) => {
                let Some((stream, _)) = pending(listener.accept())? else {
                    return Ok(None);
                };
                stream.set_nonblocking(false)?;
                let peer = format!("{UNIX_PREFIX}{}", path.display());
                Ok(Some((StreamTransport::from_unix(stream)?, peer)))
            }
        }
    }

    pub fn local_addr(&self) -> String {
        match self {
            Self::Tcp(listener) => listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:?".to_string()),
            #[cfg(unix)]
            Self::Unix(_, path) => format!("{UNIX_PREFIX}{}", path.display()),
        }
    }
}

// No client yet is not an error on a non-blocking listener.
fn pending<T>(accepted: std::io::Result<T>) -> Result<Option<T>, TransportError> {
    match accepted {
        Ok(accepted) => Ok(Some(accepted)),
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(None),
        Err(err) => Err(TransportError::Accept(err)),
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Self::Unix(_, path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

// A socket file left behind by a previous run makes bind fail. Only socket
// files are removed; anything else at the path is left for bind to report.
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) {
    use std::os::unix::fs::FileTypeExt;

    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if meta.file_type().is_socket() {
            debug!(path = %path.display(), "removing stale socket file");
            let _ = std::fs::remove_file(path);
        }
    }
}
