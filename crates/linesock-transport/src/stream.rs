use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{ByteTransport, ReadCompletion, WriteCompletion, DEFAULT_READ_GRANULARITY};

type Closer = Box<dyn Fn() -> std::io::Result<()> + Send + Sync>;

struct WriteJob {
    data: Bytes,
    on_written: WriteCompletion,
}

struct ReadJob {
    max_len: usize,
    on_read: ReadCompletion,
}

/// A transport over a blocking `Read`/`Write` pair.
///
/// Each direction gets its own I/O thread that performs one blocking call
/// per request and then runs the completion on that thread. A request never
/// blocks the submitting thread.
///
/// The transport owns the connection: dropping it (or calling
/// [`shutdown`](Self::shutdown)) closes sockets created through
/// [`from_tcp`](Self::from_tcp) or [`from_unix`](Self::from_unix), which
/// unblocks an outstanding read.
pub struct StreamTransport {
    writes: mpsc::Sender<WriteJob>,
    reads: mpsc::Sender<ReadJob>,
    shut_down: Arc<AtomicBool>,
    closer: Option<Closer>,
    name: &'static str,
    read_granularity: usize,
}

impl StreamTransport {
    /// Drive an arbitrary reader/writer pair.
    ///
    /// [`shutdown`](Self::shutdown) on such a transport fails pending and
    /// future requests but cannot interrupt a read already blocked in the
    /// reader.
    pub fn new<R, W>(reader: R, writer: W) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::spawn(reader, writer, None, "stream")
    }

    /// Drive a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let reader = stream.try_clone()?;
        let closer_stream = stream.try_clone()?;
        let closer: Closer = Box::new(move || closer_stream.shutdown(Shutdown::Both));
        Self::spawn(reader, stream, Some(closer), "tcp")
    }

    /// Drive a connected Unix domain stream socket.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        let reader = stream.try_clone()?;
        let closer_stream = stream.try_clone()?;
        let closer: Closer = Box::new(move || closer_stream.shutdown(Shutdown::Both));
        Self::spawn(reader, stream, Some(closer), "unix")
    }

    /// Connect to a TCP address and drive the resulting stream.
    pub fn connect_tcp(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(addr, "connected tcp stream");
        Self::from_tcp(stream)
    }

    /// Override the preferred read size reported to callers.
    pub fn with_read_granularity(mut self, read_granularity: usize) -> Self {
        self.read_granularity = read_granularity.max(1);
        self
    }

    /// Close both directions.
    ///
    /// Requests issued afterwards complete with [`TransportError::Shutdown`].
    /// Calling this more than once is harmless.
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(transport = self.name, "shutting down stream transport");
        match &self.closer {
            Some(close) => match close() {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(TransportError::Io(err)),
            },
            None => Ok(()),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn spawn<R, W>(reader: R, writer: W, closer: Option<Closer>, name: &'static str) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let shut_down = Arc::new(AtomicBool::new(false));

        let (writes, write_jobs) = mpsc::channel();
        let flag = Arc::clone(&shut_down);
        thread::Builder::new()
            .name(format!("linesock-{name}-writer"))
            .spawn(move || write_loop(writer, write_jobs, flag))
            .map_err(TransportError::Spawn)?;

        let (reads, read_jobs) = mpsc::channel();
        let flag = Arc::clone(&shut_down);
        thread::Builder::new()
            .name(format!("linesock-{name}-reader"))
            .spawn(move || read_loop(reader, read_jobs, flag))
            .map_err(TransportError::Spawn)?;

        Ok(Self {
            writes,
            reads,
            shut_down,
            closer,
            name,
            read_granularity: DEFAULT_READ_GRANULARITY,
        })
    }
}

impl ByteTransport for StreamTransport {
    fn begin_write(&self, data: Bytes, on_written: WriteCompletion) {
        if let Err(mpsc::SendError(job)) = self.writes.send(WriteJob { data, on_written }) {
            (job.on_written)(Err(TransportError::Shutdown));
        }
    }

    fn begin_read(&self, max_len: usize, on_read: ReadCompletion) {
        if let Err(mpsc::SendError(job)) = self.reads.send(ReadJob { max_len, on_read }) {
            (job.on_read)(Err(TransportError::Shutdown));
        }
    }

    fn read_granularity(&self) -> usize {
        self.read_granularity
    }

    fn transport_name(&self) -> &'static str {
        self.name
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        if let Some(close) = &self.closer {
            if !self.shut_down.swap(true, Ordering::SeqCst) {
                let _ = close();
            }
        }
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("type", &self.name)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn write_loop<W: Write>(mut writer: W, jobs: mpsc::Receiver<WriteJob>, shut_down: Arc<AtomicBool>) {
    for job in jobs {
        if shut_down.load(Ordering::SeqCst) {
            (job.on_written)(Err(TransportError::Shutdown));
            continue;
        }

        let result = loop {
            match writer.write(&job.data) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        let result = result.and_then(|n| flush(&mut writer).map(|()| n));

        match &result {
            Ok(n) => trace!(requested = job.data.len(), written = n, "write completed"),
            Err(err) => debug!(error = %err, "write failed"),
        }
        (job.on_written)(result.map_err(TransportError::Io));
    }
}

fn flush<W: Write>(writer: &mut W) -> std::io::Result<()> {
    loop {
        match writer.flush() {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

fn read_loop<R: Read>(mut reader: R, jobs: mpsc::Receiver<ReadJob>, shut_down: Arc<AtomicBool>) {
    for job in jobs {
        if shut_down.load(Ordering::SeqCst) {
            (job.on_read)(Err(TransportError::Shutdown));
            continue;
        }

        let mut buf = BytesMut::zeroed(job.max_len.max(1));
        let result = loop {
            match reader.read(&mut buf) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        let result = match result {
            Ok(0) if shut_down.load(Ordering::SeqCst) => Err(TransportError::Shutdown),
            Ok(n) => {
                trace!(read = n, "read completed");
                buf.truncate(n);
                Ok(buf.freeze())
            }
            Err(err) => {
                debug!(error = %err, "read failed");
                Err(TransportError::Io(err))
            }
        };
        (job.on_read)(result);
    }
}
