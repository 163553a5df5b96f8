//! Byte transports a connection runs over.
//!
//! A [`Link`] knows how to open a device endpoint and hand back independent
//! read and write halves. The listener thread owns the reader; requests go
//! through the writer. Reads block for at most the configured timeout and
//! report it as [`io::ErrorKind::TimedOut`] or [`io::ErrorKind::WouldBlock`].

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use hcom_protocol::{encode_frame, FrameCodec, FrameEvent, Packet};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::debug;

/// Read half of an open link.
pub type LinkReader = Box<dyn Read + Send>;

/// Write half of an open link.
pub type LinkWriter = Box<dyn Write + Send>;

/// Both halves of an open link.
pub struct LinkHalves {
    /// Read half, owned by the listener.
    pub reader: LinkReader,
    /// Write half, shared by request senders.
    pub writer: LinkWriter,
}

/// A reopenable device endpoint.
pub trait Link: Send + Sync + fmt::Debug {
    /// Open the endpoint. Called again after the device asks for a reconnect
    /// or the transport drops.
    fn open(&self) -> io::Result<LinkHalves>;

    /// Human-readable endpoint name for logs.
    fn name(&self) -> String;
}

/// Whether a read error only means no data arrived yet.
pub(crate) fn is_read_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ============================================================================
// Serial
// ============================================================================

/// A serial port at 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialLink {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialLink {
    /// Describe a serial port. Nothing is opened until [`Link::open`].
    pub fn new(port_name: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        SerialLink {
            port_name: port_name.into(),
            baud_rate,
            read_timeout,
        }
    }
}

impl Link for SerialLink {
    fn open(&self) -> io::Result<LinkHalves> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.read_timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()
            .map_err(io::Error::from)?;
        let writer = port.try_clone().map_err(io::Error::from)?;

        debug!(port = %self.port_name, baud = self.baud_rate, "serial port opened");
        Ok(LinkHalves {
            reader: Box::new(port),
            writer: Box::new(writer),
        })
    }

    fn name(&self) -> String {
        self.port_name.clone()
    }
}

// ============================================================================
// TCP
// ============================================================================

/// A TCP endpoint.
#[derive(Debug, Clone)]
pub struct TcpLink {
    host: String,
    port: u16,
    read_timeout: Duration,
}

impl TcpLink {
    /// Describe a TCP endpoint. Nothing is connected until [`Link::open`].
    pub fn new(host: impl Into<String>, port: u16, read_timeout: Duration) -> Self {
        TcpLink {
            host: host.into(),
            port,
            read_timeout,
        }
    }
}

impl Link for TcpLink {
    fn open(&self) -> io::Result<LinkHalves> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        let writer = stream.try_clone()?;

        debug!(host = %self.host, port = self.port, "tcp endpoint connected");
        Ok(LinkHalves {
            reader: Box::new(TcpReader(stream)),
            writer: Box::new(writer),
        })
    }

    fn name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Maps an orderly close to an error so the listener reopens.
struct TcpReader(TcpStream);

impl Read for TcpReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf)? {
            0 if !buf.is_empty() => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device closed the connection",
            )),
            n => Ok(n),
        }
    }
}

// ============================================================================
// In-Memory
// ============================================================================

/// An in-process link paired with a [`DeviceEnd`].
///
/// Used to drive a connection against a simulated device. Clones share the
/// same channels and open counter.
#[derive(Debug, Clone)]
pub struct MemoryLink {
    to_device: Sender<Vec<u8>>,
    from_device: Receiver<Vec<u8>>,
    read_timeout: Duration,
    opens: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl MemoryLink {
    /// Create a link and the device end it talks to.
    pub fn pair(read_timeout: Duration) -> (MemoryLink, DeviceEnd) {
        let (to_device, from_host) = unbounded();
        let (to_host, from_device) = unbounded();
        let dropped = Arc::new(AtomicBool::new(false));

        let link = MemoryLink {
            to_device,
            from_device,
            read_timeout,
            opens: Arc::new(AtomicUsize::new(0)),
            dropped: dropped.clone(),
        };
        let device = DeviceEnd {
            from_host,
            to_host,
            codec: FrameCodec::new(),
            sequence: AtomicU16::new(0),
            dropped,
        };
        (link, device)
    }

    /// How many times the link has been opened.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Link for MemoryLink {
    fn open(&self) -> io::Result<LinkHalves> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(LinkHalves {
            reader: Box::new(MemoryReader {
                rx: self.from_device.clone(),
                pending: BytesMut::new(),
                timeout: self.read_timeout,
                dropped: self.dropped.clone(),
            }),
            writer: Box::new(MemoryWriter {
                tx: self.to_device.clone(),
            }),
        })
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryReader {
    rx: Receiver<Vec<u8>>,
    pending: BytesMut,
    timeout: Duration,
    dropped: Arc<AtomicBool>,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.dropped.swap(false, Ordering::SeqCst) {
            self.pending.clear();
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "device dropped the link",
            ));
        }
        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.timeout) {
                Ok(data) => self.pending.extend_from_slice(&data),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "device end dropped",
                    ))
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

struct MemoryWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "device end dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The device side of a [`MemoryLink`].
pub struct DeviceEnd {
    from_host: Receiver<Vec<u8>>,
    to_host: Sender<Vec<u8>>,
    codec: FrameCodec,
    sequence: AtomicU16,
    dropped: Arc<AtomicBool>,
}

impl DeviceEnd {
    /// Fail the host's next read once, as a board does when it resets and
    /// its USB serial link disappears.
    pub fn drop_link(&self) {
        self.dropped.store(true, Ordering::SeqCst);
    }

    /// Send raw bytes to the host, bypassing framing.
    pub fn send_raw(&self, bytes: &[u8]) -> bool {
        self.to_host.send(bytes.to_vec()).is_ok()
    }

    /// Frame and send a packet to the host.
    pub fn send_packet(&self, packet: &Packet) -> bool {
        self.send_raw(&encode_frame(packet.as_bytes()))
    }

    /// Build and send a response packet.
    pub fn respond(&self, response_type: u16, user_data: u32, payload: &[u8]) -> bool {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.send_packet(&Packet::build(seq, response_type, 0, user_data, payload))
    }

    /// Wait for the next request packet from the host.
    ///
    /// Keep-alives and corrupt frames are skipped. Returns `None` if nothing
    /// arrives within `timeout` or the host end is gone.
    pub fn recv_request(&mut self, timeout: Duration) -> Option<Packet> {
        loop {
            while let Some(event) = self.codec.next_frame() {
                if let FrameEvent::Packet(bytes) = event {
                    if let Ok(packet) = Packet::from_bytes(bytes) {
                        return Some(packet);
                    }
                }
            }
            let data = self.from_host.recv_timeout(timeout).ok()?;
            self.codec.push(&data);
        }
    }

    /// Whether any host bytes are waiting, framed or not.
    pub fn has_pending(&self) -> bool {
        self.codec.buffered_len() > 0 || !self.from_host.is_empty()
    }
}

impl fmt::Debug for DeviceEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEnd")
            .field("buffered", &self.codec.buffered_len())
            .finish()
    }
}
