//! Serial line transports.
//!
//! A [`Connector`] opens a device path and hands back a [`Transport`], the
//! open line. Transports do no retrying and no framing: the session owns both.
//!
//! Two implementations are provided:
//! - [`SerialConnector`] / [`SerialTransport`] - a real serial port
//! - [`MemoryConnector`] / [`MemoryTransport`] - an in-process line paired
//!   with a [`MemoryDevice`] that plays the controller's side

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use hydro_protocol::{Command, LineCodec};
use parking_lot::Mutex;
use serialport::SerialPort;

use crate::error::TransportError;

// ============================================================================
// Traits
// ============================================================================

/// An open serial line.
pub trait Transport: Send {
    /// Path the line was opened on.
    fn path(&self) -> &str;

    /// Whether the line is still open.
    fn is_open(&self) -> bool;

    /// Write all bytes or fail.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    /// Read whatever is available without blocking. May return an empty vec.
    fn read_available(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Close the line. Idempotent.
    fn close(&mut self);
}

/// Opens device paths.
pub trait Connector: Send + Sync {
    /// Open `path` at `baud_rate`, giving up after `timeout`.
    fn open(
        &self,
        path: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

// ============================================================================
// Serial Port
// ============================================================================

/// Opens real serial ports, 8N1 with no flow control.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(
        &self,
        path: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| open_error(path, e))?;

        Ok(Box::new(SerialTransport {
            path: path.to_string(),
            port: Some(port),
        }))
    }
}

fn open_error(path: &str, error: serialport::Error) -> TransportError {
    use serialport::ErrorKind;

    match error.kind() {
        ErrorKind::NoDevice | ErrorKind::Io(io::ErrorKind::NotFound) => {
            TransportError::NotFound(path.to_string())
        }
        ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            TransportError::PermissionDenied(path.to_string())
        }
        // EBUSY has no ErrorKind of its own; only the errno text identifies it.
        _ if error.description.to_lowercase().contains("busy") => {
            TransportError::Busy(path.to_string())
        }
        _ => TransportError::Open {
            path: path.to_string(),
            reason: error.description,
        },
    }
}

/// An open serial port.
pub struct SerialTransport {
    path: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl Transport for SerialTransport {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        let port = self.port()?;
        let available = port.bytes_to_read().map_err(io::Error::from)?;
        Ok(available as usize)
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let available = self.bytes_available()?;
        if available == 0 {
            return Ok(Vec::new());
        }

        let port = self.port()?;
        let mut buf = vec![0u8; available];
        match port.read(&mut buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        // Dropping the handle closes the descriptor.
        self.port = None;
    }
}

// ============================================================================
// In-Memory Line
// ============================================================================

#[derive(Debug)]
struct LinkState {
    plugged: AtomicBool,
    host_open: AtomicBool,
}

/// Host side of an in-memory serial line.
#[derive(Debug)]
pub struct MemoryTransport {
    path: String,
    to_device: Sender<Vec<u8>>,
    from_device: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    link: Arc<LinkState>,
}

/// Controller side of an in-memory serial line.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    to_host: Sender<Vec<u8>>,
    from_host: Receiver<Vec<u8>>,
    link: Arc<LinkState>,
}

/// Create a connected host/controller pair.
pub fn memory_pair(path: &str) -> (MemoryTransport, MemoryDevice) {
    let (to_device, from_host) = crossbeam_channel::unbounded();
    let (to_host, from_device) = crossbeam_channel::unbounded();
    let link = Arc::new(LinkState {
        plugged: AtomicBool::new(true),
        host_open: AtomicBool::new(true),
    });

    let transport = MemoryTransport {
        path: path.to_string(),
        to_device,
        from_device,
        pending: Vec::new(),
        link: Arc::clone(&link),
    };
    let device = MemoryDevice { to_host, from_host, link };
    (transport, device)
}

impl MemoryTransport {
    fn check_link(&self) -> Result<(), TransportError> {
        if !self.link.host_open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.link.plugged.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged").into());
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.link.host_open.load(Ordering::SeqCst)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.check_link()?;
        self.to_device
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "device side dropped"))?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        self.check_link()?;
        while let Ok(chunk) = self.from_device.try_recv() {
            self.pending.extend_from_slice(&chunk);
        }
        Ok(self.pending.len())
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        self.bytes_available()?;
        Ok(std::mem::take(&mut self.pending))
    }

    fn close(&mut self) {
        self.link.host_open.store(false, Ordering::SeqCst);
    }
}

impl MemoryDevice {
    /// Send one line to the host; the terminator is appended.
    pub fn send_line(&self, line: &str) {
        self.send_bytes(&LineCodec::encode_command(line));
    }

    /// Send raw bytes to the host.
    pub fn send_bytes(&self, bytes: &[u8]) {
        let _ = self.to_host.send(bytes.to_vec());
    }

    /// Drain everything the host has written so far.
    pub fn take_received(&self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = self.from_host.try_recv() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    /// Drain the host's writes as lines.
    pub fn take_lines(&self) -> Vec<String> {
        let mut codec = LineCodec::new();
        // Host writes are whole commands, never an unbounded partial.
        let _ = codec.push(&self.take_received());
        codec.lines().collect()
    }

    /// Drain the host's writes and parse them as commands, skipping garbage.
    pub fn take_commands(&self) -> Vec<Command> {
        self.take_lines()
            .iter()
            .filter_map(|line| Command::parse(line).ok())
            .collect()
    }

    /// Simulate pulling the cable: every host I/O call fails from now on.
    pub fn unplug(&self) {
        self.link.plugged.store(false, Ordering::SeqCst);
    }

    /// Whether the host still has its end open.
    pub fn is_host_open(&self) -> bool {
        self.link.host_open.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum PortSlot {
    Ready(VecDeque<MemoryTransport>),
    Busy,
    Denied,
}

/// Connector over in-memory lines, keyed by device path.
///
/// Each [`MemoryConnector::attach`] queues one line for that path; opening a
/// path with nothing queued fails with [`TransportError::NotFound`].
#[derive(Debug, Default)]
pub struct MemoryConnector {
    ports: Mutex<HashMap<String, PortSlot>>,
    attempts: Mutex<Vec<String>>,
}

impl MemoryConnector {
    /// Create a connector with no devices attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug a device in at `path` and return its controller side.
    pub fn attach(&self, path: &str) -> MemoryDevice {
        let (transport, device) = memory_pair(path);
        let mut ports = self.ports.lock();
        match ports.get_mut(path) {
            Some(PortSlot::Ready(queue)) => queue.push_back(transport),
            _ => {
                ports.insert(path.to_string(), PortSlot::Ready(VecDeque::from([transport])));
            }
        }
        device
    }

    /// Make `path` report busy.
    pub fn mark_busy(&self, path: &str) {
        self.ports.lock().insert(path.to_string(), PortSlot::Busy);
    }

    /// Make `path` report permission denied.
    pub fn mark_denied(&self, path: &str) {
        self.ports.lock().insert(path.to_string(), PortSlot::Denied);
    }

    /// Every path an open was attempted on, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

impl Connector for MemoryConnector {
    fn open(
        &self,
        path: &str,
        _baud_rate: u32,
        _timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.lock().push(path.to_string());

        match self.ports.lock().get_mut(path) {
            Some(PortSlot::Ready(queue)) => match queue.pop_front() {
                Some(transport) => Ok(Box::new(transport)),
                None => Err(TransportError::NotFound(path.to_string())),
            },
            Some(PortSlot::Busy) => Err(TransportError::Busy(path.to_string())),
            Some(PortSlot::Denied) => Err(TransportError::PermissionDenied(path.to_string())),
            None => Err(TransportError::NotFound(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_mapping() {
        use serialport::{Error, ErrorKind};

        let path = "/dev/ttyACM0";
        assert!(matches!(
            open_error(path, Error::new(ErrorKind::Io(io::ErrorKind::NotFound), "No such file or directory")),
            TransportError::NotFound(p) if p == path
        ));
        assert!(matches!(
            open_error(path, Error::new(ErrorKind::NoDevice, "No such device")),
            TransportError::NotFound(_)
        ));
        assert!(matches!(
            open_error(path, Error::new(ErrorKind::Io(io::ErrorKind::PermissionDenied), "Permission denied")),
            TransportError::PermissionDenied(p) if p == path
        ));
        assert!(matches!(
            open_error(path, Error::new(ErrorKind::Unknown, "Device or resource busy")),
            TransportError::Busy(p) if p == path
        ));
    }

    #[test]
    fn test_open_error_keeps_driver_reason() {
        use serialport::{Error, ErrorKind};

        let error = open_error("/dev/ttyUSB0", Error::new(ErrorKind::InvalidInput, "Invalid baud rate"));
        match error {
            TransportError::Open { path, reason } => {
                assert_eq!(path, "/dev/ttyUSB0");
                assert_eq!(reason, "Invalid baud rate");
            }
            other => panic!("expected open error, got {:?}", other),
        }
    }

    #[test]
    fn test_memory_pair_bidirectional() {
        let (mut host, device) = memory_pair("/dev/ttyACM0");

        host.write_all(b"PING\n").unwrap();
        assert_eq!(device.take_commands(), vec![Command::Ping]);

        device.send_line("PING_OK");
        assert_eq!(host.bytes_available().unwrap(), 8);
        assert_eq!(host.read_available().unwrap(), b"PING_OK\n");
        assert!(host.read_available().unwrap().is_empty());
    }

    #[test]
    fn test_memory_close_is_idempotent() {
        let (mut host, device) = memory_pair("/dev/ttyACM0");
        host.close();
        host.close();
        assert!(!host.is_open());
        assert!(!device.is_host_open());
        assert!(matches!(host.write_all(b"PING\n"), Err(TransportError::Closed)));
    }

    #[test]
    fn test_memory_unplug_fails_io() {
        let (mut host, device) = memory_pair("/dev/ttyACM0");
        device.unplug();
        assert!(matches!(host.read_available(), Err(TransportError::Io(_))));
        assert!(matches!(host.write_all(b"PING\n"), Err(TransportError::Io(_))));
    }

    #[test]
    fn test_memory_connector_slots() {
        let connector = MemoryConnector::new();
        let _device = connector.attach("/dev/ttyUSB0");
        connector.mark_busy("/dev/ttyACM0");
        connector.mark_denied("/dev/ttyACM1");
        let timeout = Duration::from_secs(2);

        assert!(matches!(
            connector.open("/dev/ttyACM0", 9600, timeout),
            Err(TransportError::Busy(_))
        ));
        assert!(matches!(
            connector.open("/dev/ttyACM1", 9600, timeout),
            Err(TransportError::PermissionDenied(_))
        ));
        assert!(connector.open("/dev/ttyUSB0", 9600, timeout).is_ok());
        // The only queued line was consumed.
        assert!(matches!(
            connector.open("/dev/ttyUSB0", 9600, timeout),
            Err(TransportError::NotFound(_))
        ));
        assert_eq!(
            connector.attempts(),
            vec!["/dev/ttyACM0", "/dev/ttyACM1", "/dev/ttyUSB0", "/dev/ttyUSB0"]
        );
    }
}
