//! Hardware collaborator: enumerate ports, open one, share its line stream.
//!
//! An open link exposes newline-delimited text as a broadcast stream. Every
//! pending acquisition subscribes independently, so one reader can never
//! steal a line from another. Writes travel through a bounded command queue
//! to a dedicated writer thread.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sensormcp_core::logging::{debug, info, targets, trace, warn};
use tokio::sync::{broadcast, mpsc};

/// Capacity of the shared hardware line stream.
const LINE_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the outbound command queue.
const COMMAND_CHANNEL_CAPACITY: usize = 8;

/// Read timeout used so the reader thread can notice a closed link.
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Hardware errors.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Listing or opening a serial port failed.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// Raw I/O on an open port failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The link's writer has gone away.
    #[error("hardware link closed")]
    Closed,
    /// No port was available to open.
    #[error("no hardware port available")]
    NoPort,
}

/// An available hardware port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    /// OS path or name of the port.
    pub path: String,
    /// Human-readable description.
    pub description: String,
}

/// The hardware collaborator.
pub trait HardwareTransport: Send + Sync {
    /// Lists available devices.
    fn list(&self) -> Result<Vec<PortDescriptor>, HardwareError>;

    /// Opens a device and starts streaming its lines.
    fn open(&self, descriptor: &PortDescriptor) -> Result<HardwareLink, HardwareError>;

    /// Opens the first listed device.
    fn open_first(&self) -> Result<HardwareLink, HardwareError> {
        let first = self
            .list()?
            .into_iter()
            .next()
            .ok_or(HardwareError::NoPort)?;
        self.open(&first)
    }
}

/// An open connection to the sensor hardware.
///
/// Dropping the link closes it: the writer thread exits when the command
/// queue closes, and the reader thread exits at its next read timeout.
#[derive(Debug)]
pub struct HardwareLink {
    lines: broadcast::Sender<String>,
    commands: mpsc::Sender<Vec<u8>>,
    open: Arc<AtomicBool>,
    descriptor: PortDescriptor,
}

/// The device-facing half of a [`HardwareLink`].
///
/// Implementations push every received line into `lines` and write every
/// queued command from `commands` to the device.
#[derive(Debug)]
pub struct HardwareEndpoint {
    /// Sender for lines received from the device.
    pub lines: broadcast::Sender<String>,
    /// Commands queued by acquisitions.
    pub commands: mpsc::Receiver<Vec<u8>>,
    /// Cleared when the link is closed.
    pub open: Arc<AtomicBool>,
}

impl HardwareEndpoint {
    /// Returns false once the link side has been closed or dropped.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Publishes one line to every current subscriber.
    ///
    /// Lines published while nobody is waiting are simply dropped.
    pub fn publish(&self, line: impl Into<String>) {
        let _ = self.lines.send(line.into());
    }
}

impl HardwareLink {
    /// Creates a link and the endpoint a device driver (or a test) feeds.
    #[must_use]
    pub fn channel(descriptor: PortDescriptor) -> (Self, HardwareEndpoint) {
        let (lines, _) = broadcast::channel(LINE_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let open = Arc::new(AtomicBool::new(true));
        let link = Self {
            lines: lines.clone(),
            commands: command_tx,
            open: Arc::clone(&open),
            descriptor,
        };
        let endpoint = HardwareEndpoint {
            lines,
            commands: command_rx,
            open,
        };
        (link, endpoint)
    }

    /// Subscribes to lines arriving from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.lines.subscribe()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lines.receiver_count()
    }

    /// Queues bytes for the device, waiting for queue capacity.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), HardwareError> {
        self.commands
            .send(bytes.to_vec())
            .await
            .map_err(|_| HardwareError::Closed)
    }

    /// The port this link is attached to.
    #[must_use]
    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    /// Closes the link.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            info!(target: targets::SENSOR, "Closing hardware link {}", self.descriptor.path);
        }
    }
}

impl Drop for HardwareLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serial-port hardware, one sensor per port.
#[derive(Debug, Clone)]
pub struct SerialHardware {
    baud_rate: u32,
}

impl SerialHardware {
    /// Creates a serial transport at the given baud rate.
    #[must_use]
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl HardwareTransport for SerialHardware {
    fn list(&self) -> Result<Vec<PortDescriptor>, HardwareError> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| PortDescriptor {
                description: describe_port_type(&port.port_type),
                path: port.port_name,
            })
            .collect())
    }

    fn open(&self, descriptor: &PortDescriptor) -> Result<HardwareLink, HardwareError> {
        let port = serialport::new(&descriptor.path, self.baud_rate)
            .timeout(SERIAL_READ_TIMEOUT)
            .open()?;
        let reader = port.try_clone()?;
        let (link, endpoint) = HardwareLink::channel(descriptor.clone());
        let HardwareEndpoint {
            lines,
            commands,
            open,
        } = endpoint;

        let path = descriptor.path.clone();
        std::thread::Builder::new()
            .name("sensormcp-serial-read".into())
            .spawn(move || read_lines(reader, &lines, &open, &path))?;
        std::thread::Builder::new()
            .name("sensormcp-serial-write".into())
            .spawn(move || write_commands(port, commands))?;

        info!(
            target: targets::SENSOR,
            "Opened {} at {} baud",
            descriptor.path,
            self.baud_rate
        );
        Ok(link)
    }
}

fn describe_port_type(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        serialport::SerialPortType::Unknown => "Unknown".to_string(),
    }
}

fn read_lines(
    port: Box<dyn serialport::SerialPort>,
    lines: &broadcast::Sender<String>,
    open: &AtomicBool,
    path: &str,
) {
    let mut reader = BufReader::new(port);
    let mut line = String::new();
    while open.load(Ordering::Acquire) {
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if line.ends_with('\n') {
                    let text = line.trim_end().to_string();
                    trace!(target: targets::SENSOR, "hw <- {}", text);
                    let _ = lines.send(text);
                    line.clear();
                }
            }
            // A timeout may leave a partial line in `line`; keep accumulating.
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                debug!(target: targets::SENSOR, "Dropping non-UTF-8 line from {}", path);
                line.clear();
            }
            Err(e) => {
                warn!(target: targets::SENSOR, "Read from {} failed: {}", path, e);
                break;
            }
        }
    }
    debug!(target: targets::SENSOR, "Reader for {} stopped", path);
}

fn write_commands(mut port: Box<dyn serialport::SerialPort>, mut commands: mpsc::Receiver<Vec<u8>>) {
    while let Some(bytes) = commands.blocking_recv() {
        if let Err(e) = port.write_all(&bytes).and_then(|()| port.flush()) {
            warn!(target: targets::SENSOR, "Write to hardware failed: {}", e);
        }
    }
}
