//! Host links: serial port or TCP socket
//!
//! The bootloader core talks to its host through `embedded_io::Read` and
//! `embedded_io::Write`. [`Link`] adapts any blocking std stream to those
//! traits.

use crate::error::Result;
use embedded_io::ErrorKind;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

/// Default baud rate when none is given
pub const DEFAULT_BAUD: u32 = 115200;

/// Listen address used when `ip=` only names a port
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Where the host connects from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    /// Serial device and optional baud rate
    Serial { device: String, baud: Option<u32> },
    /// TCP listen address
    Tcp { host: String, port: u16 },
}

impl Connection {
    /// Parse `dev=/dev/ttyACM0[:baud]` or `ip=[host:]port`
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        if let Some(dev) = s.strip_prefix("dev=") {
            if let Some((device, baud_str)) = dev.rsplit_once(':') {
                let baud = baud_str
                    .parse()
                    .map_err(|_| format!("Invalid baud rate: {}", baud_str))?;
                Ok(Connection::Serial {
                    device: device.to_string(),
                    baud: Some(baud),
                })
            } else if dev.is_empty() {
                Err("Missing device in dev= parameter".to_string())
            } else {
                Ok(Connection::Serial {
                    device: dev.to_string(),
                    baud: None,
                })
            }
        } else if let Some(ip) = s.strip_prefix("ip=") {
            let (host, port_str) = match ip.rsplit_once(':') {
                Some((host, port)) => (host, port),
                None => (DEFAULT_HOST, ip),
            };
            let port = port_str
                .parse()
                .map_err(|_| format!("Invalid port: {}", port_str))?;
            Ok(Connection::Tcp {
                host: host.to_string(),
                port,
            })
        } else {
            Err(format!(
                "Invalid transport: {}. Use dev=... or ip=...",
                s
            ))
        }
    }
}

/// Blocking std stream exposed through `embedded-io`
///
/// Read timeouts are retried: a bootloader waits for its host indefinitely.
pub struct Link<S> {
    stream: S,
}

impl<S: Read + Write> Link<S> {
    /// Wrap a stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Unwrap the stream
    #[cfg(test)]
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> embedded_io::ErrorType for Link<S> {
    type Error = ErrorKind;
}

impl<S: Read + Write> embedded_io::Read for Link<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, ErrorKind> {
        loop {
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => {
                    log::error!("link read failed: {}", e);
                    return Err(ErrorKind::Other);
                }
            }
        }
    }
}

impl<S: Read + Write> embedded_io::Write for Link<S> {
    fn write(&mut self, buf: &[u8]) -> std::result::Result<usize, ErrorKind> {
        self.stream.write(buf).map_err(|e| {
            log::error!("link write failed: {}", e);
            ErrorKind::Other
        })
    }

    fn flush(&mut self) -> std::result::Result<(), ErrorKind> {
        self.stream.flush().map_err(|e| {
            log::error!("link flush failed: {}", e);
            ErrorKind::Other
        })
    }
}

/// Open a serial port as a host link
pub fn open_serial(device: &str, baud: Option<u32>) -> Result<Link<Box<dyn SerialPort>>> {
    let baud_rate = baud.unwrap_or(DEFAULT_BAUD);

    let port = serialport::new(device, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_secs(5))
        .open()?;

    log::info!("Opened serial port {} at {} baud", device, baud_rate);
    Ok(Link::new(port))
}

/// Wait for one host to connect on `host:port`
pub fn accept_tcp(host: &str, port: u16) -> Result<Link<TcpStream>> {
    let listener = TcpListener::bind((host, port))?;
    log::info!("Waiting for a host on {}", listener.local_addr()?);

    let (stream, peer) = listener.accept()?;
    stream.set_nodelay(true)?;
    log::info!("Host connected from {}", peer);
    Ok(Link::new(stream))
}
