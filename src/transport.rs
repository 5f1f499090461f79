//! Byte-stream transport abstraction (spec §6).
//!
//! The protocol core only needs something that can send and receive
//! raw bytes with a deadline; what carries those bytes (serial line,
//! loopback pipe, USB CDC) is an external concern.

use std::time::Duration;

use tracing::debug;

use crate::error::PsaError;

/// A duplex byte stream the client speaks frames over.
///
/// Implementations are not required to be thread-safe; `PsaClient`
/// uses one transport from one thread at a time (spec §5).
pub trait Transport {
    /// Opens the underlying channel. A no-op for already-open streams.
    fn open(&mut self) -> Result<(), PsaError>;

    /// Closes the underlying channel.
    fn close(&mut self) -> Result<(), PsaError>;

    /// Writes `data` in full.
    fn send(&mut self, data: &[u8]) -> Result<(), PsaError>;

    /// Reads whatever bytes are currently available without blocking
    /// past `timeout`. Returns an empty vector on timeout with no
    /// data — this is not an error, the caller decides whether to
    /// keep waiting.
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, PsaError>;

    /// Drains whatever is already buffered without waiting on new
    /// bytes — a non-blocking poll, equivalent to `receive` with a
    /// zero timeout. Default implementation does exactly that;
    /// implementations with a cheaper direct path (e.g. reading a
    /// serial port's input queue length first) may override it.
    fn receive_all(&mut self) -> Result<Vec<u8>, PsaError> {
        self.receive(Duration::ZERO)
    }

    /// Discards any buffered, not-yet-read bytes.
    fn flush(&mut self) -> Result<(), PsaError>;
}

/// In-memory transport pairing two byte queues, for tests and for the
/// integration scenarios in spec §8. Never touches real I/O.
///
/// Constructed in connected pairs: bytes sent on one side arrive on
/// the other's `receive`.
pub struct LoopbackTransport {
    outbox: std::collections::VecDeque<u8>,
    inbox: std::sync::mpsc::Receiver<u8>,
    peer: std::sync::mpsc::Sender<u8>,
    is_open: bool,
}

impl LoopbackTransport {
    /// Builds a connected pair: whatever is sent on `a` can be
    /// received on `b`, and vice versa.
    pub fn pair() -> (Self, Self) {
        let (tx_ab, rx_ab) = std::sync::mpsc::channel();
        let (tx_ba, rx_ba) = std::sync::mpsc::channel();
        let a = LoopbackTransport {
            outbox: std::collections::VecDeque::new(),
            inbox: rx_ba,
            peer: tx_ab,
            is_open: false,
        };
        let b = LoopbackTransport {
            outbox: std::collections::VecDeque::new(),
            inbox: rx_ab,
            peer: tx_ba,
            is_open: false,
        };
        (a, b)
    }

    /// Injects raw bytes as if the peer had sent them, bypassing
    /// the channel — used to construct malformed/garbage streams in
    /// tests without a live peer.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.outbox.extend(bytes);
    }
}

impl Transport for LoopbackTransport {
    fn open(&mut self) -> Result<(), PsaError> {
        self.is_open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PsaError> {
        self.is_open = false;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), PsaError> {
        for &byte in data {
            self.peer.send(byte).map_err(|_| {
                PsaError::Transport(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "loopback peer dropped",
                ))
            })?;
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, PsaError> {
        let mut out: Vec<u8> = self.outbox.drain(..).collect();
        if !out.is_empty() {
            return Ok(out);
        }

        match self.inbox.recv_timeout(timeout) {
            Ok(first) => {
                out.push(first);
                while let Ok(more) = self.inbox.try_recv() {
                    out.push(more);
                }
                Ok(out)
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Ok(Vec::new()),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Ok(Vec::new()),
        }
    }

    fn flush(&mut self) -> Result<(), PsaError> {
        self.outbox.clear();
        while self.inbox.try_recv().is_ok() {}
        Ok(())
    }
}

/// Real serial-port transport built on the `serialport` crate.
#[cfg(feature = "serial")]
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
}

#[cfg(feature = "serial")]
impl SerialTransport {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            port: None,
        }
    }
}

#[cfg(feature = "serial")]
impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), PsaError> {
        debug!(port = %self.port_name, baud = self.baud_rate, "opening serial port");
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| {
                PsaError::Transport(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<(), PsaError> {
        self.port = None;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), PsaError> {
        let port = self.port.as_mut().ok_or_else(|| {
            PsaError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "serial port not open",
            ))
        })?;
        std::io::Write::write_all(port, data)?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, PsaError> {
        let port = self.port.as_mut().ok_or_else(|| {
            PsaError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "serial port not open",
            ))
        })?;
        port.set_timeout(timeout).map_err(|e| {
            PsaError::Transport(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;

        let mut buf = [0u8; 256];
        match std::io::Read::read(port, &mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(PsaError::Transport(e)),
        }
    }

    fn flush(&mut self) -> Result<(), PsaError> {
        if let Some(port) = self.port.as_mut() {
            port.clear(serialport::ClearBuffer::All).map_err(|e| {
                PsaError::Transport(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
        }
        Ok(())
    }
}
