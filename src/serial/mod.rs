//! # Serial Communication Module
//!
//! Handles serial communication with the BlueFlyVario over USB or a
//! Bluetooth RFCOMM device.
//!
//! This module handles:
//! - Opening the serial port (auto-detecting the device path)
//! - Reading newline terminated telemetry lines
//! - Writing command frames with their line terminator

pub mod port_trait;

use std::time::Duration;

use crate::config::SerialConfig;
use crate::error::{BfvError, Result};
use port_trait::{SerialPortIO, TokioSerialPort};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

/// Factory baud rate of the BlueFlyVario UART
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Terminator the firmware expects after every frame
pub const LINE_END: &str = "\r\n";

/// Default device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // FTDI cable on the vario UART
    "/dev/ttyACM0",
    "/dev/rfcomm0", // Bound Bluetooth module
];

/// Vario Serial Port Handler
pub struct VarioSerial {
    port: Box<dyn SerialPortIO>,
    device_path: String,
    read_timeout: Duration,
    /// Bytes of a line still waiting for its terminator
    pending: Vec<u8>,
}

impl std::fmt::Debug for VarioSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VarioSerial")
            .field("device_path", &self.device_path)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl VarioSerial {
    /// Open the port described by the configuration
    ///
    /// An empty `port` tries the default USB and Bluetooth paths in turn.
    ///
    /// # Errors
    ///
    /// Returns error if no device could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bfv_link::config::SerialConfig;
    /// use bfv_link::serial::VarioSerial;
    ///
    /// let serial = VarioSerial::open(&SerialConfig::default())?;
    /// println!("Connected to: {}", serial.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);

        if config.port.is_empty() {
            Self::open_with_paths(DEFAULT_DEVICE_PATHS, config.baud_rate, timeout)
        } else {
            Self::open_with_paths(&[config.port.as_str()], config.baud_rate, timeout)
        }
    }

    /// Open the first device path that works
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/rfcomm0"])
    /// * `baud_rate` - Line speed
    /// * `read_timeout` - How long [`read_line`](Self::read_line) waits
    ///
    /// # Returns
    ///
    /// * `Result<VarioSerial>` - Connected serial port or error
    pub fn open_with_paths(paths: &[&str], baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened vario at {} ({} baud)", path, baud_rate);
                    return Ok(Self::from_port(TokioSerialPort::new(port), *path, read_timeout));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(BfvError::SerialPortNotFound(paths.join(", ")))
    }

    /// Wrap an already open port
    pub fn from_port<P: SerialPortIO + 'static>(
        port: P,
        device_path: impl Into<String>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            port: Box::new(port),
            device_path: device_path.into(),
            read_timeout,
            pending: Vec::new(),
        }
    }

    /// Open a specific serial port as 8N1 without flow control
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| BfvError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Send a serialized command frame
    ///
    /// PMTK frames already end with `\r\n`; every other frame gets it appended.
    ///
    /// # Arguments
    ///
    /// * `frame` - Output of a `serialize` call, e.g. `"$BST*"`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bfv_link::config::SerialConfig;
    /// use bfv_link::protocol::registry::Registry;
    /// use bfv_link::serial::VarioSerial;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut serial = VarioSerial::open(&SerialConfig::default())?;
    ///     let frame = Registry::new().serialize("getSettings")?;
    ///     serial.send_frame(&frame).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn send_frame(&mut self, frame: &str) -> Result<()> {
        let mut data = frame.to_string();
        if !data.ends_with(LINE_END) {
            data.push_str(LINE_END);
        }

        self.port
            .write_all(data.as_bytes())
            .await
            .map_err(|e| BfvError::Serial(format!("Failed to write frame: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| BfvError::Serial(format!("Failed to flush serial port: {}", e)))?;

        debug!("Sent {}", frame.trim_end());
        Ok(())
    }

    /// Read the next line, without its terminator
    ///
    /// A line that is still incomplete when the timeout expires is kept and
    /// completed by the next call.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(line))` - A line arrived
    /// * `Ok(None)` - No complete line arrived within the read timeout
    ///
    /// # Errors
    ///
    /// Returns error if the port fails or was closed by the device
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let next = self.port.read_line(&mut self.pending);
        let read = match tokio::time::timeout(self.read_timeout, next).await {
            Ok(read) => read.map_err(|e| BfvError::Serial(format!("Failed to read line: {}", e)))?,
            Err(_) => {
                if !self.pending.is_empty() {
                    trace!("Partial line after timeout: {} bytes", self.pending.len());
                }
                return Ok(None);
            }
        };

        if read == 0 {
            return Err(BfvError::Serial(format!("{} closed", self.device_path)));
        }

        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.pending.clear();
        trace!("Received {:?}", line);
        Ok(Some(line))
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[cfg(test)]
mod tests {
    use super::port_trait::mocks::MockSerialPort;
    use super::port_trait::StreamPort;
    use super::*;
    use std::io;

    fn mock_serial() -> (VarioSerial, MockSerialPort) {
        let mock = MockSerialPort::new();
        let serial = VarioSerial::from_port(mock.clone(), "/dev/mock", Duration::from_millis(50));
        (serial, mock)
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_BAUD_RATE, 57_600);
        assert_eq!(DEFAULT_DEVICE_PATHS.len(), 3);
        assert_eq!(DEFAULT_DEVICE_PATHS[2], "/dev/rfcomm0");
        assert_eq!(LINE_END, "\r\n");
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result =
            VarioSerial::open_with_paths(invalid_paths, DEFAULT_BAUD_RATE, Duration::from_secs(1));

        match result {
            Err(BfvError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_with_empty_paths_returns_error() {
        let empty_paths: &[&str] = &[];
        let result =
            VarioSerial::open_with_paths(empty_paths, DEFAULT_BAUD_RATE, Duration::from_secs(1));
        assert!(matches!(result, Err(BfvError::SerialPortNotFound(_))));
    }

    #[test]
    fn test_open_configured_port() {
        let config = SerialConfig {
            port: "/dev/nonexistent_vario".to_string(),
            ..SerialConfig::default()
        };

        match VarioSerial::open(&config) {
            Err(BfvError::SerialPortNotFound(msg)) => assert_eq!(msg, "/dev/nonexistent_vario"),
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let path = "/dev/nonexistent_serial_device_12345";
        let result = VarioSerial::open_port(path, DEFAULT_BAUD_RATE);

        match result {
            Err(BfvError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_frame_appends_line_end() {
        let (mut serial, mock) = mock_serial();

        serial.send_frame("$BST*").await.unwrap();
        serial.send_frame("$BFL 20*").await.unwrap();

        assert_eq!(mock.get_written_data(), vec![b"$BST*\r\n".to_vec(), b"$BFL 20*\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_pmtk_frame_unchanged() {
        let (mut serial, mock) = mock_serial();

        serial.send_frame("$PMTK622,0*28\r\n").await.unwrap();

        assert_eq!(mock.get_written_data(), vec![b"$PMTK622,0*28\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_frame_write_error() {
        let (mut serial, mock) = mock_serial();
        mock.set_write_error(io::ErrorKind::BrokenPipe);

        match serial.send_frame("$BST*").await {
            Err(BfvError::Serial(msg)) => assert!(msg.contains("Failed to write frame")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
        assert!(mock.get_written_data().is_empty());
    }

    #[tokio::test]
    async fn test_send_frame_flush_error() {
        let (mut serial, mock) = mock_serial();
        mock.set_flush_error(io::ErrorKind::TimedOut);

        match serial.send_frame("$BST*").await {
            Err(BfvError::Serial(msg)) => assert!(msg.contains("Failed to flush")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_line_strips_terminator() {
        let (mut serial, mock) = mock_serial();
        mock.push_line("PRS 18BCD\r\n");
        mock.push_line("TMP 215\n");

        assert_eq!(serial.read_line().await.unwrap().as_deref(), Some("PRS 18BCD"));
        assert_eq!(serial.read_line().await.unwrap().as_deref(), Some("TMP 215"));
    }

    #[tokio::test]
    async fn test_read_line_keeps_partial_line_across_timeout() {
        let stream = tokio_test::io::Builder::new()
            .read(b"PRS 18")
            .wait(Duration::from_millis(150))
            .read(b"BCD\r\nTMP 215\r\n")
            .build();
        let port = StreamPort::new(stream);
        let mut serial = VarioSerial::from_port(port, "/dev/mock", Duration::from_millis(50));

        let mut lines = Vec::new();
        for _ in 0..10 {
            if let Some(line) = serial.read_line().await.unwrap() {
                lines.push(line);
                if lines.len() == 2 {
                    break;
                }
            }
        }

        assert_eq!(lines, vec!["PRS 18BCD", "TMP 215"]);
    }

    #[tokio::test]
    async fn test_read_line_closed_port() {
        let (mut serial, _mock) = mock_serial();

        match serial.read_line().await {
            Err(BfvError::Serial(msg)) => assert!(msg.contains("/dev/mock closed")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_line_timeout() {
        let (mut serial, mock) = mock_serial();
        mock.stall();

        assert_eq!(serial.read_line().await.unwrap(), None);
    }

    #[test]
    fn test_device_path() {
        let (serial, _mock) = mock_serial();
        assert_eq!(serial.device_path(), "/dev/mock");
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_read_with_real_hardware() {
        let Ok(mut serial) = VarioSerial::open(&SerialConfig::default()) else {
            println!("No vario detected (skipping read test)");
            return;
        };

        serial.send_frame("$BST*").await.unwrap();
        let line = serial.read_line().await.unwrap();
        println!("First line from {}: {:?}", serial.device_path(), line);
    }
}
