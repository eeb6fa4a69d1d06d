//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Trait for line oriented serial port I/O
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Append bytes up to and including the next `\n` to `buf`
    ///
    /// Returns the number of bytes read, 0 at end of stream. Bytes read before
    /// the future is dropped stay in `buf`.
    async fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;
}

/// Buffered wrapper around any async byte stream
pub struct StreamPort<S> {
    stream: BufReader<S>,
}

/// The port used with real hardware
pub type TokioSerialPort = StreamPort<tokio_serial::SerialStream>;

impl<S: AsyncRead + AsyncWrite + Unpin + Send> StreamPort<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for StreamPort<S> {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(&mut self.stream, data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(&mut self.stream).await
    }

    async fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.stream.read_until(b'\n', buf).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_stream_port_reads_lines() {
        let stream = Builder::new().read(b"PRS 18BCD\r\nTMP 215\r\n").build();
        let mut port = StreamPort::new(stream);

        let mut line = Vec::new();
        assert_eq!(port.read_line(&mut line).await.unwrap(), 11);
        assert_eq!(line, b"PRS 18BCD\r\n");

        line.clear();
        port.read_line(&mut line).await.unwrap();
        assert_eq!(line, b"TMP 215\r\n");

        line.clear();
        assert_eq!(port.read_line(&mut line).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stream_port_writes() {
        let stream = Builder::new().write(b"$BST*\r\n").build();
        let mut port = StreamPort::new(stream);

        port.write_all(b"$BST*\r\n").await.unwrap();
        port.flush().await.unwrap();
    }
}
