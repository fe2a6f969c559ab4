//! Transport abstraction the Master speaks over: a plain byte stream with
//! deadline-aware reads, so the request/response loop can run against a
//! real TCP socket in production and an in-memory duplex in tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Dnp3Error, Result};

#[async_trait]
pub trait ByteStream: Send {
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes, waiting at most `deadline`. Returns
    /// the number of bytes read (0 only at EOF).
    async fn read(&mut self, buf: &mut [u8], deadline: Duration) -> Result<usize>;

    async fn close(&mut self) -> Result<()>;
}

pub struct TcpByteStream {
    stream: TcpStream,
    host: String,
    port: u16,
}

impl TcpByteStream {
    pub async fn connect(host: &str, port: u16, deadline: Duration) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = timeout(deadline, TcpStream::connect(&addr))
            .await
            .map_err(|_| Dnp3Error::timeout(format!("connecting to {addr}"), deadline))?
            .map_err(|e| Dnp3Error::communication(e.to_string(), host, port))?;

        Ok(TcpByteStream {
            stream,
            host: host.to_string(),
            port,
        })
    }
}

#[async_trait]
impl ByteStream for TcpByteStream {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(data)
            .await
            .map_err(|e| Dnp3Error::communication(e.to_string(), &self.host, self.port))
    }

    async fn read(&mut self, buf: &mut [u8], deadline: Duration) -> Result<usize> {
        match timeout(deadline, self.stream.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(Dnp3Error::communication(e.to_string(), &self.host, self.port)),
            Err(_) => Err(Dnp3Error::timeout("waiting for response", deadline)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| Dnp3Error::communication(e.to_string(), &self.host, self.port))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    pub struct DuplexByteStream {
        read_half: ReadHalf<DuplexStream>,
        write_half: WriteHalf<DuplexStream>,
    }

    impl DuplexByteStream {
        pub fn pair(buffer: usize) -> (Self, DuplexStream) {
            let (a, b) = tokio::io::duplex(buffer);
            let (read_half, write_half) = tokio::io::split(a);
            (DuplexByteStream { read_half, write_half }, b)
        }
    }

    #[async_trait]
    impl ByteStream for DuplexByteStream {
        async fn write_all(&mut self, data: &[u8]) -> Result<()> {
            self.write_half
                .write_all(data)
                .await
                .map_err(|e| Dnp3Error::communication(e.to_string(), "mock", 0))
        }

        async fn read(&mut self, buf: &mut [u8], deadline: Duration) -> Result<usize> {
            match timeout(deadline, self.read_half.read(buf)).await {
                Ok(Ok(n)) => Ok(n),
                Ok(Err(e)) => Err(Dnp3Error::communication(e.to_string(), "mock", 0)),
                Err(_) => Err(Dnp3Error::timeout("waiting for response", deadline)),
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.write_half
                .shutdown()
                .await
                .map_err(|e| Dnp3Error::communication(e.to_string(), "mock", 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::DuplexByteStream;
    use super::*;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

    #[tokio::test]
    async fn duplex_round_trips_bytes() {
        let (mut stream, mut peer) = DuplexByteStream::pair(64);
        stream.write_all(&[1, 2, 3]).await.unwrap();

        let mut buf = [0u8; 3];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3]);

        peer.write_all(&[9, 8]).await.unwrap();
        let mut read_buf = [0u8; 4];
        let n = stream.read(&mut read_buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&read_buf[..n], &[9, 8]);
    }

    #[tokio::test]
    async fn read_times_out_when_no_data_arrives() {
        let (mut stream, _peer) = DuplexByteStream::pair(64);
        let mut buf = [0u8; 4];
        let err = stream.read(&mut buf, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Dnp3Error::Timeout { .. }));
    }
}
