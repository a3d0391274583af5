//! # TCP Transport
//!
//! Messages on a TCP socket, each prefixed with the `kproto::frame` header.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::debug;

use kproto::frame;

use crate::transport;
use crate::transport::Transport;

pub struct TcpTransport {
    peer: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpTransport {
    /// Opens a connection to `address:port`, giving up after `timeout`.
    pub async fn connect(address: &str, port: u16, timeout: Duration) -> transport::Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((address, port)))
            .await
            .map_err(|_| transport::Error::Timeout)?
            .map_err(|e| {
                transport::Error::ConnectionLost(format!("{}:{}: {}", address, port, e))
            })?;
        stream.set_nodelay(true).map_err(io_error)?;
        Self::from_stream(stream)
    }

    /// Wraps an already connected socket.
    pub fn from_stream(stream: TcpStream) -> transport::Result<Self> {
        let peer = stream.peer_addr().map_err(io_error)?;
        let (reader, writer) = stream.into_split();
        debug!(%peer, "tcp transport open");
        Ok(Self {
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

fn io_error(e: std::io::Error) -> transport::Error {
    match e.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::UnexpectedEof => transport::Error::ConnectionLost(e.to_string()),
        _ => transport::Error::Io(e.to_string()),
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        let header = frame::header(payload.len())
            .map_err(|_| transport::Error::PayloadTooLarge(payload.len()))?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&header).await.map_err(io_error)?;
        writer.write_all(payload).await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut reader = self.reader.lock().await;
        let mut header = [0u8; frame::HEADER_LEN];
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(io_error(e)),
        }
        let len = frame::payload_len(header)
            .map_err(|_| transport::Error::PayloadTooLarge(u32::from_le_bytes(header) as usize))?;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await.map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                transport::Error::ConnectionLost("stream ended inside a frame".into())
            }
            _ => io_error(e),
        })?;
        Ok(Some(payload))
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(peer = %self.peer, error = %e, "tcp shutdown failed");
        }
    }
}
