//! In-process transports.
//!
//! A connected pair of channels, used to run a client against an in-process
//! server without sockets.

use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;

/// One end of a duplex in-memory channel.
///
/// Messages sent on one end appear on the other end's `recv()`. Closing an end
/// drops its sender, so the peer sees end of stream once it has drained what
/// was already sent.
pub struct MemoryTransport {
    tx: StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryTransport {
    /// Creates a pair of transports connected to each other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: StdMutex::new(Some(tx_a)),
            rx: Mutex::new(rx_b),
        };

        let b = Self {
            tx: StdMutex::new(Some(tx_b)),
            rx: Mutex::new(rx_a),
        };

        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx
                .send(payload.to_vec())
                .map_err(|_| transport::Error::ConnectionLost("Channel closed".into())),
            None => Err(transport::Error::ConnectionLost("Transport closed".into())),
        }
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }

    async fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
