//! # RPC Channel with Async Pump
//!
//! The server answers requests strictly in the order they were sent, so
//! responses are matched to callers by position: every send pushes a reply slot
//! onto a FIFO queue, and the pump task pops the front slot for each response.
//!
//! ## Invariants
//! - Pushing the slot and writing the frame happen under one lock, so queue
//!   order always equals wire order.
//! - A caller that gives up (timeout, cancellation) leaves its slot in the
//!   queue; the pump still pops it and discards the response, keeping later
//!   callers aligned.
//! - Once the pump stops, every queued and future caller gets `Disconnected`,
//!   every stream of the connection is failed and shutdown is signalled, so the
//!   stream receiver stops too.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::stream::StreamManager;
use crate::transport::Transport;

type ReplySlot = oneshot::Sender<Vec<u8>>;

struct Pending {
    closed: bool,
    slots: VecDeque<ReplySlot>,
}

pub(crate) struct RpcChannel {
    transport: Arc<dyn Transport>,
    send_lock: Mutex<()>,
    pending: StdMutex<Pending>,
}

impl RpcChannel {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            send_lock: Mutex::new(()),
            pending: StdMutex::new(Pending { closed: false, slots: VecDeque::new() }),
        }
    }

    /// A channel that was never open.
    pub(crate) fn closed(transport: Arc<dyn Transport>) -> Self {
        let channel = Self::new(transport);
        channel.lock_pending().closed = true;
        channel
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock_pending().closed
    }

    /// Sends one request frame and waits for its response frame.
    pub(crate) async fn roundtrip(&self, payload: &[u8], timeout: Option<Duration>) -> Result<Vec<u8>> {
        let reply = {
            let _sending = self.send_lock.lock().await;
            let (tx, rx) = oneshot::channel();
            {
                let mut pending = self.lock_pending();
                if pending.closed {
                    return Err(Error::Disconnected);
                }
                pending.slots.push_back(tx);
            }
            if let Err(e) = self.transport.send(payload).await {
                // nothing reached the server, so no response will come for this slot
                self.lock_pending().slots.pop_back();
                return Err(e.into());
            }
            rx
        };

        let reply = match timeout {
            Some(limit) => tokio::time::timeout(limit, reply).await.map_err(|_| Error::Timeout)?,
            None => reply.await,
        };
        reply.map_err(|_| Error::Disconnected)
    }

    /// Marks the channel closed and fails every waiting caller.
    pub(crate) fn fail_all(&self) {
        let slots = {
            let mut pending = self.lock_pending();
            pending.closed = true;
            std::mem::take(&mut pending.slots)
        };
        if !slots.is_empty() {
            debug!(waiting = slots.len(), "failing calls on closed channel");
        }
        // dropping the senders wakes each receiver with an error
        drop(slots);
    }

    fn deliver(&self, response: Vec<u8>) {
        let slot = self.lock_pending().slots.pop_front();
        match slot {
            Some(tx) => {
                if tx.send(response).is_err() {
                    trace!("discarding response for abandoned call");
                }
            }
            None => warn!(len = response.len(), "unsolicited response on rpc channel"),
        }
    }
}

/// Reads responses until the transport ends or shutdown is signalled, then
/// tears the whole connection down.
pub(crate) async fn pump(
    channel: Arc<RpcChannel>,
    streams: Arc<StreamManager>,
    shutdown: Arc<watch::Sender<bool>>,
) {
    let mut stop = shutdown.subscribe();
    loop {
        let msg = tokio::select! {
            _ = async { let _ = stop.wait_for(|s| *s).await; } => {
                debug!("rpc pump stopping on shutdown");
                break;
            }
            msg = channel.transport.recv() => msg,
        };
        match msg {
            Ok(Some(response)) => channel.deliver(response),
            Ok(None) => {
                debug!("rpc channel closed by server");
                break;
            }
            Err(e) => {
                warn!(error = %e, "rpc channel failed");
                break;
            }
        }
    }
    channel.fail_all();
    streams.disconnect();
    shutdown.send_replace(true);
    channel.transport.close().await;
}
