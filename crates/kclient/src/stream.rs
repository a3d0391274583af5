//! # Streams
//!
//! Server-pushed results of a registered procedure call.
//!
//! ## Architecture
//!
//! The server runs each registered call periodically and pushes the results on
//! the stream channel. A receiver task decodes each `StreamUpdate` and stores
//! every result in the slot of its stream. Readers never touch the channel: they
//! read the slot, or wait for it to change.
//!
//! ```text
//!   stream channel ──► receiver task ──► StreamState.slot (watch) ──► Stream<T>::get / wait
//!                           │
//!                           └──► stream callbacks, client-wide update counter and callbacks
//! ```
//!
//! `Client::freeze_streams` holds back the receiver so that several streams can
//! be read against the same update.
//!
//! ## Invariants
//! - Slots are written by the receiver task only, so the sequence number of a
//!   slot only grows and readers never observe an older value after a newer one.
//! - `Removed` and `Disconnected` are final: no update overwrites them.
//! - The server deduplicates identical calls, so several handles can share one
//!   server stream. The state counts its handles and only the last `remove()`
//!   asks the server to drop it.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use kproto::Fault;
use kproto::ProcedureCall;
use kproto::ProcedureResult;
use kproto::StreamResult;
use kproto::StreamUpdate;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::client::Client;
use crate::codec;
use crate::codec::Decode;
use crate::error::Error;
use crate::error::Result;
use crate::error::StreamError;
use crate::transport::Transport;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `fut`, failing with `Error::Timeout` once `timeout` elapses.
pub(crate) async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| Error::Timeout)?,
        None => fut.await,
    }
}

/// The latest known result of a stream.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    /// Registered, no result received yet.
    Pending,
    Value { seq: u64, bytes: Arc<[u8]> },
    /// The call itself failed on the server.
    Failed { seq: u64, fault: Fault },
    Removed,
    Disconnected,
}

impl Slot {
    fn seq(&self) -> u64 {
        match self {
            Self::Value { seq, .. } | Self::Failed { seq, .. } => *seq,
            _ => 0,
        }
    }

    fn is_final(&self) -> bool {
        matches!(self, Self::Removed | Self::Disconnected)
    }
}

type Callback = Arc<dyn Fn(&Slot) + Send + Sync>;
type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by `Stream::add_callback` and
/// `Client::add_stream_update_callback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

pub(crate) struct StreamState {
    id: u64,
    call: Option<ProcedureCall>,
    started: AtomicBool,
    /// Updates per second, 0 meaning as fast as the server runs.
    rate: StdMutex<f32>,
    /// Live handles. Only changed under the manager's table lock.
    handles: AtomicU64,
    slot: watch::Sender<Slot>,
    callbacks: StdMutex<BTreeMap<u64, Callback>>,
    next_callback: AtomicU64,
}

impl StreamState {
    fn new(id: u64, call: Option<ProcedureCall>, started: bool) -> Self {
        let (slot, _) = watch::channel(Slot::Pending);
        Self {
            id,
            call,
            started: AtomicBool::new(started),
            rate: StdMutex::new(0.0),
            handles: AtomicU64::new(0),
            slot,
            callbacks: StdMutex::new(BTreeMap::new()),
            next_callback: AtomicU64::new(1),
        }
    }

    /// Stores a pushed result. Returns false once the slot is final.
    fn publish(&self, result: ProcedureResult) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.is_final() {
                return false;
            }
            let seq = slot.seq() + 1;
            *slot = match result.0 {
                Ok(bytes) => Slot::Value { seq, bytes: bytes.into() },
                Err(fault) => Slot::Failed { seq, fault },
            };
            true
        })
    }

    fn finish(&self, end: Slot) {
        self.slot.send_if_modified(|slot| {
            if slot.is_final() {
                return false;
            }
            *slot = end;
            true
        });
    }

    fn run_callbacks(&self) {
        let callbacks: Vec<Callback> = lock(&self.callbacks).values().cloned().collect();
        if callbacks.is_empty() {
            return;
        }
        let slot = self.slot.borrow().clone();
        for callback in callbacks {
            callback(&slot);
        }
    }
}

struct StreamTable {
    disconnected: bool,
    by_id: HashMap<u64, Arc<StreamState>>,
}

/// All streams of one connection.
pub(crate) struct StreamManager {
    available: bool,
    /// Held across `AddStream`, across the last `RemoveStream` and while
    /// applying an update, so an update for a stream that is being registered
    /// is applied only after its state exists, and a re-registration never
    /// races the removal of the same server stream.
    registration: Mutex<()>,
    /// Held while applying an update, and by a `StreamFreeze`. Taken before
    /// `registration`.
    frozen: Arc<Mutex<()>>,
    table: StdMutex<StreamTable>,
    /// Counts applied updates, for `Client::wait_for_stream_update`.
    updates: watch::Sender<u64>,
    update_callbacks: StdMutex<BTreeMap<u64, UpdateCallback>>,
    next_update_callback: AtomicU64,
}

/// Holds back stream updates until dropped or thawed.
///
/// While frozen, `Stream::get` on any stream of the connection reads values
/// from the same update. Waiting for an update while frozen only returns once
/// the freeze ends.
#[must_use = "updates resume as soon as the freeze is dropped"]
pub struct StreamFreeze {
    _guard: OwnedMutexGuard<()>,
}

impl StreamFreeze {
    /// Lets the receiver apply updates again.
    pub fn thaw(self) {}
}

impl std::fmt::Debug for StreamFreeze {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamFreeze").finish_non_exhaustive()
    }
}

impl StreamManager {
    pub(crate) fn new(available: bool) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            available,
            registration: Mutex::new(()),
            frozen: Arc::new(Mutex::new(())),
            table: StdMutex::new(StreamTable { disconnected: false, by_id: HashMap::new() }),
            updates,
            update_callbacks: StdMutex::new(BTreeMap::new()),
            next_update_callback: AtomicU64::new(1),
        }
    }

    pub(crate) fn check_available(&self) -> Result<()> {
        if !self.available {
            return Err(StreamError::Unavailable.into());
        }
        if self.is_disconnected() {
            return Err(StreamError::Disconnected.into());
        }
        Ok(())
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        lock(&self.table).disconnected
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.table).by_id.len()
    }

    pub(crate) async fn lock_registration(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.registration.lock().await
    }

    pub(crate) fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    pub(crate) async fn freeze(&self) -> StreamFreeze {
        StreamFreeze { _guard: self.frozen.clone().lock_owned().await }
    }

    pub(crate) fn add_update_callback(&self, callback: UpdateCallback) -> CallbackId {
        let id = self.next_update_callback.fetch_add(1, Ordering::Relaxed);
        lock(&self.update_callbacks).insert(id, callback);
        CallbackId(id)
    }

    pub(crate) fn remove_update_callback(&self, id: CallbackId) -> bool {
        lock(&self.update_callbacks).remove(&id.0).is_some()
    }

    fn run_update_callbacks(&self) {
        let callbacks: Vec<UpdateCallback> = lock(&self.update_callbacks).values().cloned().collect();
        for callback in callbacks {
            callback();
        }
    }

    /// Adds a handle for server stream `id`, creating its state on first use.
    pub(crate) fn register(
        &self,
        id: u64,
        call: Option<ProcedureCall>,
        started: bool,
    ) -> Result<Arc<StreamState>> {
        let mut table = lock(&self.table);
        if table.disconnected {
            return Err(StreamError::Disconnected.into());
        }
        let state = table
            .by_id
            .entry(id)
            .or_insert_with(|| {
                debug!(id, "tracking stream");
                Arc::new(StreamState::new(id, call, started))
            })
            .clone();
        if started {
            state.started.store(true, Ordering::Release);
        }
        let handles = state.handles.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(id, handles, "stream handle added");
        Ok(state)
    }

    /// Drops one handle. Returns true when it was the last one, in which case
    /// the state is untracked and marked removed.
    pub(crate) fn release(&self, state: &Arc<StreamState>) -> bool {
        let mut table = lock(&self.table);
        let remaining = state.handles.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining > 0 {
            trace!(id = state.id, remaining, "stream handle released");
            return false;
        }
        if table.by_id.get(&state.id).is_some_and(|s| Arc::ptr_eq(s, state)) {
            table.by_id.remove(&state.id);
        }
        drop(table);
        state.finish(Slot::Removed);
        true
    }

    /// Decodes and applies one update frame, then runs the callbacks.
    async fn apply_frame(&self, frame: &[u8]) {
        let changed = {
            let _frozen = self.frozen.lock().await;
            let _registering = self.registration.lock().await;
            match StreamUpdate::decode_each(frame) {
                Ok(results) => self.apply(results),
                Err(e) => {
                    warn!(error = %e, len = frame.len(), "dropping malformed stream update");
                    return;
                }
            }
        };
        self.updates.send_modify(|n| *n += 1);
        for state in changed {
            state.run_callbacks();
        }
        self.run_update_callbacks();
    }

    /// Applies the results of one update. Returns the states that changed.
    fn apply(&self, results: Vec<kproto::Result<StreamResult>>) -> Vec<Arc<StreamState>> {
        let mut changed = Vec::with_capacity(results.len());
        for result in results {
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "skipping malformed stream result");
                    continue;
                }
            };
            let state = lock(&self.table).by_id.get(&result.id).cloned();
            match state {
                Some(state) => {
                    if state.publish(result.result) {
                        changed.push(state);
                    }
                }
                None => trace!(id = result.id, "update for untracked stream"),
            }
        }
        changed
    }

    /// Fails every stream with `Disconnected`. Idempotent.
    pub(crate) fn disconnect(&self) {
        let states: Vec<Arc<StreamState>> = {
            let mut table = lock(&self.table);
            if table.disconnected {
                return;
            }
            table.disconnected = true;
            table.by_id.drain().map(|(_, state)| state).collect()
        };
        debug!(streams = states.len(), "stream connection closed");
        for state in states {
            state.finish(Slot::Disconnected);
        }
        self.updates.send_modify(|n| *n += 1);
    }
}

/// Reads update frames until the channel ends or shutdown is signalled.
pub(crate) async fn receive(
    transport: Arc<dyn Transport>,
    manager: Arc<StreamManager>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let msg = tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                debug!("stream receiver stopping on shutdown");
                break;
            }
            msg = transport.recv() => msg,
        };
        match msg {
            Ok(Some(frame)) => manager.apply_frame(&frame).await,
            Ok(None) => {
                debug!("stream channel closed by server");
                break;
            }
            Err(e) => {
                warn!(error = %e, "stream channel failed");
                break;
            }
        }
    }
    manager.disconnect();
    transport.close().await;
}

/// A typed handle on a server stream.
///
/// Dropping a handle does not unsubscribe: the server keeps the stream until
/// `remove()` is called on every handle sharing it.
pub struct Stream<T> {
    client: Client,
    state: Arc<StreamState>,
    removed: watch::Sender<bool>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.state.id)
            .field("connection", &self.client.connection_id())
            .field("started", &self.is_started())
            .finish()
    }
}

/// Handles are equal when they name the same server stream on the same
/// connection.
impl<T> PartialEq for Stream<T> {
    fn eq(&self, other: &Self) -> bool {
        self.state.id == other.state.id && self.client.connection_id() == other.client.connection_id()
    }
}

impl<T> Eq for Stream<T> {}

impl<T> Stream<T> {
    pub(crate) fn new(client: Client, state: Arc<StreamState>) -> Self {
        let (removed, _) = watch::channel(false);
        Self { client, state, removed, _marker: PhantomData }
    }

    /// The server-assigned stream id.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// The call this stream evaluates. `None` for streams created by id, such
    /// as the one behind an event.
    pub fn call(&self) -> Option<&ProcedureCall> {
        self.state.call.as_ref()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::Acquire)
    }

    /// True until the handle is removed or the connection closes.
    pub fn is_live(&self) -> bool {
        self.check().is_ok()
    }

    fn check(&self) -> Result<()> {
        if *self.removed.borrow() {
            return Err(StreamError::Removed.into());
        }
        match &*self.state.slot.borrow() {
            Slot::Removed => Err(StreamError::Removed.into()),
            Slot::Disconnected => Err(StreamError::Disconnected.into()),
            _ => Ok(()),
        }
    }
}

impl<T: Decode + 'static> Stream<T> {
    fn resolve(&self, slot: &Slot) -> Option<Result<T>> {
        match slot {
            Slot::Pending => None,
            Slot::Value { bytes, .. } => Some(codec::decode(bytes, &self.client)),
            Slot::Failed { fault, .. } => Some(Err(self.client.fault_error(fault.clone()))),
            Slot::Removed => Some(Err(StreamError::Removed.into())),
            Slot::Disconnected => Some(Err(StreamError::Disconnected.into())),
        }
    }

    /// The most recent value, or `None` if no update arrived yet.
    ///
    /// Never blocks and never starts the stream. A server-side failure of the
    /// streamed call is returned as the `Rpc` error it carried.
    pub fn get(&self) -> Result<Option<T>> {
        self.check()?;
        let slot = self.state.slot.borrow().clone();
        self.resolve(&slot).transpose()
    }

    /// Asks the server to start pushing updates. No-op when already started.
    pub async fn start(&self) -> Result<()> {
        self.check()?;
        if self.state.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(id = self.state.id, "starting stream");
        if let Err(e) = self.client.krpc().start_stream(self.state.id).await {
            self.state.started.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Starts the stream and waits until it holds a value.
    pub async fn start_and_wait(&self, timeout: Option<Duration>) -> Result<T> {
        self.wait_for(|_| true, timeout).await
    }

    /// Current update rate in Hz; 0 means every server update.
    pub fn rate(&self) -> f32 {
        *lock(&self.state.rate)
    }

    pub async fn set_rate(&self, hz: f32) -> Result<()> {
        self.check()?;
        self.client.krpc().set_stream_rate(self.state.id, hz).await?;
        *lock(&self.state.rate) = hz;
        Ok(())
    }

    /// Waits for the next update after this call and returns its value.
    ///
    /// Starts the stream if needed. Fails with `Error::Timeout` after `timeout`,
    /// and with a stream error if the stream is removed or the connection closes
    /// while waiting.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<T> {
        self.check()?;
        let rx = self.state.slot.subscribe();
        self.start().await?;
        with_timeout(timeout, self.next_matching(rx, false, |_| true)).await
    }

    /// Waits until the value satisfies `predicate`, checking the current value
    /// first. A failed result, current or later, ends the wait with its error.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&T) -> bool,
        timeout: Option<Duration>,
    ) -> Result<T> {
        self.check()?;
        let rx = self.state.slot.subscribe();
        self.start().await?;
        with_timeout(timeout, self.next_matching(rx, true, predicate)).await
    }

    async fn next_matching(
        &self,
        mut rx: watch::Receiver<Slot>,
        mut check_current: bool,
        accept: impl Fn(&T) -> bool,
    ) -> Result<T> {
        let mut removed = self.removed.subscribe();
        loop {
            if check_current {
                let slot = rx.borrow_and_update().clone();
                match self.resolve(&slot) {
                    Some(Ok(value)) if accept(&value) => return Ok(value),
                    Some(Err(e)) => return Err(e),
                    _ => {}
                }
            }
            check_current = true;
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(StreamError::Disconnected.into());
                    }
                }
                _ = removed.wait_for(|r| *r) => return Err(StreamError::Removed.into()),
            }
        }
    }

    /// Runs `callback` on the receiver task for every update of this stream.
    ///
    /// Callbacks must not block; they run before later updates are applied.
    pub fn add_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(Result<T>) + Send + Sync + 'static,
    {
        let client = self.client.downgrade();
        let wrapped: Callback = Arc::new(move |slot: &Slot| {
            let Some(client) = client.upgrade() else {
                return;
            };
            let value = match slot {
                Slot::Value { bytes, .. } => codec::decode::<T>(bytes, &client),
                Slot::Failed { fault, .. } => Err(client.fault_error(fault.clone())),
                _ => return,
            };
            callback(value);
        });
        let id = self.state.next_callback.fetch_add(1, Ordering::Relaxed);
        lock(&self.state.callbacks).insert(id, wrapped);
        CallbackId(id)
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        lock(&self.state.callbacks).remove(&id.0).is_some()
    }

    /// Removes this handle. Reads on it fail from now on.
    ///
    /// The server stream is removed when the last handle sharing it is removed.
    /// Removing twice is a no-op.
    pub async fn remove(&self) -> Result<()> {
        if self.removed.send_replace(true) {
            return Ok(());
        }
        let streams = self.client.streams();
        let _registering = streams.lock_registration().await;
        if !streams.release(&self.state) || streams.is_disconnected() {
            return Ok(());
        }
        debug!(id = self.state.id, "removing stream");
        match self.client.krpc().remove_stream(self.state.id).await {
            Err(e) if e.is_disconnect() => Ok(()),
            other => other,
        }
    }
}
