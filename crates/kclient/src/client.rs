//! # Client Connection
//!
//! A `Client` is one connection to the server: an RPC channel for calls, an
//! optional stream channel for pushed updates, and the per-connection state
//! both need (exception registry, stream table).
//!
//! `Client` is a cheap handle; clones share the connection. The background
//! tasks hold only the channel state, never a `Client`, so the connection shuts
//! down when the last handle is dropped or `close()` is called.

use std::error::Error as StdError;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use kproto::ConnectionRequest;
use kproto::ConnectionResponse;
use kproto::ConnectionStatus;
use kproto::Fault;
use kproto::Message;
use kproto::ProcedureCall;
use kproto::Request;
use kproto::Response;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::channel;
use crate::channel::RpcChannel;
use crate::codec;
use crate::codec::Decode;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::error::Result;
use crate::memory::MemoryTransport;
use crate::object::ConnectionId;
use crate::registry::ExceptionRegistry;
use crate::service::Service;
use crate::services::krpc::KRPC;
use crate::stream;
use crate::stream::CallbackId;
use crate::stream::Stream;
use crate::stream::StreamFreeze;
use crate::stream::StreamManager;
use crate::tcp::TcpTransport;
use crate::transport::Transport;

#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

/// A non-owning `Client` handle.
#[derive(Clone)]
pub struct WeakClient {
    inner: Weak<Inner>,
}

impl WeakClient {
    pub fn upgrade(&self) -> Option<Client> {
        self.inner.upgrade().map(|inner| Client { inner })
    }
}

struct Inner {
    id: ConnectionId,
    name: String,
    identifier: Vec<u8>,
    rpc: Arc<RpcChannel>,
    stream_transport: Option<Arc<dyn Transport>>,
    streams: Arc<StreamManager>,
    exceptions: ExceptionRegistry,
    call_timeout: Option<Duration>,
    /// Shared with the pump, which raises it when the rpc channel is lost.
    shutdown: Arc<watch::Sender<bool>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Runs the opening exchange on one channel.
async fn handshake(
    transport: &dyn Transport,
    request: ConnectionRequest,
    timeout: Duration,
) -> Result<ConnectionResponse> {
    let exchange = async {
        transport.send(&request.to_bytes()?).await?;
        let reply = transport.recv().await?.ok_or_else(|| {
            Error::Connection("server closed the connection during the handshake".into())
        })?;
        Ok::<_, Error>(ConnectionResponse::from_bytes(&reply)?)
    };
    let response = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| Error::Connection("handshake timed out".into()))??;
    if response.status != ConnectionStatus::Ok {
        return Err(Error::Connection(format!(
            "{:?} connection refused ({:?}): {}",
            request.kind, response.status, response.message
        )));
    }
    Ok(response)
}

impl Client {
    /// Connects over TCP using `config`.
    pub async fn connect(config: &ClientConfig) -> Result<Client> {
        config.validate()?;
        debug!(address = %config.address, rpc_port = config.rpc_port, "connecting");
        let rpc =
            TcpTransport::connect(&config.address, config.rpc_port, config.connect_timeout).await?;
        let stream: Option<Box<dyn Transport>> = if config.has_streams() {
            let transport =
                TcpTransport::connect(&config.address, config.stream_port, config.connect_timeout)
                    .await?;
            Some(Box::new(transport))
        } else {
            None
        };
        Self::with_transports(config, Box::new(rpc), stream).await
    }

    /// Opens a connection over already established transports.
    ///
    /// Performs both handshakes and spawns the background tasks, so it must
    /// run inside a tokio runtime.
    pub async fn with_transports(
        config: &ClientConfig,
        rpc: Box<dyn Transport>,
        stream: Option<Box<dyn Transport>>,
    ) -> Result<Client> {
        config.validate()?;
        let rpc: Arc<dyn Transport> = Arc::from(rpc);
        let response =
            handshake(&*rpc, ConnectionRequest::rpc(&config.name), config.connect_timeout).await?;
        let identifier = response.client_identifier;

        let stream_transport = match stream {
            Some(transport) => {
                let transport: Arc<dyn Transport> = Arc::from(transport);
                handshake(
                    &*transport,
                    ConnectionRequest::stream(identifier.clone()),
                    config.connect_timeout,
                )
                .await?;
                Some(transport)
            }
            None => None,
        };

        let shutdown = Arc::new(watch::channel(false).0);
        let channel = Arc::new(RpcChannel::new(rpc));
        let streams = Arc::new(StreamManager::new(stream_transport.is_some()));
        tokio::spawn(channel::pump(channel.clone(), streams.clone(), shutdown.clone()));
        if let Some(transport) = &stream_transport {
            tokio::spawn(stream::receive(transport.clone(), streams.clone(), shutdown.subscribe()));
        }

        let client = Self::assemble(config, identifier, channel, stream_transport, streams, shutdown);
        info!(
            connection = %client.connection_id(),
            name = %config.name,
            streams = client.inner.stream_transport.is_some(),
            "connected"
        );
        Ok(client)
    }

    /// A client without a connection.
    ///
    /// Every call fails with `Error::Disconnected` and streams are unavailable,
    /// but values can still be encoded and decoded against it.
    pub fn offline(name: impl Into<String>) -> Client {
        let (transport, _) = MemoryTransport::pair();
        let channel = Arc::new(RpcChannel::closed(Arc::new(transport)));
        let streams = Arc::new(StreamManager::new(false));
        let shutdown = Arc::new(watch::channel(true).0);
        let config = ClientConfig::new(name);
        Self::assemble(&config, Vec::new(), channel, None, streams, shutdown)
    }

    fn assemble(
        config: &ClientConfig,
        identifier: Vec<u8>,
        rpc: Arc<RpcChannel>,
        stream_transport: Option<Arc<dyn Transport>>,
        streams: Arc<StreamManager>,
        shutdown: Arc<watch::Sender<bool>>,
    ) -> Client {
        let exceptions = ExceptionRegistry::new();
        KRPC::register_exceptions(&exceptions);
        Client {
            inner: Arc::new(Inner {
                id: ConnectionId::next(),
                name: config.name.clone(),
                identifier,
                rpc,
                stream_transport,
                streams,
                exceptions,
                call_timeout: config.call_timeout,
                shutdown,
            }),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The identifier the server assigned in the handshake.
    pub fn identifier(&self) -> &[u8] {
        &self.inner.identifier
    }

    pub fn is_closed(&self) -> bool {
        self.inner.rpc.is_closed()
    }

    pub fn has_streams(&self) -> bool {
        self.inner.stream_transport.is_some()
    }

    pub fn downgrade(&self) -> WeakClient {
        WeakClient { inner: Arc::downgrade(&self.inner) }
    }

    pub(crate) fn streams(&self) -> &StreamManager {
        &self.inner.streams
    }

    // ========================================================================
    //  EXCEPTIONS
    // ========================================================================

    pub fn exceptions(&self) -> &ExceptionRegistry {
        &self.inner.exceptions
    }

    /// Maps faults named `service.name` to errors built by `factory`.
    pub fn register_exception<F, E>(&self, service: &str, name: &str, factory: F)
    where
        F: Fn(String) -> E + Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
    {
        self.inner.exceptions.register(service, name, factory);
    }

    pub(crate) fn fault_error(&self, fault: Fault) -> Error {
        Error::Rpc(self.inner.exceptions.to_error(fault))
    }

    /// Returns the proxy for service `S`, registering its exception types.
    pub fn service<S: Service>(&self) -> S {
        S::register_exceptions(&self.inner.exceptions);
        S::new(self.clone())
    }

    /// The core service, always available.
    pub fn krpc(&self) -> KRPC {
        KRPC::new(self.clone())
    }

    // ========================================================================
    //  CALLS
    // ========================================================================

    /// Builds a call descriptor. Performs no I/O.
    pub fn build_call(
        &self,
        service: &str,
        procedure: &str,
        args: impl IntoIterator<Item = Vec<u8>>,
    ) -> ProcedureCall {
        ProcedureCall::new(service, procedure, args)
    }

    /// Builds and invokes a call, returning the encoded result.
    pub async fn invoke(
        &self,
        service: &str,
        procedure: &str,
        args: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<Vec<u8>> {
        self.invoke_call(&self.build_call(service, procedure, args)).await
    }

    /// Invokes a prepared call, returning the encoded result.
    pub async fn invoke_call(&self, call: &ProcedureCall) -> Result<Vec<u8>> {
        self.invoke_one(call, self.inner.call_timeout).await
    }

    pub async fn invoke_with_timeout(&self, call: &ProcedureCall, timeout: Duration) -> Result<Vec<u8>> {
        self.invoke_one(call, Some(timeout)).await
    }

    /// Invokes a call and decodes its result as `T`.
    pub async fn call<T: Decode>(&self, call: &ProcedureCall) -> Result<T> {
        let bytes = self.invoke_call(call).await?;
        codec::decode(&bytes, self)
    }

    /// Sends several calls in one request. Each call succeeds or fails on its own.
    pub async fn invoke_batch(&self, calls: &[ProcedureCall]) -> Result<Vec<Result<Vec<u8>>>> {
        self.send_request(calls, self.inner.call_timeout).await
    }

    async fn invoke_one(&self, call: &ProcedureCall, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let mut results = self.send_request(std::slice::from_ref(call), timeout).await?;
        match results.pop() {
            Some(result) => result,
            None => Err(Error::Protocol(kproto::Error::ProtocolViolation(
                "response carried no result".into(),
            ))),
        }
    }

    async fn send_request(
        &self,
        calls: &[ProcedureCall],
        timeout: Option<Duration>,
    ) -> Result<Vec<Result<Vec<u8>>>> {
        let payload = Request::encode_calls(calls)?;
        if let [call] = calls {
            trace!(service = call.service(), procedure = call.procedure(), "invoke");
        } else {
            trace!(calls = calls.len(), "invoke batch");
        }
        let reply = self.inner.rpc.roundtrip(&payload, timeout).await?;
        let response = Response::from_bytes(&reply)?;
        if let Some(fault) = response.error {
            return Err(self.fault_error(fault));
        }
        response.expect_results(calls.len())?;
        Ok(response
            .results
            .into_iter()
            .map(|result| result.0.map_err(|fault| self.fault_error(fault)))
            .collect())
    }

    // ========================================================================
    //  STREAMS
    // ========================================================================

    /// Registers `call` as a stream and returns a typed handle.
    ///
    /// Identical calls share one server stream. With `start` false the stream
    /// stays dormant until `Stream::start`.
    pub async fn add_stream<T: Decode + 'static>(
        &self,
        call: &ProcedureCall,
        start: bool,
    ) -> Result<Stream<T>> {
        let streams = self.streams();
        streams.check_available()?;
        let _registering = streams.lock_registration().await;
        let info = self.krpc().add_stream(call, start).await?;
        let state = streams.register(info.id, Some(call.clone()), start)?;
        Ok(Stream::new(self.clone(), state))
    }

    /// Wraps a stream the server already created, such as an event's.
    pub fn stream_from_id<T: Decode + 'static>(&self, id: u64) -> Result<Stream<T>> {
        let streams = self.streams();
        streams.check_available()?;
        let state = streams.register(id, None, false)?;
        Ok(Stream::new(self.clone(), state))
    }

    /// Number of distinct server streams with live handles.
    pub fn stream_count(&self) -> usize {
        self.streams().len()
    }

    /// Waits until any stream update arrives on this connection.
    pub async fn wait_for_stream_update(&self, timeout: Option<Duration>) -> Result<()> {
        let streams = self.streams();
        let mut updates = streams.subscribe_updates();
        streams.check_available()?;
        stream::with_timeout(timeout, async {
            updates.changed().await.map_err(|_| Error::Disconnected)?;
            streams.check_available()
        })
        .await
    }

    /// Holds back stream updates until the returned guard is dropped or thawed,
    /// so values read from several streams come from the same update.
    pub async fn freeze_streams(&self) -> StreamFreeze {
        self.streams().freeze().await
    }

    /// Runs `callback` on the receiver task after each applied stream update,
    /// once the per-stream callbacks have run. Callbacks must not block.
    pub fn add_stream_update_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.streams().add_update_callback(Arc::new(callback))
    }

    pub fn remove_stream_update_callback(&self, id: CallbackId) -> bool {
        self.streams().remove_update_callback(id)
    }

    // ========================================================================
    //  SHUTDOWN
    // ========================================================================

    /// Closes both channels.
    ///
    /// Calls in flight fail with `Error::Disconnected`; stream waiters fail with
    /// `StreamError::Disconnected`. Idempotent.
    pub async fn close(&self) {
        if self.inner.shutdown.send_replace(true) && self.inner.rpc.is_closed() {
            return;
        }
        debug!(connection = %self.inner.id, "closing");
        self.inner.rpc.fail_all();
        self.inner.streams.disconnect();
        self.inner.rpc.transport().close().await;
        if let Some(transport) = &self.inner.stream_transport {
            transport.close().await;
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connection", &self.inner.id)
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
