//! # Mock Server
//!
//! An in-process server speaking the real protocol, for tests and examples.
//!
//! It implements the stream and event management procedures of the `KRPC`
//! service itself and dispatches every other call to handlers registered with
//! `on`. Stream values are pushed explicitly with `push`, or by `update`, which
//! re-evaluates every started stream through its handler like a server tick.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use kproto::ConnectionKind;
use kproto::ConnectionRequest;
use kproto::ConnectionResponse;
use kproto::ConnectionStatus;
use kproto::EventInfo;
use kproto::Fault;
use kproto::Message;
use kproto::ProcedureCall;
use kproto::ProcedureResult;
use kproto::Request;
use kproto::Response;
use kproto::StreamInfo;
use kproto::StreamResult;
use kproto::StreamUpdate;
use tracing::debug;
use tracing::warn;

use crate::client::Client;
use crate::codec;
use crate::codec::Bytes;
use crate::codec::Decode;
use crate::codec::Encode;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::memory::MemoryTransport;
use crate::transport::Transport;

pub type Handler =
    Arc<dyn Fn(&ProcedureCall) -> std::result::Result<Vec<u8>, Fault> + Send + Sync>;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn argument_fault(message: impl Into<String>) -> Fault {
    Fault::typed("KRPC", "ArgumentException", message)
}

#[derive(Clone)]
struct Route {
    handler: Handler,
    delay: Option<Duration>,
}

struct Session {
    identifier: Vec<u8>,
    name: String,
    rpc: Arc<dyn Transport>,
    stream: Option<Arc<dyn Transport>>,
}

#[derive(Debug, Clone)]
struct MockStream {
    session: Vec<u8>,
    call: ProcedureCall,
    started: bool,
    rate: f32,
}

struct ServerState {
    routes: StdMutex<HashMap<(String, String), Route>>,
    streams: StdMutex<BTreeMap<u64, MockStream>>,
    sessions: StdMutex<Vec<Arc<Session>>>,
    calls: StdMutex<Vec<ProcedureCall>>,
    rejection: StdMutex<Option<(ConnectionStatus, String)>>,
    next_stream: AtomicU64,
    next_session: AtomicU64,
    share_streams: AtomicBool,
    /// Decodes call arguments; never connected.
    codec: Client,
}

/// A scriptable server. Clones share state.
#[derive(Clone)]
pub struct MockServer {
    state: Arc<ServerState>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ServerState {
                routes: StdMutex::new(HashMap::new()),
                streams: StdMutex::new(BTreeMap::new()),
                sessions: StdMutex::new(Vec::new()),
                calls: StdMutex::new(Vec::new()),
                rejection: StdMutex::new(None),
                next_stream: AtomicU64::new(1),
                next_session: AtomicU64::new(1),
                share_streams: AtomicBool::new(true),
                codec: Client::offline("mock"),
            }),
        }
    }

    /// When false, every `AddStream` gets a fresh id even for identical calls.
    pub fn share_streams(self, share: bool) -> Self {
        self.state.share_streams.store(share, Ordering::Relaxed);
        self
    }

    /// Rejects every later handshake with `status`.
    pub fn reject_connections(&self, status: ConnectionStatus, message: impl Into<String>) {
        *lock(&self.state.rejection) = Some((status, message.into()));
    }

    // ========================================================================
    //  ROUTES
    // ========================================================================

    pub fn on<F>(&self, service: &str, procedure: &str, handler: F)
    where
        F: Fn(&ProcedureCall) -> std::result::Result<Vec<u8>, Fault> + Send + Sync + 'static,
    {
        self.route(service, procedure, Arc::new(handler), None);
    }

    /// Like `on`, but the response is held back for `delay`.
    pub fn on_delayed<F>(&self, service: &str, procedure: &str, delay: Duration, handler: F)
    where
        F: Fn(&ProcedureCall) -> std::result::Result<Vec<u8>, Fault> + Send + Sync + 'static,
    {
        self.route(service, procedure, Arc::new(handler), Some(delay));
    }

    /// Answers every call of `service.procedure` with `value`.
    pub fn returns<T: Encode + ?Sized>(&self, service: &str, procedure: &str, value: &T) -> Result<()> {
        let bytes = codec::encode(value)?;
        self.on(service, procedure, move |_| Ok(bytes.clone()));
        Ok(())
    }

    /// Fails every call of `service.procedure` with `fault`.
    pub fn fails(&self, service: &str, procedure: &str, fault: Fault) {
        self.on(service, procedure, move |_| Err(fault.clone()));
    }

    fn route(&self, service: &str, procedure: &str, handler: Handler, delay: Option<Duration>) {
        lock(&self.state.routes)
            .insert((service.to_owned(), procedure.to_owned()), Route { handler, delay });
    }

    /// Decodes argument `position` of a call received by a handler.
    pub fn arg<T: Decode>(&self, call: &ProcedureCall, position: u32) -> std::result::Result<T, Fault> {
        let bytes = call
            .argument(position)
            .ok_or_else(|| argument_fault(format!("missing argument {}", position)))?;
        codec::decode(bytes, &self.state.codec).map_err(|e| argument_fault(e.to_string()))
    }

    // ========================================================================
    //  INSPECTION
    // ========================================================================

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<ProcedureCall> {
        lock(&self.state.calls).clone()
    }

    pub fn call_count(&self, service: &str, procedure: &str) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|c| c.service() == service && c.procedure() == procedure)
            .count()
    }

    /// Ids of the streams currently registered.
    pub fn stream_ids(&self) -> Vec<u64> {
        lock(&self.state.streams).keys().copied().collect()
    }

    pub fn is_started(&self, id: u64) -> bool {
        lock(&self.state.streams).get(&id).is_some_and(|s| s.started)
    }

    pub fn stream_rate(&self, id: u64) -> Option<f32> {
        lock(&self.state.streams).get(&id).map(|s| s.rate)
    }

    pub fn session_count(&self) -> usize {
        lock(&self.state.sessions).len()
    }

    // ========================================================================
    //  CONNECTIONS
    // ========================================================================

    /// Connects a client over in-memory transports, with a stream channel.
    pub async fn connect(&self, name: &str) -> Result<Client> {
        self.connect_with(&ClientConfig::new(name)).await
    }

    /// Connects a client over in-memory transports. `config.stream_port == 0`
    /// opens no stream channel; the other addressing fields are ignored.
    pub async fn connect_with(&self, config: &ClientConfig) -> Result<Client> {
        let (client_rpc, server_rpc) = MemoryTransport::pair();
        let (client_stream, server_stream) = if config.has_streams() {
            let (client, server) = MemoryTransport::pair();
            (
                Some(Box::new(client) as Box<dyn Transport>),
                Some(Arc::new(server) as Arc<dyn Transport>),
            )
        } else {
            (None, None)
        };
        self.spawn_session(Arc::new(server_rpc), server_stream);
        Client::with_transports(config, Box::new(client_rpc), client_stream).await
    }

    /// Serves one client on its own task.
    pub fn spawn_session(&self, rpc: Arc<dyn Transport>, stream: Option<Arc<dyn Transport>>) {
        let server = self.clone();
        tokio::spawn(async move { server.serve(rpc, stream).await });
    }

    /// Runs the handshakes, then answers requests until the client goes away.
    pub async fn serve(&self, rpc: Arc<dyn Transport>, stream: Option<Arc<dyn Transport>>) {
        let Some(session) = self.accept(rpc, stream).await else {
            return;
        };
        lock(&self.state.sessions).push(session.clone());

        while let Ok(Some(frame)) = session.rpc.recv().await {
            let response = match Request::from_bytes(&frame) {
                Ok(request) => {
                    let mut results = Vec::with_capacity(request.calls.len());
                    for call in &request.calls {
                        results.push(self.dispatch(&session, call).await);
                    }
                    Response::with_results(results)
                }
                Err(e) => Response::with_error(Fault::message(format!("malformed request: {}", e))),
            };
            let sent = match response.to_bytes() {
                Ok(bytes) => session.rpc.send(&bytes).await,
                Err(e) => {
                    warn!(error = %e, "mock server cannot encode response");
                    break;
                }
            };
            if sent.is_err() {
                break;
            }
        }

        debug!(client = %session.name, "mock session ended");
        lock(&self.state.sessions).retain(|s| !Arc::ptr_eq(s, &session));
        lock(&self.state.streams).retain(|_, s| s.session != session.identifier);
    }

    async fn accept(
        &self,
        rpc: Arc<dyn Transport>,
        stream: Option<Arc<dyn Transport>>,
    ) -> Option<Arc<Session>> {
        let request = read_request(&*rpc).await?;
        if request.kind != ConnectionKind::Rpc {
            reply(&*rpc, ConnectionResponse::rejected(ConnectionStatus::WrongType, "expected an rpc connection")).await;
            return None;
        }
        let rejection = lock(&self.state.rejection).clone();
        if let Some((status, message)) = rejection {
            reply(&*rpc, ConnectionResponse::rejected(status, message)).await;
            return None;
        }

        let n = self.state.next_session.fetch_add(1, Ordering::Relaxed);
        let mut identifier = vec![0u8; 16];
        identifier[..8].copy_from_slice(&n.to_le_bytes());
        reply(&*rpc, ConnectionResponse::ok(identifier.clone())).await;

        if let Some(stream) = &stream {
            let request = read_request(&**stream).await?;
            if request.kind != ConnectionKind::Stream || request.client_identifier != identifier {
                reply(&**stream, ConnectionResponse::rejected(ConnectionStatus::WrongType, "unknown client identifier")).await;
                return None;
            }
            reply(&**stream, ConnectionResponse::ok(identifier.clone())).await;
        }

        debug!(client = %request.client_name, "mock session open");
        Some(Arc::new(Session { identifier, name: request.client_name, rpc, stream }))
    }

    /// Closes every session's channels, as if the server went away.
    pub async fn disconnect(&self) {
        let sessions: Vec<Arc<Session>> = lock(&self.state.sessions).drain(..).collect();
        for session in sessions {
            session.rpc.close().await;
            if let Some(stream) = &session.stream {
                stream.close().await;
            }
        }
        lock(&self.state.streams).clear();
    }

    /// Closes only the rpc channel of every session. Stream channels stay open.
    pub async fn close_rpc(&self) {
        let sessions: Vec<Arc<Session>> = lock(&self.state.sessions).clone();
        for session in sessions {
            session.rpc.close().await;
        }
    }

    // ========================================================================
    //  DISPATCH
    // ========================================================================

    async fn dispatch(&self, session: &Session, call: &ProcedureCall) -> ProcedureResult {
        lock(&self.state.calls).push(call.clone());
        if call.service() == "KRPC" {
            if let Some(result) = self.builtin(session, call).await {
                return ProcedureResult(result);
            }
        }

        let route = lock(&self.state.routes)
            .get(&(call.service().to_owned(), call.procedure().to_owned()))
            .cloned();
        match route {
            Some(route) => {
                if let Some(delay) = route.delay {
                    tokio::time::sleep(delay).await;
                }
                ProcedureResult((route.handler)(call))
            }
            None => ProcedureResult::fault(Fault::message(format!(
                "procedure {}.{} not found",
                call.service(),
                call.procedure()
            ))),
        }
    }

    /// Stream and event management. `None` falls through to the routes.
    async fn builtin(
        &self,
        session: &Session,
        call: &ProcedureCall,
    ) -> Option<std::result::Result<Vec<u8>, Fault>> {
        let result = match call.procedure() {
            "AddStream" => self.add_stream(session, call).await,
            "StartStream" => self.start_stream(call).await,
            "SetStreamRate" => self.set_stream_rate(call),
            "RemoveStream" => self.remove_stream(call),
            "AddEvent" => self.add_event(session, call),
            "GetClientID" => encode_reply(&Bytes(session.identifier.clone())),
            "GetClientName" => encode_reply(&session.name),
            _ => return None,
        };
        Some(result)
    }

    async fn add_stream(&self, session: &Session, call: &ProcedureCall) -> std::result::Result<Vec<u8>, Fault> {
        let target: ProcedureCall = self.arg(call, 0)?;
        let start: bool = self.arg(call, 1)?;
        let id = {
            let mut streams = lock(&self.state.streams);
            let shared = if self.state.share_streams.load(Ordering::Relaxed) {
                streams
                    .iter()
                    .find(|(_, s)| s.session == session.identifier && s.call == target)
                    .map(|(id, _)| *id)
            } else {
                None
            };
            match shared {
                Some(id) => id,
                None => {
                    let id = self.state.next_stream.fetch_add(1, Ordering::Relaxed);
                    streams.insert(id, MockStream {
                        session: session.identifier.clone(),
                        call: target,
                        started: false,
                        rate: 0.0,
                    });
                    id
                }
            }
        };
        if start {
            self.start(id).await;
        }
        encode_reply(&StreamInfo { id })
    }

    async fn start_stream(&self, call: &ProcedureCall) -> std::result::Result<Vec<u8>, Fault> {
        let id: u64 = self.arg(call, 0)?;
        if !lock(&self.state.streams).contains_key(&id) {
            return Err(argument_fault(format!("no stream with id {}", id)));
        }
        self.start(id).await;
        Ok(Vec::new())
    }

    /// Marks a stream started and pushes its first value.
    async fn start(&self, id: u64) {
        let first = {
            let mut streams = lock(&self.state.streams);
            match streams.get_mut(&id) {
                Some(stream) if !stream.started => {
                    stream.started = true;
                    Some(stream.call.clone())
                }
                _ => None,
            }
        };
        if let Some(call) = first {
            if let Some(result) = self.evaluate(&call) {
                self.send_results(id, vec![StreamResult { id, result }]).await;
            }
        }
    }

    fn set_stream_rate(&self, call: &ProcedureCall) -> std::result::Result<Vec<u8>, Fault> {
        let id: u64 = self.arg(call, 0)?;
        let rate: f32 = self.arg(call, 1)?;
        match lock(&self.state.streams).get_mut(&id) {
            Some(stream) => {
                stream.rate = rate;
                Ok(Vec::new())
            }
            None => Err(argument_fault(format!("no stream with id {}", id))),
        }
    }

    fn remove_stream(&self, call: &ProcedureCall) -> std::result::Result<Vec<u8>, Fault> {
        let id: u64 = self.arg(call, 0)?;
        lock(&self.state.streams).remove(&id);
        Ok(Vec::new())
    }

    fn add_event(&self, session: &Session, call: &ProcedureCall) -> std::result::Result<Vec<u8>, Fault> {
        let expression = call.argument(0).ok_or_else(|| argument_fault("missing expression"))?;
        let id = self.state.next_stream.fetch_add(1, Ordering::Relaxed);
        lock(&self.state.streams).insert(id, MockStream {
            session: session.identifier.clone(),
            call: ProcedureCall::new("KRPC", "Expression_evaluate", [expression.to_vec()]),
            started: false,
            rate: 0.0,
        });
        encode_reply(&EventInfo { stream: StreamInfo { id } })
    }

    fn evaluate(&self, call: &ProcedureCall) -> Option<ProcedureResult> {
        let route = lock(&self.state.routes)
            .get(&(call.service().to_owned(), call.procedure().to_owned()))
            .cloned()?;
        Some(ProcedureResult((route.handler)(call)))
    }

    // ========================================================================
    //  PUSH
    // ========================================================================

    /// Pushes `value` as the next result of stream `id`. Returns false when the
    /// stream is unknown or its client has no stream channel.
    pub async fn push<T: Encode + ?Sized>(&self, id: u64, value: &T) -> Result<bool> {
        let bytes = codec::encode(value)?;
        Ok(self.send_results(id, vec![StreamResult { id, result: ProcedureResult::value(bytes) }]).await)
    }

    /// Pushes a failure as the next result of stream `id`.
    pub async fn push_fault(&self, id: u64, fault: Fault) -> bool {
        self.send_results(id, vec![StreamResult { id, result: ProcedureResult::fault(fault) }]).await
    }

    /// Sends `frame` unchanged on every stream channel.
    pub async fn push_raw(&self, frame: &[u8]) {
        let targets: Vec<Arc<dyn Transport>> = lock(&self.state.sessions)
            .iter()
            .filter_map(|s| s.stream.clone())
            .collect();
        for target in targets {
            let _ = target.send(frame).await;
        }
    }

    /// Re-evaluates every started stream and pushes one update per client.
    pub async fn update(&self) {
        let started: Vec<(u64, MockStream)> = lock(&self.state.streams)
            .iter()
            .filter(|(_, s)| s.started)
            .map(|(id, s)| (*id, s.clone()))
            .collect();
        let mut by_session: BTreeMap<Vec<u8>, Vec<StreamResult>> = BTreeMap::new();
        for (id, stream) in started {
            if let Some(result) = self.evaluate(&stream.call) {
                by_session.entry(stream.session).or_default().push(StreamResult { id, result });
            }
        }
        for (session, results) in by_session {
            self.send_to(&session, results).await;
        }
    }

    async fn send_results(&self, id: u64, results: Vec<StreamResult>) -> bool {
        let session = lock(&self.state.streams).get(&id).map(|s| s.session.clone());
        match session {
            Some(session) => self.send_to(&session, results).await,
            None => false,
        }
    }

    async fn send_to(&self, identifier: &[u8], results: Vec<StreamResult>) -> bool {
        let target = lock(&self.state.sessions)
            .iter()
            .find(|s| s.identifier == identifier)
            .and_then(|s| s.stream.clone());
        let Some(target) = target else {
            return false;
        };
        match (StreamUpdate { results }).to_bytes() {
            Ok(frame) => target.send(&frame).await.is_ok(),
            Err(e) => {
                warn!(error = %e, "mock server cannot encode stream update");
                false
            }
        }
    }
}

fn encode_reply<T: Encode + ?Sized>(value: &T) -> std::result::Result<Vec<u8>, Fault> {
    codec::encode(value).map_err(|e| Fault::message(e.to_string()))
}

async fn read_request(transport: &dyn Transport) -> Option<ConnectionRequest> {
    match transport.recv().await {
        Ok(Some(frame)) => match ConnectionRequest::from_bytes(&frame) {
            Ok(request) => Some(request),
            Err(e) => {
                reply(transport, ConnectionResponse::rejected(ConnectionStatus::MalformedMessage, e.to_string())).await;
                None
            }
        },
        _ => None,
    }
}

async fn reply(transport: &dyn Transport, response: ConnectionResponse) {
    match response.to_bytes() {
        Ok(bytes) => {
            if let Err(e) = transport.send(&bytes).await {
                debug!(error = %e, "mock handshake reply failed");
            }
        }
        Err(e) => warn!(error = %e, "mock server cannot encode handshake reply"),
    }
}
