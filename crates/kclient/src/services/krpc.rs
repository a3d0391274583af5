//! # KRPC Service
//!
//! The core service: server status, stream and event management, and the
//! expression builders events are made of.

use kproto::EventInfo;
use kproto::ProcedureCall;
use kproto::Services;
use kproto::Status;
use kproto::StreamInfo;

use crate::client::Client;
use crate::codec::Bytes;
use crate::codec::encode;
use crate::error::Result;
use crate::event::Event;
use crate::registry::ExceptionRegistry;
use crate::service::Service;
use crate::stream::Stream;

crate::define_exception! {
    /// An argument was invalid.
    pub struct ArgumentException;
}

crate::define_exception! {
    /// A required argument was null.
    pub struct ArgumentNullException;
}

crate::define_exception! {
    /// An argument was outside its allowed range.
    pub struct ArgumentOutOfRangeException;
}

crate::define_exception! {
    /// The call is not valid in the current game state.
    pub struct InvalidOperationException;
}

crate::remote_enum! {
    /// The scene the game is showing.
    pub enum GameScene {
        SpaceCenter = 0,
        Flight = 1,
        TrackingStation = 2,
        EditorVab = 3,
        EditorSph = 4,
    }
}

crate::remote_class! {
    /// A server-side expression tree, used to build events.
    pub struct Expression = "KRPC.Expression";
}

/// One connected client as reported by the server: identifier, name, address.
pub type ClientInfo = (Bytes, String, String);

#[derive(Debug, Clone)]
pub struct KRPC {
    client: Client,
}

impl Service for KRPC {
    const NAME: &'static str = "KRPC";

    fn new(client: Client) -> Self {
        Self { client }
    }

    fn register_exceptions(registry: &ExceptionRegistry) {
        registry.register(Self::NAME, "ArgumentException", ArgumentException::new);
        registry.register(Self::NAME, "ArgumentNullException", ArgumentNullException::new);
        registry.register(Self::NAME, "ArgumentOutOfRangeException", ArgumentOutOfRangeException::new);
        registry.register(Self::NAME, "InvalidOperationException", InvalidOperationException::new);
    }
}

impl KRPC {
    fn call(&self, procedure: &str, args: Vec<Vec<u8>>) -> ProcedureCall {
        self.client.build_call(Self::NAME, procedure, args)
    }

    // ========================================================================
    //  STREAM MANAGEMENT
    // ========================================================================

    /// Registers a stream for `call`. Most code wants `Client::add_stream`.
    pub async fn add_stream(&self, call: &ProcedureCall, start: bool) -> Result<StreamInfo> {
        let call = self.call("AddStream", vec![encode(call)?, encode(&start)?]);
        self.client.call(&call).await
    }

    pub async fn start_stream(&self, id: u64) -> Result<()> {
        let call = self.call("StartStream", vec![encode(&id)?]);
        self.client.invoke_call(&call).await.map(|_| ())
    }

    /// Sets the update rate of a stream in Hz; 0 means every server update.
    pub async fn set_stream_rate(&self, id: u64, rate: f32) -> Result<()> {
        let call = self.call("SetStreamRate", vec![encode(&id)?, encode(&rate)?]);
        self.client.invoke_call(&call).await.map(|_| ())
    }

    pub async fn remove_stream(&self, id: u64) -> Result<()> {
        let call = self.call("RemoveStream", vec![encode(&id)?]);
        self.client.invoke_call(&call).await.map(|_| ())
    }

    /// Creates an event that fires when `expression` becomes true.
    pub async fn add_event(&self, expression: &Expression) -> Result<Event> {
        let info: EventInfo = self.client.call(&self.add_event_call(expression)?).await?;
        Event::new(&self.client, info)
    }

    pub fn add_event_call(&self, expression: &Expression) -> Result<ProcedureCall> {
        Ok(self.call("AddEvent", vec![encode(expression)?]))
    }

    // ========================================================================
    //  SERVER INFORMATION
    // ========================================================================

    pub async fn get_client_id(&self) -> Result<Bytes> {
        self.client.call(&self.get_client_id_call()).await
    }

    pub fn get_client_id_call(&self) -> ProcedureCall {
        self.call("GetClientID", Vec::new())
    }

    pub async fn get_client_name(&self) -> Result<String> {
        self.client.call(&self.get_client_name_call()).await
    }

    pub fn get_client_name_call(&self) -> ProcedureCall {
        self.call("GetClientName", Vec::new())
    }

    pub async fn get_status(&self) -> Result<Status> {
        self.client.call(&self.get_status_call()).await
    }

    pub fn get_status_call(&self) -> ProcedureCall {
        self.call("GetStatus", Vec::new())
    }

    pub async fn get_status_stream(&self) -> Result<Stream<Status>> {
        self.client.add_stream(&self.get_status_call(), true).await
    }

    /// Every service, procedure, class and enumeration the server provides.
    pub async fn get_services(&self) -> Result<Services> {
        self.client.call(&self.get_services_call()).await
    }

    pub fn get_services_call(&self) -> ProcedureCall {
        self.call("GetServices", Vec::new())
    }

    pub async fn clients(&self) -> Result<Vec<ClientInfo>> {
        self.client.call(&self.clients_call()).await
    }

    pub fn clients_call(&self) -> ProcedureCall {
        self.call("get_Clients", Vec::new())
    }

    pub async fn clients_stream(&self) -> Result<Stream<Vec<ClientInfo>>> {
        self.client.add_stream(&self.clients_call(), true).await
    }

    pub async fn current_game_scene(&self) -> Result<GameScene> {
        self.client.call(&self.current_game_scene_call()).await
    }

    pub fn current_game_scene_call(&self) -> ProcedureCall {
        self.call("get_CurrentGameScene", Vec::new())
    }

    pub async fn current_game_scene_stream(&self) -> Result<Stream<GameScene>> {
        self.client.add_stream(&self.current_game_scene_call(), true).await
    }

    pub async fn paused(&self) -> Result<bool> {
        self.client.call(&self.paused_call()).await
    }

    pub fn paused_call(&self) -> ProcedureCall {
        self.call("get_Paused", Vec::new())
    }

    pub async fn paused_stream(&self) -> Result<Stream<bool>> {
        self.client.add_stream(&self.paused_call(), true).await
    }

    pub async fn set_paused(&self, paused: bool) -> Result<()> {
        let call = self.call("set_Paused", vec![encode(&paused)?]);
        self.client.invoke_call(&call).await.map(|_| ())
    }
}

// ============================================================================
//  EXPRESSIONS
// ============================================================================

impl Expression {
    async fn build(client: &Client, procedure: &str, args: Vec<Vec<u8>>) -> Result<Expression> {
        let call = client.build_call(KRPC::NAME, &format!("Expression_static_{}", procedure), args);
        client.call(&call).await
    }

    pub async fn constant_bool(client: &Client, value: bool) -> Result<Expression> {
        Self::build(client, "ConstantBool", vec![encode(&value)?]).await
    }

    pub async fn constant_int(client: &Client, value: i32) -> Result<Expression> {
        Self::build(client, "ConstantInt", vec![encode(&value)?]).await
    }

    pub async fn constant_double(client: &Client, value: f64) -> Result<Expression> {
        Self::build(client, "ConstantDouble", vec![encode(&value)?]).await
    }

    pub async fn constant_string(client: &Client, value: &str) -> Result<Expression> {
        Self::build(client, "ConstantString", vec![encode(value)?]).await
    }

    /// An expression evaluating `call` on the server.
    pub async fn call(client: &Client, call: &ProcedureCall) -> Result<Expression> {
        Self::build(client, "Call", vec![encode(call)?]).await
    }

    pub async fn equal(client: &Client, a: &Expression, b: &Expression) -> Result<Expression> {
        Self::build(client, "Equal", vec![encode(a)?, encode(b)?]).await
    }

    pub async fn not_equal(client: &Client, a: &Expression, b: &Expression) -> Result<Expression> {
        Self::build(client, "NotEqual", vec![encode(a)?, encode(b)?]).await
    }

    pub async fn greater_than(client: &Client, a: &Expression, b: &Expression) -> Result<Expression> {
        Self::build(client, "GreaterThan", vec![encode(a)?, encode(b)?]).await
    }

    pub async fn less_than(client: &Client, a: &Expression, b: &Expression) -> Result<Expression> {
        Self::build(client, "LessThan", vec![encode(a)?, encode(b)?]).await
    }

    pub async fn and(client: &Client, a: &Expression, b: &Expression) -> Result<Expression> {
        Self::build(client, "And", vec![encode(a)?, encode(b)?]).await
    }

    pub async fn or(client: &Client, a: &Expression, b: &Expression) -> Result<Expression> {
        Self::build(client, "Or", vec![encode(a)?, encode(b)?]).await
    }

    pub async fn not(client: &Client, a: &Expression) -> Result<Expression> {
        Self::build(client, "Not", vec![encode(a)?]).await
    }
}
