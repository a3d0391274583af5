//! # kclient
//!
//! Client runtime for a kRPC-style server: typed calls over a request/response
//! channel, and server-pushed streams over a second channel.
//!
//! ## Architecture
//!
//! ```text
//!   Client ──► RpcChannel ──► Transport (rpc)    ◄── pump task (responses, FIFO)
//!      │
//!      └────► StreamManager ◄── receiver task ◄── Transport (stream)
//! ```
//!
//! - `codec` maps Rust values to `kpack` items; `kproto` frames them.
//! - `Client::invoke` sends one call and waits for its result.
//! - `Client::add_stream` registers a call the server re-runs and pushes;
//!   `Stream<T>` reads the latest value without blocking or waits for the next.
//! - Server faults become `Error::Rpc`, typed through the connection's
//!   `ExceptionRegistry`.
//!
//! ```ignore
//! let client = kclient::connect(&ClientConfig::new("telemetry")).await?;
//! let krpc = client.krpc();
//! let paused = krpc.paused_stream().await?;
//! println!("paused: {:?}", paused.get()?);
//! ```

pub use kpack;
pub use kproto;

mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod memory;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod object;
pub mod registry;
pub mod service;
pub mod services;
pub mod stream;
pub mod tcp;
pub mod transport;


pub use client::Client;
pub use client::WeakClient;
pub use codec::Bytes;
pub use codec::Decode;
pub use codec::Encode;
pub use codec::decode;
pub use codec::encode;
pub use config::ClientConfig;
pub use error::EncodingError;
pub use error::EncodingErrorKind;
pub use error::Error;
pub use error::Result;
pub use error::RpcError;
pub use error::StreamError;
pub use event::Event;
pub use kproto::ProcedureCall;
pub use object::ConnectionId;
pub use object::ObjectRef;
pub use object::RemoteObject;
pub use registry::ExceptionRegistry;
pub use service::Service;
pub use services::krpc::KRPC;
pub use stream::CallbackId;
pub use stream::Stream;
pub use stream::StreamFreeze;
pub use transport::Transport;

/// Connects to the server described by `config`.
pub async fn connect(config: &ClientConfig) -> Result<Client> {
    Client::connect(config).await
}
