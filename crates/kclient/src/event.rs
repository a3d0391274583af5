//! # Events
//!
//! An event is a server-side boolean expression evaluated as a stream. It
//! fires when the expression becomes true.

use std::time::Duration;

use kproto::EventInfo;

use crate::client::Client;
use crate::error::Result;
use crate::stream::CallbackId;
use crate::stream::Stream;

/// Equal to another `Event` on the same server stream.
#[derive(Debug, PartialEq, Eq)]
pub struct Event {
    stream: Stream<bool>,
}

impl Event {
    pub(crate) fn new(client: &Client, info: EventInfo) -> Result<Self> {
        Ok(Self { stream: client.stream_from_id(info.stream.id)? })
    }

    /// The underlying boolean stream.
    pub fn stream(&self) -> &Stream<bool> {
        &self.stream
    }

    pub async fn start(&self) -> Result<()> {
        self.stream.start().await
    }

    /// Starts the event if needed and waits until the condition holds.
    ///
    /// Returns at once if the last received value was already true.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.wait_for(|fired| *fired, timeout).await.map(|_| ())
    }

    /// Runs `callback` each time an update reports the condition true.
    pub fn add_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stream.add_callback(move |value| {
            if matches!(value, Ok(true)) {
                callback();
            }
        })
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        self.stream.remove_callback(id)
    }

    pub async fn remove(&self) -> Result<()> {
        self.stream.remove().await
    }
}
