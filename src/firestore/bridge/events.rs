//! Lifecycle events pushed from the bridge to the platform layer.

use std::fmt::{Display, Formatter};

use async_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::firestore::constants::TRANSACTION_EVENT_NAME;
use crate::firestore::error::NativeError;

/// Caller-assigned transaction identifier, numeric or textual on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionId {
    Number(i64),
    Text(String),
}

impl From<i64> for TransactionId {
    fn from(value: i64) -> Self {
        TransactionId::Number(value)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        TransactionId::Text(value.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        TransactionId::Text(value)
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionId::Number(value) => write!(f, "{value}"),
            TransactionId::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransactionEventBody {
    /// An attempt started and is waiting for its command buffer.
    Update,
    Complete,
    Error { error: NativeError },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeEvent {
    pub event_name: &'static str,
    pub body: TransactionEventBody,
    pub app_name: String,
    pub database_id: String,
    pub listener_id: TransactionId,
}

impl BridgeEvent {
    pub fn transaction(
        app_name: &str,
        database_id: &str,
        listener_id: &TransactionId,
        body: TransactionEventBody,
    ) -> Self {
        Self {
            event_name: TRANSACTION_EVENT_NAME,
            body,
            app_name: app_name.to_string(),
            database_id: database_id.to_string(),
            listener_id: listener_id.clone(),
        }
    }
}

/// Fire-and-forget sink for bridge events.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: BridgeEvent);
}

impl<F> EventEmitter for F
where
    F: Fn(BridgeEvent) + Send + Sync,
{
    fn emit(&self, event: BridgeEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded channel.
#[derive(Clone)]
pub struct ChannelEventEmitter {
    sender: Sender<BridgeEvent>,
}

impl ChannelEventEmitter {
    pub fn new() -> (Self, Receiver<BridgeEvent>) {
        let (sender, receiver) = async_channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl EventEmitter for ChannelEventEmitter {
    fn emit(&self, event: BridgeEvent) {
        if self.sender.try_send(event).is_err() {
            log::debug!("dropping bridge event: no receiver is listening");
        }
    }
}
