//! Transaction sessions driven by a remote caller.
//!
//! `begin` runs a transaction whose attempt callback publishes the live
//! [`Transaction`] under the session key, emits `update`, then waits for the
//! caller to deliver a command buffer through `apply_buffer`. The buffer is
//! replayed against the attempt and the attempt returns, which commits it. A
//! retried attempt publishes a fresh session and waits for a fresh buffer.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_channel::{Receiver, Sender};

use crate::firestore::api::{FirestoreClient, Transaction, TransactionOptions};
use crate::firestore::error::{deadline_exceeded, internal_error, FirestoreResult};
use crate::platform::runtime;

use super::batch::{apply_writes, WriteDescriptor};
use super::events::{BridgeEvent, EventEmitter, TransactionEventBody, TransactionId};
use super::snapshot::DocumentSnapshotWire;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub app_name: String,
    pub database_id: String,
    pub transaction_id: TransactionId,
}

impl SessionKey {
    pub fn new(app_name: &str, database_id: &str, transaction_id: TransactionId) -> Self {
        Self {
            app_name: app_name.to_string(),
            database_id: database_id.to_string(),
            transaction_id,
        }
    }
}

struct Session {
    handle: Transaction,
    buffer_sender: Sender<Vec<WriteDescriptor>>,
    buffer_receiver: Receiver<Vec<WriteDescriptor>>,
}

#[derive(Default)]
pub struct TransactionRegistry {
    sessions: Mutex<HashMap<SessionKey, Session>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs a bridged transaction to completion, emitting lifecycle events on the way.
    pub async fn begin(
        &self,
        client: &FirestoreClient,
        emitter: &dyn EventEmitter,
        key: SessionKey,
        options: TransactionOptions,
        buffer_timeout: Option<Duration>,
    ) -> FirestoreResult<()> {
        let emit = |body: TransactionEventBody| {
            emitter.emit(BridgeEvent::transaction(
                &key.app_name,
                &key.database_id,
                &key.transaction_id,
                body,
            ))
        };

        let result = client
            .run_transaction_with_options(options, |mut transaction| {
                let (sender, receiver) = async_channel::bounded(1);
                self.sessions().insert(
                    key.clone(),
                    Session {
                        handle: transaction.clone(),
                        buffer_sender: sender.clone(),
                        buffer_receiver: receiver.clone(),
                    },
                );
                emit(TransactionEventBody::Update);
                let firestore = client.firestore().clone();
                let transaction_id = key.transaction_id.clone();
                async move {
                    // Keep a sender alive so disposing the session does not close the channel.
                    let _sender = sender;
                    let writes = match runtime::with_deadline(receiver.recv(), buffer_timeout).await {
                        Some(Ok(writes)) => writes,
                        Some(Err(_)) => return Err(internal_error("Transaction command buffer channel closed")),
                        None => {
                            log::warn!("transaction {transaction_id} timed out waiting for its command buffer");
                            return Err(deadline_exceeded(format!(
                                "Transaction {transaction_id} did not receive a command buffer in time"
                            )));
                        }
                    };
                    apply_writes(&firestore, &mut transaction, writes)
                }
            })
            .await;

        self.sessions().remove(&key);
        match &result {
            Ok(()) => emit(TransactionEventBody::Complete),
            Err(err) => emit(TransactionEventBody::Error { error: err.to_native() }),
        }
        result
    }

    /// Reads through the live attempt registered under `key`.
    pub async fn get_document(&self, key: &SessionKey, path: &str) -> FirestoreResult<DocumentSnapshotWire> {
        let handle = self
            .sessions()
            .get(key)
            .map(|session| session.handle.clone())
            .ok_or_else(|| internal_error("An internal error occurred"))?;
        let reference = handle.firestore().doc(path)?;
        let snapshot = handle.get(&reference).await?;
        Ok(DocumentSnapshotWire::from(&snapshot))
    }

    /// Hands `writes` to the attempt registered under `key`, replacing any buffer
    /// it has not consumed yet. Dropped when no attempt is registered.
    pub fn apply_buffer(&self, key: &SessionKey, writes: Vec<WriteDescriptor>) {
        let sessions = self.sessions();
        let Some(session) = sessions.get(key) else {
            log::debug!(
                "dropping command buffer for transaction {}: no attempt is active",
                key.transaction_id
            );
            return;
        };
        while session.buffer_receiver.try_recv().is_ok() {}
        if session.buffer_sender.try_send(writes).is_err() {
            log::debug!("transaction {} is no longer accepting a command buffer", key.transaction_id);
        }
    }

    /// Forgets the session. An attempt already waiting keeps waiting for its deadline.
    pub fn dispose(&self, key: &SessionKey) {
        self.sessions().remove(key);
    }

    /// Forgets every session belonging to `app_name`.
    pub fn dispose_app(&self, app_name: &str) {
        self.sessions().retain(|key, _| key.app_name != app_name);
    }

    pub fn is_active(&self, key: &SessionKey) -> bool {
        self.sessions().contains_key(key)
    }
}
