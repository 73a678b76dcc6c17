use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::firestore::api::operations::{self, SetOptions};
use crate::firestore::error::{aborted, invalid_argument, FirestoreResult};
use crate::firestore::model::DocumentKey;
use crate::firestore::remote::datastore::{Datastore, WriteOperation};
use crate::firestore::value::FirestoreValue;
use crate::util::BackoffConfig;

use super::database::Firestore;
use super::reference::DocumentReference;
use super::snapshot::DocumentSnapshot;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry policy for [`FirestoreClient::run_transaction_with_options`](super::FirestoreClient::run_transaction_with_options).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransactionOptions {
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffConfig::default(),
        }
    }
}

/// One attempt of a read-write transaction.
///
/// Reads record the version they observed; writes are buffered and only sent
/// on commit, guarded by a precondition per document read. The handle is cheap
/// to clone and every clone shares the same attempt.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

struct TransactionInner {
    firestore: Firestore,
    datastore: Arc<dyn Datastore>,
    state: Mutex<TransactionState>,
}

#[derive(Default)]
struct TransactionState {
    read_versions: BTreeMap<DocumentKey, Option<u64>>,
    writes: Vec<WriteOperation>,
}

impl Transaction {
    pub(crate) fn new(firestore: Firestore, datastore: Arc<dyn Datastore>) -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                firestore,
                datastore,
                state: Mutex::new(TransactionState::default()),
            }),
        }
    }

    pub fn firestore(&self) -> &Firestore {
        &self.inner.firestore
    }

    fn state(&self) -> MutexGuard<'_, TransactionState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reads a document inside the transaction. All reads must precede all writes.
    pub async fn get(&self, reference: &DocumentReference) -> FirestoreResult<DocumentSnapshot> {
        if !self.state().writes.is_empty() {
            return Err(invalid_argument(
                "Firestore transactions require all reads to be executed before all writes.",
            ));
        }
        let snapshot = self.inner.datastore.get_document(reference.key()).await?;
        let mut state = self.state();
        let version = snapshot.version();
        match state.read_versions.get(reference.key()) {
            Some(previous) if *previous != version => {
                return Err(aborted(format!(
                    "Document {} changed between two reads of the same transaction",
                    reference.path()
                )));
            }
            Some(_) => {}
            None => {
                state.read_versions.insert(reference.key().clone(), version);
            }
        }
        Ok(snapshot)
    }

    pub fn set(
        &self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
        options: Option<SetOptions>,
    ) -> FirestoreResult<()> {
        let encoded = operations::encode_set_data(data, &options.unwrap_or_default())?;
        self.push(WriteOperation::Set {
            key: reference.key().clone(),
            data: encoded.map,
            mask: encoded.mask,
            transforms: encoded.transforms,
        });
        Ok(())
    }

    pub fn update(&self, reference: &DocumentReference, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<()> {
        let encoded = operations::encode_update_data(data)?;
        self.push(WriteOperation::Update {
            key: reference.key().clone(),
            data: encoded.map,
            field_paths: encoded.field_paths,
            transforms: encoded.transforms,
        });
        Ok(())
    }

    pub fn delete(&self, reference: &DocumentReference) -> FirestoreResult<()> {
        self.push(WriteOperation::Delete {
            key: reference.key().clone(),
        });
        Ok(())
    }

    fn push(&self, write: WriteOperation) {
        self.state().writes.push(write);
    }

    /// Sends every buffered write, preceded by a version check for each document read.
    pub(crate) async fn commit(&self) -> FirestoreResult<()> {
        let writes = {
            let mut state = self.state();
            let mut writes: Vec<WriteOperation> = state
                .read_versions
                .iter()
                .map(|(key, version)| WriteOperation::Verify {
                    key: key.clone(),
                    version: *version,
                })
                .collect();
            writes.append(&mut state.writes);
            writes
        };
        if writes.is_empty() {
            return Ok(());
        }
        log::debug!("committing transaction with {} operation(s)", writes.len());
        self.inner.datastore.commit(writes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::remote::datastore::InMemoryDatastore;
    use crate::test_support::test_firestore;

    fn fields(value: i64) -> BTreeMap<String, FirestoreValue> {
        BTreeMap::from([("value".to_string(), FirestoreValue::from_integer(value))])
    }

    #[tokio::test]
    async fn reads_after_writes_are_rejected() {
        let firestore = test_firestore();
        let transaction = Transaction::new(firestore.clone(), Arc::new(InMemoryDatastore::new()));
        let doc = firestore.doc("counters/a").unwrap();
        transaction.set(&doc, fields(1), None).unwrap();
        let err = transaction.get(&doc).await.unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[tokio::test]
    async fn commit_aborts_when_read_document_changed() {
        let firestore = test_firestore();
        let datastore = Arc::new(InMemoryDatastore::new());
        let doc = firestore.doc("counters/a").unwrap();

        let transaction = Transaction::new(firestore.clone(), datastore.clone());
        let snapshot = transaction.get(&doc).await.unwrap();
        assert!(!snapshot.exists());

        let concurrent = Transaction::new(firestore.clone(), datastore.clone());
        concurrent.set(&doc, fields(10), None).unwrap();
        concurrent.commit().await.unwrap();

        transaction.set(&doc, fields(1), None).unwrap();
        let err = transaction.commit().await.unwrap_err();
        assert_eq!(err.code_str(), "firestore/aborted");
    }
}
