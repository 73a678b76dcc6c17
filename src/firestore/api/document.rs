use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::firestore::api::aggregate::{AggregateField, AggregateQuerySnapshot, AggregateSpec};
use crate::firestore::api::operations::{self, SetOptions};
use crate::firestore::api::query::{Query, QuerySnapshot};
use crate::firestore::api::snapshot::{DocumentSnapshot, SnapshotMetadata};
use crate::firestore::error::{invalid_argument, FirestoreErrorCode, FirestoreResult};
use crate::firestore::remote::datastore::{Datastore, InMemoryDatastore, WriteOperation};
use crate::firestore::value::FirestoreValue;
use crate::platform::runtime;
use crate::util::calculate_backoff_millis;

use super::database::Firestore;
use super::transaction::{Transaction, TransactionOptions};
use super::write_batch::WriteBatch;

const COUNT_ALIAS: &str = "count";

/// Executes reads and writes for one [`Firestore`] instance against a [`Datastore`].
#[derive(Clone)]
pub struct FirestoreClient {
    firestore: Firestore,
    datastore: Arc<dyn Datastore>,
}

impl FirestoreClient {
    /// Creates a client backed by the supplied datastore implementation.
    pub fn new(firestore: Firestore, datastore: Arc<dyn Datastore>) -> Self {
        Self { firestore, datastore }
    }

    /// Returns a client that stores documents in memory only.
    pub fn with_in_memory(firestore: Firestore) -> Self {
        Self::new(firestore, Arc::new(InMemoryDatastore::new()))
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    /// Creates a new write batch that targets the same Firestore instance as this client.
    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new(self.firestore.clone(), Arc::clone(&self.datastore))
    }

    /// Fetches the document located at `path`.
    ///
    /// Returns a snapshot that may or may not contain data depending on whether
    /// the document exists.
    pub async fn get_doc(&self, path: &str) -> FirestoreResult<DocumentSnapshot> {
        let reference = self.firestore.doc(path)?;
        self.datastore.get_document(reference.key()).await
    }

    /// Writes the provided map of fields into the document at `path`.
    pub async fn set_doc(
        &self,
        path: &str,
        data: BTreeMap<String, FirestoreValue>,
        options: Option<SetOptions>,
    ) -> FirestoreResult<()> {
        let reference = self.firestore.doc(path)?;
        let encoded = operations::encode_set_data(data, &options.unwrap_or_default())?;
        self.datastore
            .commit(vec![WriteOperation::Set {
                key: reference.key().clone(),
                data: encoded.map,
                mask: encoded.mask,
                transforms: encoded.transforms,
            }])
            .await
    }

    /// Applies a partial update to the document located at `path`.
    ///
    /// Keys of `data` are dot-separated field paths.
    ///
    /// # Errors
    /// Returns `firestore/invalid-argument` if `data` is empty and
    /// `firestore/not-found` if the document does not exist.
    pub async fn update_doc(&self, path: &str, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<()> {
        let reference = self.firestore.doc(path)?;
        let encoded = operations::encode_update_data(data)?;
        self.datastore
            .commit(vec![WriteOperation::Update {
                key: reference.key().clone(),
                data: encoded.map,
                field_paths: encoded.field_paths,
                transforms: encoded.transforms,
            }])
            .await
    }

    /// Deletes the document located at `path`. Succeeds when the document does not exist.
    pub async fn delete_doc(&self, path: &str) -> FirestoreResult<()> {
        let reference = self.firestore.doc(path)?;
        self.datastore
            .commit(vec![WriteOperation::Delete {
                key: reference.key().clone(),
            }])
            .await
    }

    /// Executes the provided query and returns its results.
    pub async fn get_docs(&self, query: &Query) -> FirestoreResult<QuerySnapshot> {
        self.ensure_same_database(query.firestore())?;
        let documents = self.datastore.run_query(query.definition()).await?;
        Ok(QuerySnapshot::new(
            query.clone(),
            documents,
            SnapshotMetadata::new(false, false),
        ))
    }

    /// Executes the provided aggregate specification against `query`.
    pub async fn get_aggregate(&self, query: &Query, spec: AggregateSpec) -> FirestoreResult<AggregateQuerySnapshot> {
        if spec.is_empty() {
            return Err(invalid_argument("Aggregate spec must contain at least one field"));
        }
        self.ensure_same_database(query.firestore())?;
        let data = self.datastore.run_aggregate(query.definition(), &spec).await?;
        Ok(AggregateQuerySnapshot::new(query.clone(), data))
    }

    /// Counts the documents matching `query`, reported under the `count` alias.
    pub async fn get_count(&self, query: &Query) -> FirestoreResult<AggregateQuerySnapshot> {
        let spec = AggregateSpec::new().with_field(COUNT_ALIAS, AggregateField::count())?;
        self.get_aggregate(query, spec).await
    }

    /// Runs `update` inside a transaction with the default retry policy.
    pub async fn run_transaction<F, Fut, T>(&self, update: F) -> FirestoreResult<T>
    where
        F: Fn(Transaction) -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        self.run_transaction_with_options(TransactionOptions::default(), update)
            .await
    }

    /// Runs `update` inside a transaction, retrying the whole function when the
    /// commit is aborted by a concurrent change.
    ///
    /// Errors returned by `update` itself are not retried unless they are `aborted`.
    pub async fn run_transaction_with_options<F, Fut, T>(
        &self,
        options: TransactionOptions,
        update: F,
    ) -> FirestoreResult<T>
    where
        F: Fn(Transaction) -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        if options.max_attempts == 0 {
            return Err(invalid_argument("Max attempts must be at least 1"));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let transaction = Transaction::new(self.firestore.clone(), Arc::clone(&self.datastore));
            let outcome = match update(transaction.clone()).await {
                Ok(value) => transaction.commit().await.map(|()| value),
                Err(err) => Err(err),
            };

            match outcome {
                Err(err) if err.code == FirestoreErrorCode::Aborted && attempt < options.max_attempts => {
                    let delay = calculate_backoff_millis(attempt, options.backoff);
                    log::debug!(
                        "transaction attempt {attempt} aborted ({}); retrying in {delay}ms",
                        err.message()
                    );
                    runtime::sleep(Duration::from_millis(delay)).await;
                }
                other => return other,
            }
        }
    }

    fn ensure_same_database(&self, other: &Firestore) -> FirestoreResult<()> {
        if self.firestore.database_id() != other.database_id() {
            return Err(invalid_argument(
                "Query targets a different Firestore instance than this client",
            ));
        }
        Ok(())
    }
}
