use std::collections::BTreeMap;
use std::sync::Arc;

use crate::firestore::api::operations::{self, SetOptions};
use crate::firestore::error::{invalid_argument, resource_exhausted, FirestoreResult};
use crate::firestore::remote::datastore::{Datastore, WriteOperation};
use crate::firestore::value::FirestoreValue;

use super::database::Firestore;
use super::reference::DocumentReference;

const MAX_BATCH_WRITES: usize = 500;

/// Aggregates write operations and commits them atomically, in insertion order.
#[derive(Clone)]
pub struct WriteBatch {
    firestore: Firestore,
    datastore: Arc<dyn Datastore>,
    writes: Vec<WriteOperation>,
}

impl WriteBatch {
    pub(crate) fn new(firestore: Firestore, datastore: Arc<dyn Datastore>) -> Self {
        Self {
            firestore,
            datastore,
            writes: Vec::new(),
        }
    }

    pub fn set(
        &mut self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
        options: Option<SetOptions>,
    ) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.ensure_same_firestore(reference.firestore())?;
        let options = options.unwrap_or_default();
        let encoded = operations::encode_set_data(data, &options)?;
        self.writes.push(WriteOperation::Set {
            key: reference.key().clone(),
            data: encoded.map,
            mask: encoded.mask,
            transforms: encoded.transforms,
        });
        Ok(self)
    }

    /// Queues an update; keys of `data` are dot-separated field paths.
    pub fn update(
        &mut self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
    ) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.ensure_same_firestore(reference.firestore())?;
        let encoded = operations::encode_update_data(data)?;
        self.writes.push(WriteOperation::Update {
            key: reference.key().clone(),
            data: encoded.map,
            field_paths: encoded.field_paths,
            transforms: encoded.transforms,
        });
        Ok(self)
    }

    pub fn delete(&mut self, reference: &DocumentReference) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.ensure_same_firestore(reference.firestore())?;
        self.writes.push(WriteOperation::Delete {
            key: reference.key().clone(),
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    #[cfg(test)]
    fn writes(&self) -> &[WriteOperation] {
        &self.writes
    }

    pub async fn commit(self) -> FirestoreResult<()> {
        log::debug!("committing write batch with {} operation(s)", self.writes.len());
        self.datastore.commit(self.writes).await
    }

    fn ensure_same_firestore(&self, other: &Firestore) -> FirestoreResult<()> {
        if self.firestore.database_id() != other.database_id() {
            return Err(invalid_argument(
                "All WriteBatch operations must target the same Firestore instance",
            ));
        }
        Ok(())
    }

    fn ensure_capacity(&self) -> FirestoreResult<()> {
        if self.writes.len() >= MAX_BATCH_WRITES {
            return Err(resource_exhausted(
                "WriteBatch cannot contain more than 500 operations",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::remote::datastore::InMemoryDatastore;
    use crate::test_support::test_firestore;

    fn batch() -> (WriteBatch, Firestore) {
        let firestore = test_firestore();
        let datastore: Arc<dyn Datastore> = Arc::new(InMemoryDatastore::new());
        (WriteBatch::new(firestore.clone(), datastore), firestore)
    }

    #[test]
    fn writes_are_kept_in_insertion_order() {
        let (mut batch, firestore) = batch();
        let doc = firestore.doc("cities/SF").unwrap();
        batch
            .set(&doc, BTreeMap::from([("a".to_string(), FirestoreValue::from_integer(1))]), None)
            .unwrap();
        batch.delete(&doc).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(matches!(batch.writes()[0], WriteOperation::Set { .. }));
        assert!(matches!(batch.writes()[1], WriteOperation::Delete { .. }));
    }

    #[test]
    fn caps_batch_size() {
        let (mut batch, firestore) = batch();
        let doc = firestore.doc("cities/SF").unwrap();
        for _ in 0..MAX_BATCH_WRITES {
            batch.delete(&doc).unwrap();
        }
        let err = batch.delete(&doc).err().unwrap();
        assert_eq!(err.code_str(), "firestore/resource-exhausted");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn commit_applies_writes() {
        let firestore = test_firestore();
        let datastore = Arc::new(InMemoryDatastore::new());
        let mut batch = WriteBatch::new(firestore.clone(), datastore.clone());
        let doc = firestore.doc("cities/SF").unwrap();
        batch
            .set(&doc, BTreeMap::from([("a".to_string(), FirestoreValue::from_integer(1))]), None)
            .unwrap();
        batch.commit().await.unwrap();
        let snapshot = datastore.get_document(doc.key()).await.unwrap();
        assert!(snapshot.exists());
    }
}
