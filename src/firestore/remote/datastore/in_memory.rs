use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::firestore::api::aggregate::AggregateSpec;
use crate::firestore::api::operations::{
    apply_transforms, remove_value_at_field_path, set_value_at_field_path, value_for_field_path,
};
use crate::firestore::api::{DocumentSnapshot, QueryDefinition, SnapshotMetadata};
use crate::firestore::error::{aborted, not_found, FirestoreResult};
use crate::firestore::model::{DocumentKey, FieldPath};
use crate::firestore::query_evaluator::{apply_query_to_documents, compute_aggregates};
use crate::firestore::value::{FirestoreValue, MapValue};

use super::{Datastore, WriteOperation};

#[derive(Clone, Debug)]
struct StoredDocument {
    fields: BTreeMap<String, FirestoreValue>,
    version: u64,
}

#[derive(Default)]
struct Store {
    documents: BTreeMap<DocumentKey, StoredDocument>,
    next_version: u64,
}

/// Process-local datastore. Every committed write bumps the document's version.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    store: Arc<Mutex<Store>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(key: &DocumentKey, stored: Option<&StoredDocument>) -> DocumentSnapshot {
        let data = stored.map(|document| MapValue::new(document.fields.clone()));
        DocumentSnapshot::new(key.clone(), data, SnapshotMetadata::new(false, false))
            .with_version(stored.map(|document| document.version))
    }
}

fn apply_mask(
    fields: &mut BTreeMap<String, FirestoreValue>,
    data: &MapValue,
    paths: &[FieldPath],
) {
    for path in paths {
        match value_for_field_path(data, path) {
            Some(value) => set_value_at_field_path(fields, path, value),
            None => remove_value_at_field_path(fields, path),
        }
    }
}

fn apply_write(
    documents: &mut BTreeMap<DocumentKey, StoredDocument>,
    write: WriteOperation,
    version: u64,
) -> FirestoreResult<()> {
    match write {
        WriteOperation::Set {
            key,
            data,
            mask,
            transforms,
        } => {
            let mut fields = match mask {
                Some(mask) => {
                    let mut fields = documents
                        .get(&key)
                        .map(|existing| existing.fields.clone())
                        .unwrap_or_default();
                    apply_mask(&mut fields, &data, &mask);
                    fields
                }
                None => data.into_fields(),
            };
            apply_transforms(&mut fields, &transforms);
            documents.insert(key, StoredDocument { fields, version });
        }
        WriteOperation::Update {
            key,
            data,
            field_paths,
            transforms,
        } => {
            let existing = documents
                .get(&key)
                .ok_or_else(|| not_found(format!("No document to update: {}", key.path())))?;
            let mut fields = existing.fields.clone();
            apply_mask(&mut fields, &data, &field_paths);
            apply_transforms(&mut fields, &transforms);
            documents.insert(key, StoredDocument { fields, version });
        }
        WriteOperation::Delete { key } => {
            documents.remove(&key);
        }
        WriteOperation::Verify { key, version: expected } => {
            let actual = documents.get(&key).map(|document| document.version);
            if actual != expected {
                return Err(aborted(format!(
                    "Document {} changed since it was read in the transaction",
                    key.path()
                )));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot> {
        let store = self.lock();
        Ok(Self::snapshot(key, store.documents.get(key)))
    }

    async fn run_query(&self, query: &QueryDefinition) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let candidates = {
            let store = self.lock();
            store
                .documents
                .iter()
                .filter(|(key, _)| query.matches_target(key))
                .map(|(key, stored)| Self::snapshot(key, Some(stored)))
                .collect::<Vec<_>>()
        };
        Ok(apply_query_to_documents(candidates, query))
    }

    async fn run_aggregate(
        &self,
        query: &QueryDefinition,
        spec: &AggregateSpec,
    ) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
        let documents = self.run_query(query).await?;
        Ok(compute_aggregates(&documents, spec))
    }

    async fn commit(&self, writes: Vec<WriteOperation>) -> FirestoreResult<()> {
        let mut store = self.lock();
        // Apply to a copy so a failing write leaves the store untouched.
        let mut documents = store.documents.clone();
        store.next_version += 1;
        let version = store.next_version;
        for write in writes {
            apply_write(&mut documents, write, version)?;
        }
        store.documents = documents;
        Ok(())
    }
}
