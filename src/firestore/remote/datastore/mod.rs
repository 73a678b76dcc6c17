use async_trait::async_trait;

use crate::firestore::api::aggregate::AggregateSpec;
use crate::firestore::api::operations::FieldTransform;
use crate::firestore::api::{DocumentSnapshot, QueryDefinition};
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, FieldPath};
use crate::firestore::value::{FirestoreValue, MapValue};

use std::collections::BTreeMap;

pub mod in_memory;

/// A single mutation inside an atomic commit.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOperation {
    Set {
        key: DocumentKey,
        data: MapValue,
        mask: Option<Vec<FieldPath>>,
        transforms: Vec<FieldTransform>,
    },
    Update {
        key: DocumentKey,
        data: MapValue,
        field_paths: Vec<FieldPath>,
        transforms: Vec<FieldTransform>,
    },
    Delete {
        key: DocumentKey,
    },
    /// Precondition: the document is still at `version` (`None` means it must not exist).
    Verify {
        key: DocumentKey,
        version: Option<u64>,
    },
}

impl WriteOperation {
    pub fn key(&self) -> &DocumentKey {
        match self {
            WriteOperation::Set { key, .. }
            | WriteOperation::Update { key, .. }
            | WriteOperation::Delete { key }
            | WriteOperation::Verify { key, .. } => key,
        }
    }
}

/// Backend seam used by the client. Implementations must apply `commit` atomically.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot>;
    async fn run_query(&self, query: &QueryDefinition) -> FirestoreResult<Vec<DocumentSnapshot>>;
    async fn run_aggregate(
        &self,
        query: &QueryDefinition,
        spec: &AggregateSpec,
    ) -> FirestoreResult<BTreeMap<String, FirestoreValue>>;
    async fn commit(&self, writes: Vec<WriteOperation>) -> FirestoreResult<()>;
}

pub use in_memory::InMemoryDatastore;
