use std::sync::Arc;

use crate::app::FirebaseApp;
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DatabaseId, ResourcePath};

use super::query::{Query, QueryTarget};
use super::reference::DocumentReference;

/// Handle to one database of one app. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Firestore {
    inner: Arc<FirestoreInner>,
}

#[derive(Debug)]
struct FirestoreInner {
    app: FirebaseApp,
    database_id: DatabaseId,
}

impl Firestore {
    pub fn new(app: FirebaseApp, database_id: DatabaseId) -> Self {
        let inner = FirestoreInner { app, database_id };
        Self { inner: Arc::new(inner) }
    }

    /// Returns the `FirebaseApp` this Firestore instance is scoped to.
    pub fn app(&self) -> &FirebaseApp {
        &self.inner.app
    }

    /// The fully qualified database identifier (project + database name).
    pub fn database_id(&self) -> &DatabaseId {
        &self.inner.database_id
    }

    /// Creates a `DocumentReference` pointing at `path`.
    ///
    /// The path must contain an even number of segments (collection/doc pairs).
    pub fn doc(&self, path: &str) -> FirestoreResult<DocumentReference> {
        let resource = ResourcePath::from_string(path)?;
        DocumentReference::new(self.clone(), resource)
    }

    /// Creates a query over every document directly inside the collection at `path`.
    pub fn collection(&self, path: &str) -> FirestoreResult<Query> {
        let resource = ResourcePath::from_string(path)?;
        if resource.len() % 2 == 0 {
            return Err(invalid_argument(format!(
                "Invalid collection path '{path}': collection paths must have an odd number of segments"
            )));
        }
        Ok(Query::new(self.clone(), QueryTarget::Collection(resource)))
    }

    /// Creates a query over every collection named `collection_id`, at any depth.
    pub fn collection_group(&self, collection_id: &str) -> FirestoreResult<Query> {
        if collection_id.is_empty() || collection_id.contains('/') {
            return Err(invalid_argument(format!(
                "Invalid collection ID '{collection_id}': collection group IDs must not contain '/'"
            )));
        }
        Ok(Query::new(
            self.clone(),
            QueryTarget::CollectionGroup(collection_id.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_firestore;

    #[test]
    fn collection_requires_odd_segments() {
        let firestore = test_firestore();
        assert!(firestore.collection("cities").is_ok());
        let err = firestore.collection("cities/sf").unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn collection_group_rejects_slashes() {
        let firestore = test_firestore();
        assert!(firestore.collection_group("landmarks").is_ok());
        assert!(firestore.collection_group("cities/sf").is_err());
    }

    #[test]
    fn doc_requires_even_segments() {
        let firestore = test_firestore();
        assert_eq!(firestore.doc("cities/sf").unwrap().id(), "sf");
        assert!(firestore.doc("cities").is_err());
    }
}
