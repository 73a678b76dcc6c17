use std::collections::BTreeMap;

use serde::Serialize;

use crate::firestore::api::{DocumentSnapshot, QuerySnapshot, SnapshotMetadata};

use super::codec;
use super::tagged::TaggedValue;

/// `[fromCache, hasPendingWrites]`.
pub type MetadataWire = (bool, bool);

fn metadata_wire(metadata: &SnapshotMetadata) -> MetadataWire {
    (metadata.from_cache(), metadata.has_pending_writes())
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentSnapshotWire {
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, TaggedValue>>,
    pub metadata: MetadataWire,
}

impl From<&DocumentSnapshot> for DocumentSnapshotWire {
    fn from(snapshot: &DocumentSnapshot) -> Self {
        Self {
            path: snapshot.document_key().path().canonical_string(),
            exists: snapshot.exists(),
            data: snapshot.data().map(codec::encode_object),
            metadata: metadata_wire(snapshot.metadata()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentChangeWire {
    #[serde(rename = "type")]
    pub change_type: &'static str,
    pub doc: DocumentSnapshotWire,
    /// New index.
    pub ni: i64,
    /// Old index, `-1` when the document was not in the previous result.
    pub oi: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySnapshotWire {
    pub source: &'static str,
    pub excludes_metadata_changes: bool,
    pub documents: Vec<DocumentSnapshotWire>,
    pub changes: Vec<DocumentChangeWire>,
    pub metadata: MetadataWire,
}

impl From<&QuerySnapshot> for QuerySnapshotWire {
    /// A one-shot read has no previous result, so every document is an `added` change.
    fn from(snapshot: &QuerySnapshot) -> Self {
        let documents: Vec<DocumentSnapshotWire> =
            snapshot.documents().iter().map(DocumentSnapshotWire::from).collect();
        let changes = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| DocumentChangeWire {
                change_type: "added",
                doc: doc.clone(),
                ni: index as i64,
                oi: -1,
            })
            .collect();
        Self {
            source: "get",
            excludes_metadata_changes: true,
            documents,
            changes,
            metadata: metadata_wire(snapshot.metadata()),
        }
    }
}
