//! Decodes wire write entries into ordered write descriptors.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::firestore::api::{DocumentReference, Firestore, SetOptions, Transaction, WriteBatch};
use crate::firestore::error::FirestoreResult;
use crate::firestore::value::FirestoreValue;

use super::codec;
use super::query_compiler::FieldPathSpec;
use super::tagged::TaggedValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteType {
    Delete,
    Update,
    Set,
}

/// Set options as sent over the wire. `mergeFields` wins over `merge` when both are present.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOptionsSpec {
    #[serde(default)]
    pub merge: Option<bool>,
    #[serde(default)]
    pub merge_fields: Option<Vec<FieldPathSpec>>,
}

impl SetOptionsSpec {
    pub fn to_set_options(&self) -> FirestoreResult<SetOptions> {
        if let Some(fields) = &self.merge_fields {
            let fields = fields
                .iter()
                .map(FieldPathSpec::to_field_path)
                .collect::<FirestoreResult<Vec<_>>>()?;
            return SetOptions::merge_fields(fields);
        }
        if self.merge == Some(true) {
            return Ok(SetOptions::merge_all());
        }
        Ok(SetOptions::default())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WireEntry {
    #[serde(rename = "type")]
    pub write_type: WriteType,
    pub path: String,
    #[serde(default)]
    pub data: Option<BTreeMap<String, TaggedValue>>,
    #[serde(default)]
    pub options: Option<SetOptionsSpec>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteDescriptor {
    Delete {
        path: String,
    },
    Update {
        path: String,
        data: BTreeMap<String, FirestoreValue>,
    },
    Set {
        path: String,
        data: BTreeMap<String, FirestoreValue>,
        options: SetOptionsSpec,
    },
}

impl WriteDescriptor {
    pub fn path(&self) -> &str {
        match self {
            WriteDescriptor::Delete { path }
            | WriteDescriptor::Update { path, .. }
            | WriteDescriptor::Set { path, .. } => path,
        }
    }
}

/// Decodes every entry's data; paths and options pass through unvalidated.
pub fn parse_batch(firestore: &Firestore, entries: &[WireEntry]) -> Vec<WriteDescriptor> {
    entries
        .iter()
        .map(|entry| {
            let path = entry.path.clone();
            let data = entry
                .data
                .as_ref()
                .map(|data| codec::decode_object(firestore, data))
                .unwrap_or_default();
            match entry.write_type {
                WriteType::Delete => WriteDescriptor::Delete { path },
                WriteType::Update => WriteDescriptor::Update { path, data },
                WriteType::Set => WriteDescriptor::Set {
                    path,
                    data,
                    options: entry.options.clone().unwrap_or_default(),
                },
            }
        })
        .collect()
}

/// A sink for staged writes: a write batch or a live transaction.
pub trait WriteTarget {
    fn stage_set(
        &mut self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
        options: SetOptions,
    ) -> FirestoreResult<()>;

    fn stage_update(&mut self, reference: &DocumentReference, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<()>;

    fn stage_delete(&mut self, reference: &DocumentReference) -> FirestoreResult<()>;
}

impl WriteTarget for WriteBatch {
    fn stage_set(
        &mut self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
        options: SetOptions,
    ) -> FirestoreResult<()> {
        self.set(reference, data, Some(options)).map(|_| ())
    }

    fn stage_update(&mut self, reference: &DocumentReference, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<()> {
        self.update(reference, data).map(|_| ())
    }

    fn stage_delete(&mut self, reference: &DocumentReference) -> FirestoreResult<()> {
        self.delete(reference).map(|_| ())
    }
}

impl WriteTarget for Transaction {
    fn stage_set(
        &mut self,
        reference: &DocumentReference,
        data: BTreeMap<String, FirestoreValue>,
        options: SetOptions,
    ) -> FirestoreResult<()> {
        self.set(reference, data, Some(options))
    }

    fn stage_update(&mut self, reference: &DocumentReference, data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<()> {
        self.update(reference, data)
    }

    fn stage_delete(&mut self, reference: &DocumentReference) -> FirestoreResult<()> {
        self.delete(reference)
    }
}

/// Replays `writes` against `target` in order.
pub fn apply_writes<T>(firestore: &Firestore, target: &mut T, writes: Vec<WriteDescriptor>) -> FirestoreResult<()>
where
    T: WriteTarget + ?Sized,
{
    for write in writes {
        let reference = firestore.doc(write.path())?;
        match write {
            WriteDescriptor::Delete { .. } => target.stage_delete(&reference)?,
            WriteDescriptor::Update { data, .. } => target.stage_update(&reference, data)?,
            WriteDescriptor::Set { data, options, .. } => {
                target.stage_set(&reference, data, options.to_set_options()?)?
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_firestore;
    use serde_json::json;

    /// Last-write-wins document store keyed by path.
    #[derive(Default)]
    struct FakeStore {
        documents: BTreeMap<String, BTreeMap<String, FirestoreValue>>,
    }

    impl WriteTarget for FakeStore {
        fn stage_set(
            &mut self,
            reference: &DocumentReference,
            data: BTreeMap<String, FirestoreValue>,
            _options: SetOptions,
        ) -> FirestoreResult<()> {
            self.documents.insert(reference.path().canonical_string(), data);
            Ok(())
        }

        fn stage_update(
            &mut self,
            reference: &DocumentReference,
            data: BTreeMap<String, FirestoreValue>,
        ) -> FirestoreResult<()> {
            self.documents
                .entry(reference.path().canonical_string())
                .or_default()
                .extend(data);
            Ok(())
        }

        fn stage_delete(&mut self, reference: &DocumentReference) -> FirestoreResult<()> {
            self.documents.remove(&reference.path().canonical_string());
            Ok(())
        }
    }

    fn entries(value: serde_json::Value) -> Vec<WireEntry> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parsed_batch_preserves_order_and_last_write_wins() {
        let firestore = test_firestore();
        let writes = parse_batch(
            &firestore,
            &entries(json!([
                {"type": "SET", "path": "things/a", "data": {"value": [17, 1]}},
                {"type": "DELETE", "path": "things/a"}
            ])),
        );
        assert!(matches!(writes[0], WriteDescriptor::Set { .. }));
        assert!(matches!(writes[1], WriteDescriptor::Delete { .. }));

        let mut store = FakeStore::default();
        apply_writes(&firestore, &mut store, writes).unwrap();
        assert!(!store.documents.contains_key("things/a"));
    }

    #[test]
    fn data_is_decoded_and_options_pass_through() {
        let firestore = test_firestore();
        let writes = parse_batch(
            &firestore,
            &entries(json!([{
                "type": "SET",
                "path": "things/a",
                "data": {"name": [8, "x"], "gone": [15, ["delete"]]},
                "options": {"merge": true}
            }])),
        );
        let WriteDescriptor::Set { data, options, .. } = &writes[0] else {
            panic!("expected set");
        };
        assert_eq!(data["name"], FirestoreValue::from_string("x"));
        assert_eq!(data["gone"], FirestoreValue::delete_field());
        assert_eq!(options.to_set_options().unwrap(), SetOptions::merge_all());
    }

    #[test]
    fn merge_fields_take_precedence_over_merge() {
        let spec: SetOptionsSpec =
            serde_json::from_value(json!({"merge": false, "mergeFields": ["a.b", ["c", "d.e"]]})).unwrap();
        let options = spec.to_set_options().unwrap();
        let fields: Vec<Vec<String>> = options
            .field_mask()
            .unwrap()
            .iter()
            .map(|path| path.segments().to_vec())
            .collect();
        assert_eq!(
            fields,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string(), "d.e".to_string()]
            ]
        );
    }

    #[test]
    fn invalid_paths_surface_when_applied() {
        let firestore = test_firestore();
        let writes = parse_batch(&firestore, &entries(json!([{"type": "DELETE", "path": "things"}])));
        let mut store = FakeStore::default();
        assert!(apply_writes(&firestore, &mut store, writes).is_err());
    }
}
