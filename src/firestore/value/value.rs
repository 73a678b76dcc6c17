use std::collections::BTreeMap;

use crate::firestore::model::{GeoPoint, Timestamp};
use crate::firestore::value::{ArrayValue, BytesValue, MapValue, VectorValue};

#[derive(Clone, Debug, PartialEq)]
pub struct FirestoreValue {
    kind: ValueKind,
}

/// Write-time instructions that stand in for a field value.
///
/// Sentinels are consumed when a write is encoded and never stored.
#[derive(Clone, Debug, PartialEq)]
pub enum SentinelValue {
    Delete,
    ServerTimestamp,
    ArrayUnion(Vec<FirestoreValue>),
    ArrayRemove(Vec<FirestoreValue>),
    NumericIncrement(Box<FirestoreValue>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(Timestamp),
    String(String),
    Bytes(BytesValue),
    Reference(String),
    GeoPoint(GeoPoint),
    Array(ArrayValue),
    Map(MapValue),
    Vector(VectorValue),
    Sentinel(SentinelValue),
    /// Marker for the `__name__` field path, usable as a query operand.
    DocumentId,
    /// A backend value type this client does not model, tagged with its type name.
    Unrecognized(String),
}

impl FirestoreValue {
    pub fn null() -> Self {
        Self { kind: ValueKind::Null }
    }

    pub fn from_bool(value: bool) -> Self {
        Self {
            kind: ValueKind::Boolean(value),
        }
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            kind: ValueKind::Integer(value),
        }
    }

    pub fn from_double(value: f64) -> Self {
        Self {
            kind: ValueKind::Double(value),
        }
    }

    pub fn from_timestamp(value: Timestamp) -> Self {
        Self {
            kind: ValueKind::Timestamp(value),
        }
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(value.into()),
        }
    }

    pub fn from_bytes(value: BytesValue) -> Self {
        Self {
            kind: ValueKind::Bytes(value),
        }
    }

    pub fn from_reference(path: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Reference(path.into()),
        }
    }

    pub fn from_geo_point(value: GeoPoint) -> Self {
        Self {
            kind: ValueKind::GeoPoint(value),
        }
    }

    pub fn from_array(values: Vec<FirestoreValue>) -> Self {
        Self {
            kind: ValueKind::Array(ArrayValue::new(values)),
        }
    }

    pub fn from_map(map: BTreeMap<String, FirestoreValue>) -> Self {
        Self {
            kind: ValueKind::Map(MapValue::new(map)),
        }
    }

    pub fn from_vector(values: Vec<f64>) -> Self {
        Self {
            kind: ValueKind::Vector(VectorValue::new(values)),
        }
    }

    pub fn document_id() -> Self {
        Self {
            kind: ValueKind::DocumentId,
        }
    }

    pub fn unrecognized(type_name: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Unrecognized(type_name.into()),
        }
    }

    /// Returns a sentinel that removes the field it is assigned to.
    pub fn delete_field() -> Self {
        Self::sentinel(SentinelValue::Delete)
    }

    /// Returns a sentinel that instructs Firestore to populate the field with the server timestamp.
    pub fn server_timestamp() -> Self {
        Self::sentinel(SentinelValue::ServerTimestamp)
    }

    /// Returns a sentinel that unions the provided elements with an existing array field.
    pub fn array_union(elements: Vec<FirestoreValue>) -> Self {
        Self::sentinel(SentinelValue::ArrayUnion(elements))
    }

    /// Returns a sentinel that removes the provided elements from an existing array field.
    pub fn array_remove(elements: Vec<FirestoreValue>) -> Self {
        Self::sentinel(SentinelValue::ArrayRemove(elements))
    }

    /// Returns a sentinel that increments the targeted numeric field by `operand`.
    pub fn numeric_increment(operand: FirestoreValue) -> Self {
        Self::sentinel(SentinelValue::NumericIncrement(Box::new(operand)))
    }

    fn sentinel(sentinel: SentinelValue) -> Self {
        Self {
            kind: ValueKind::Sentinel(sentinel),
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn into_kind(self) -> ValueKind {
        self.kind
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, ValueKind::Sentinel(_))
    }
}

impl From<ValueKind> for FirestoreValue {
    fn from(kind: ValueKind) -> Self {
        Self { kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_basic_values() {
        let v = FirestoreValue::from_string("hello");
        match v.kind() {
            ValueKind::String(value) => assert_eq!(value, "hello"),
            _ => panic!("unexpected kind"),
        }
    }

    #[test]
    fn sentinels_are_flagged() {
        assert!(FirestoreValue::delete_field().is_sentinel());
        assert!(FirestoreValue::numeric_increment(FirestoreValue::from_integer(1)).is_sentinel());
        assert!(!FirestoreValue::from_vector(vec![1.0]).is_sentinel());
    }
}
