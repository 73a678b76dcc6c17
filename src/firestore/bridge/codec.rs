//! Conversion between wire values and [`FirestoreValue`]s.
//!
//! Encoding is total. Decoding is total as well: values that cannot be
//! materialized (an invalid reference path, an out-of-range geopoint, broken
//! base64) decode to `null` instead of failing.

use std::collections::BTreeMap;

use serde_json::Number;

use crate::firestore::api::Firestore;
use crate::firestore::model::{GeoPoint, Timestamp};
use crate::firestore::value::{BytesValue, FirestoreValue, SentinelValue, ValueKind};

use super::tagged::{FieldValueSpec, TaggedValue};

pub fn encode(value: &FirestoreValue) -> TaggedValue {
    match value.kind() {
        ValueKind::Null => TaggedValue::Null,
        ValueKind::Boolean(value) => TaggedValue::Boolean(*value),
        ValueKind::Double(value) => encode_double(*value),
        ValueKind::Integer(value) => TaggedValue::Integer(*value),
        ValueKind::String(value) => TaggedValue::String(value.clone()),
        ValueKind::Array(array) => TaggedValue::Array(encode_array(array.values())),
        ValueKind::Reference(path) => TaggedValue::Reference(path.clone()),
        ValueKind::Timestamp(timestamp) => TaggedValue::Timestamp {
            seconds: timestamp.seconds,
            nanoseconds: i64::from(timestamp.nanos),
        },
        ValueKind::GeoPoint(point) => TaggedValue::GeoPoint {
            latitude: point.latitude(),
            longitude: point.longitude(),
        },
        ValueKind::Bytes(bytes) => TaggedValue::Blob(bytes.to_base64()),
        ValueKind::Vector(vector) => TaggedValue::Vector(vector.values().to_vec()),
        ValueKind::Map(map) => TaggedValue::Object(encode_object(map.fields())),
        ValueKind::Sentinel(sentinel) => encode_sentinel(sentinel),
        ValueKind::DocumentId => TaggedValue::DocumentId,
        ValueKind::Unrecognized(_) => TaggedValue::Unknown,
    }
}

fn encode_double(value: f64) -> TaggedValue {
    if value.is_nan() {
        TaggedValue::NaN
    } else if value == f64::INFINITY {
        TaggedValue::PositiveInfinity
    } else if value == f64::NEG_INFINITY {
        TaggedValue::NegativeInfinity
    } else if value == 0.0 && value.is_sign_negative() {
        TaggedValue::NegativeZero
    } else {
        TaggedValue::Double(value)
    }
}

fn encode_sentinel(sentinel: &SentinelValue) -> TaggedValue {
    let spec = match sentinel {
        SentinelValue::Delete => FieldValueSpec::Delete,
        SentinelValue::ServerTimestamp => FieldValueSpec::ServerTimestamp,
        SentinelValue::ArrayUnion(elements) => FieldValueSpec::ArrayUnion(encode_array(elements)),
        SentinelValue::ArrayRemove(elements) => FieldValueSpec::ArrayRemove(encode_array(elements)),
        SentinelValue::NumericIncrement(operand) => {
            let number = match operand.kind() {
                ValueKind::Integer(value) => Some(Number::from(*value)),
                ValueKind::Double(value) => Number::from_f64(*value),
                _ => None,
            };
            match number {
                Some(number) => FieldValueSpec::Increment(number),
                None => return TaggedValue::Unknown,
            }
        }
    };
    TaggedValue::FieldValue(spec)
}

pub fn encode_object(fields: &BTreeMap<String, FirestoreValue>) -> BTreeMap<String, TaggedValue> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode(value)))
        .collect()
}

pub fn encode_array(values: &[FirestoreValue]) -> Vec<TaggedValue> {
    values.iter().map(encode).collect()
}

/// Materializes a wire value. References are resolved against `firestore`.
pub fn decode(firestore: &Firestore, value: &TaggedValue) -> FirestoreValue {
    match value {
        TaggedValue::NaN => FirestoreValue::from_double(f64::NAN),
        TaggedValue::NegativeInfinity => FirestoreValue::from_double(f64::NEG_INFINITY),
        TaggedValue::PositiveInfinity => FirestoreValue::from_double(f64::INFINITY),
        TaggedValue::Null | TaggedValue::Unknown => FirestoreValue::null(),
        TaggedValue::DocumentId => FirestoreValue::document_id(),
        TaggedValue::Boolean(value) => FirestoreValue::from_bool(*value),
        TaggedValue::Double(value) => FirestoreValue::from_double(*value),
        TaggedValue::String(value) => FirestoreValue::from_string(value.clone()),
        TaggedValue::Array(values) => FirestoreValue::from_array(decode_array(firestore, values)),
        TaggedValue::Reference(path) => match firestore.doc(path) {
            Ok(reference) => FirestoreValue::from_reference(reference.path().canonical_string()),
            Err(err) => {
                log::debug!("decoding invalid document reference '{path}' as null: {err}");
                FirestoreValue::null()
            }
        },
        TaggedValue::GeoPoint { latitude, longitude } => match GeoPoint::new(*latitude, *longitude) {
            Ok(point) => FirestoreValue::from_geo_point(point),
            Err(err) => {
                log::debug!("decoding invalid geopoint as null: {err}");
                FirestoreValue::null()
            }
        },
        TaggedValue::Timestamp { seconds, nanoseconds } => {
            match i32::try_from(*nanoseconds).ok().and_then(|nanos| Timestamp::checked_new(*seconds, nanos)) {
                Some(timestamp) => FirestoreValue::from_timestamp(timestamp),
                None => {
                    log::debug!("decoding out-of-range timestamp ({seconds}, {nanoseconds}) as null");
                    FirestoreValue::null()
                }
            }
        }
        TaggedValue::Blob(encoded) => match BytesValue::from_base64(encoded) {
            Ok(bytes) => FirestoreValue::from_bytes(bytes),
            Err(err) => {
                log::debug!("decoding invalid base64 blob as null: {err}");
                FirestoreValue::null()
            }
        },
        TaggedValue::FieldValue(spec) => decode_field_value(firestore, spec),
        TaggedValue::Object(fields) => FirestoreValue::from_map(decode_object(firestore, fields)),
        TaggedValue::Integer(value) => FirestoreValue::from_integer(*value),
        TaggedValue::NegativeZero => FirestoreValue::from_double(-0.0),
        TaggedValue::Vector(values) => FirestoreValue::from_vector(values.clone()),
    }
}

fn decode_field_value(firestore: &Firestore, spec: &FieldValueSpec) -> FirestoreValue {
    match spec {
        FieldValueSpec::Delete => FirestoreValue::delete_field(),
        FieldValueSpec::ServerTimestamp => FirestoreValue::server_timestamp(),
        FieldValueSpec::Increment(operand) => {
            let operand = match operand.as_i64() {
                Some(integer) => FirestoreValue::from_integer(integer),
                None => FirestoreValue::from_double(operand.as_f64().unwrap_or_default()),
            };
            FirestoreValue::numeric_increment(operand)
        }
        FieldValueSpec::ArrayUnion(elements) => FirestoreValue::array_union(decode_array(firestore, elements)),
        FieldValueSpec::ArrayRemove(elements) => FirestoreValue::array_remove(decode_array(firestore, elements)),
    }
}

pub fn decode_object(firestore: &Firestore, fields: &BTreeMap<String, TaggedValue>) -> BTreeMap<String, FirestoreValue> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), decode(firestore, value)))
        .collect()
}

pub fn decode_array(firestore: &Firestore, values: &[TaggedValue]) -> Vec<FirestoreValue> {
    values.iter().map(|value| decode(firestore, value)).collect()
}
