//! The compact `[tag, payload?]` representation values take on the wire.

use std::collections::BTreeMap;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::{json, Number, Value as JsonValue};

pub const TAG_NAN: i64 = 0;
pub const TAG_NEGATIVE_INFINITY: i64 = 1;
pub const TAG_POSITIVE_INFINITY: i64 = 2;
pub const TAG_NULL: i64 = 3;
pub const TAG_DOCUMENT_ID: i64 = 4;
pub const TAG_BOOLEAN_TRUE: i64 = 5;
pub const TAG_BOOLEAN_FALSE: i64 = 6;
pub const TAG_DOUBLE: i64 = 7;
pub const TAG_STRING: i64 = 8;
pub const TAG_STRING_EMPTY: i64 = 9;
pub const TAG_ARRAY: i64 = 10;
pub const TAG_REFERENCE: i64 = 11;
pub const TAG_GEOPOINT: i64 = 12;
pub const TAG_TIMESTAMP: i64 = 13;
pub const TAG_BLOB: i64 = 14;
pub const TAG_FIELDVALUE: i64 = 15;
pub const TAG_OBJECT: i64 = 16;
pub const TAG_INTEGER: i64 = 17;
pub const TAG_NEGATIVE_ZERO: i64 = 18;
pub const TAG_VECTOR: i64 = 19;
pub const TAG_UNKNOWN: i64 = -999;

/// Largest magnitude at which every integer is exactly representable as an `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// One value in wire form.
///
/// Parsing never fails: anything that does not match a known tag and payload
/// shape becomes [`TaggedValue::Unknown`].
#[derive(Clone, Debug, PartialEq)]
pub enum TaggedValue {
    NaN,
    NegativeInfinity,
    PositiveInfinity,
    Null,
    DocumentId,
    Boolean(bool),
    Double(f64),
    /// Tag 8, or tag 9 when empty.
    String(String),
    Array(Vec<TaggedValue>),
    Reference(String),
    GeoPoint { latitude: f64, longitude: f64 },
    Timestamp { seconds: i64, nanoseconds: i64 },
    /// Base64 encoded bytes.
    Blob(String),
    FieldValue(FieldValueSpec),
    Object(BTreeMap<String, TaggedValue>),
    Integer(i64),
    NegativeZero,
    Vector(Vec<f64>),
    Unknown,
}

/// Payload of tag 15: `[kind, arg?]`.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValueSpec {
    Delete,
    ServerTimestamp,
    Increment(Number),
    ArrayUnion(Vec<TaggedValue>),
    ArrayRemove(Vec<TaggedValue>),
}

impl FieldValueSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValueSpec::Delete => "delete",
            FieldValueSpec::ServerTimestamp => "timestamp",
            FieldValueSpec::Increment(_) => "increment",
            FieldValueSpec::ArrayUnion(_) => "array_union",
            FieldValueSpec::ArrayRemove(_) => "array_remove",
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            FieldValueSpec::Delete | FieldValueSpec::ServerTimestamp => json!([self.kind()]),
            FieldValueSpec::Increment(operand) => json!([self.kind(), operand]),
            FieldValueSpec::ArrayUnion(elements) | FieldValueSpec::ArrayRemove(elements) => {
                json!([self.kind(), elements.iter().map(TaggedValue::to_json).collect::<Vec<_>>()])
            }
        }
    }

    fn from_json(payload: &JsonValue) -> Option<Self> {
        let items = payload.as_array()?;
        let (kind, args) = items.split_first()?;
        match kind.as_str()? {
            "delete" => Some(FieldValueSpec::Delete),
            "timestamp" => Some(FieldValueSpec::ServerTimestamp),
            "increment" => match args.first()? {
                JsonValue::Number(operand) => Some(FieldValueSpec::Increment(operand.clone())),
                _ => None,
            },
            "array_union" => Some(FieldValueSpec::ArrayUnion(tagged_list(args.first()?)?)),
            "array_remove" => Some(FieldValueSpec::ArrayRemove(tagged_list(args.first()?)?)),
            _ => None,
        }
    }
}

fn tagged_list(value: &JsonValue) -> Option<Vec<TaggedValue>> {
    Some(value.as_array()?.iter().map(TaggedValue::from_json).collect())
}

/// Renders a double the way JavaScript prints numbers: integral values have no fraction.
fn number_json(value: f64) -> JsonValue {
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        JsonValue::from(value as i64)
    } else {
        Number::from_f64(value).map(JsonValue::Number).unwrap_or(JsonValue::Null)
    }
}

/// Vector elements are plain numbers; non-finite ones travel as their bare tags.
fn vector_element_json(value: f64) -> JsonValue {
    if value.is_nan() {
        json!([TAG_NAN])
    } else if value == f64::INFINITY {
        json!([TAG_POSITIVE_INFINITY])
    } else if value == f64::NEG_INFINITY {
        json!([TAG_NEGATIVE_INFINITY])
    } else {
        number_json(value)
    }
}

fn vector_element_from_json(value: &JsonValue) -> Option<f64> {
    if let Some(number) = value.as_f64() {
        return Some(number);
    }
    match TaggedValue::try_from_json(value)? {
        TaggedValue::NaN => Some(f64::NAN),
        TaggedValue::PositiveInfinity => Some(f64::INFINITY),
        TaggedValue::NegativeInfinity => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

impl TaggedValue {
    pub fn tag(&self) -> i64 {
        match self {
            TaggedValue::NaN => TAG_NAN,
            TaggedValue::NegativeInfinity => TAG_NEGATIVE_INFINITY,
            TaggedValue::PositiveInfinity => TAG_POSITIVE_INFINITY,
            TaggedValue::Null => TAG_NULL,
            TaggedValue::DocumentId => TAG_DOCUMENT_ID,
            TaggedValue::Boolean(true) => TAG_BOOLEAN_TRUE,
            TaggedValue::Boolean(false) => TAG_BOOLEAN_FALSE,
            TaggedValue::Double(_) => TAG_DOUBLE,
            TaggedValue::String(value) if value.is_empty() => TAG_STRING_EMPTY,
            TaggedValue::String(_) => TAG_STRING,
            TaggedValue::Array(_) => TAG_ARRAY,
            TaggedValue::Reference(_) => TAG_REFERENCE,
            TaggedValue::GeoPoint { .. } => TAG_GEOPOINT,
            TaggedValue::Timestamp { .. } => TAG_TIMESTAMP,
            TaggedValue::Blob(_) => TAG_BLOB,
            TaggedValue::FieldValue(_) => TAG_FIELDVALUE,
            TaggedValue::Object(_) => TAG_OBJECT,
            TaggedValue::Integer(_) => TAG_INTEGER,
            TaggedValue::NegativeZero => TAG_NEGATIVE_ZERO,
            TaggedValue::Vector(_) => TAG_VECTOR,
            TaggedValue::Unknown => TAG_UNKNOWN,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let tag = self.tag();
        match self {
            TaggedValue::NaN
            | TaggedValue::NegativeInfinity
            | TaggedValue::PositiveInfinity
            | TaggedValue::Null
            | TaggedValue::DocumentId
            | TaggedValue::Boolean(_)
            | TaggedValue::NegativeZero
            | TaggedValue::Unknown => json!([tag]),
            TaggedValue::String(value) if value.is_empty() => json!([tag]),
            TaggedValue::Double(value) => {
                if value.is_nan() {
                    json!([TAG_NAN])
                } else if value.is_infinite() {
                    let tag = if *value > 0.0 { TAG_POSITIVE_INFINITY } else { TAG_NEGATIVE_INFINITY };
                    json!([tag])
                } else {
                    json!([tag, number_json(*value)])
                }
            }
            TaggedValue::String(value) | TaggedValue::Reference(value) | TaggedValue::Blob(value) => {
                json!([tag, value])
            }
            TaggedValue::Array(values) => json!([tag, values.iter().map(TaggedValue::to_json).collect::<Vec<_>>()]),
            TaggedValue::GeoPoint { latitude, longitude } => {
                json!([tag, [number_json(*latitude), number_json(*longitude)]])
            }
            TaggedValue::Timestamp { seconds, nanoseconds } => json!([tag, [seconds, nanoseconds]]),
            TaggedValue::FieldValue(spec) => json!([tag, spec.to_json()]),
            TaggedValue::Object(fields) => {
                let fields: serde_json::Map<String, JsonValue> = fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect();
                json!([tag, fields])
            }
            TaggedValue::Integer(value) => json!([tag, value]),
            TaggedValue::Vector(values) => {
                json!([tag, values.iter().map(|value| vector_element_json(*value)).collect::<Vec<_>>()])
            }
        }
    }

    /// Parses a wire value. Malformed input yields [`TaggedValue::Unknown`].
    pub fn from_json(value: &JsonValue) -> Self {
        Self::try_from_json(value).unwrap_or(TaggedValue::Unknown)
    }

    fn try_from_json(value: &JsonValue) -> Option<Self> {
        let items = value.as_array()?;
        let (tag, rest) = items.split_first()?;
        let payload = rest.first();
        let tagged = match tag.as_i64()? {
            TAG_NAN => TaggedValue::NaN,
            TAG_NEGATIVE_INFINITY => TaggedValue::NegativeInfinity,
            TAG_POSITIVE_INFINITY => TaggedValue::PositiveInfinity,
            TAG_NULL => TaggedValue::Null,
            TAG_DOCUMENT_ID => TaggedValue::DocumentId,
            TAG_BOOLEAN_TRUE => TaggedValue::Boolean(true),
            TAG_BOOLEAN_FALSE => TaggedValue::Boolean(false),
            TAG_DOUBLE => TaggedValue::Double(payload?.as_f64()?),
            TAG_STRING => TaggedValue::String(payload?.as_str()?.to_string()),
            TAG_STRING_EMPTY => TaggedValue::String(String::new()),
            TAG_ARRAY => TaggedValue::Array(tagged_list(payload?)?),
            TAG_REFERENCE => TaggedValue::Reference(payload?.as_str()?.to_string()),
            TAG_GEOPOINT => {
                let pair = payload?.as_array()?;
                TaggedValue::GeoPoint {
                    latitude: pair.first()?.as_f64()?,
                    longitude: pair.get(1)?.as_f64()?,
                }
            }
            TAG_TIMESTAMP => {
                let pair = payload?.as_array()?;
                TaggedValue::Timestamp {
                    seconds: pair.first()?.as_i64()?,
                    nanoseconds: pair.get(1)?.as_i64()?,
                }
            }
            TAG_BLOB => TaggedValue::Blob(payload?.as_str()?.to_string()),
            TAG_FIELDVALUE => TaggedValue::FieldValue(FieldValueSpec::from_json(payload?)?),
            TAG_OBJECT => {
                let fields = payload?
                    .as_object()?
                    .iter()
                    .map(|(key, value)| (key.clone(), TaggedValue::from_json(value)))
                    .collect();
                TaggedValue::Object(fields)
            }
            TAG_INTEGER => {
                let number = payload?;
                match number.as_i64() {
                    Some(integer) => TaggedValue::Integer(integer),
                    None => TaggedValue::Double(number.as_f64()?),
                }
            }
            TAG_NEGATIVE_ZERO => TaggedValue::NegativeZero,
            TAG_VECTOR => TaggedValue::Vector(
                payload?
                    .as_array()?
                    .iter()
                    .map(vector_element_from_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            _ => TaggedValue::Unknown,
        };
        Some(tagged)
    }
}

impl Serialize for TaggedValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TaggedValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(TaggedValue::from_json(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_doubles_render_without_fraction() {
        assert_eq!(TaggedValue::Double(7.0).to_json(), json!([7, 7]));
        assert_eq!(TaggedValue::Double(1.5).to_json(), json!([7, 1.5]));
        assert_eq!(TaggedValue::Integer(7).to_json(), json!([17, 7]));
    }

    #[test]
    fn empty_string_uses_its_own_tag() {
        assert_eq!(TaggedValue::String(String::new()).to_json(), json!([9]));
        assert_eq!(TaggedValue::from_json(&json!([9])), TaggedValue::String(String::new()));
        assert_eq!(TaggedValue::String("a".into()).to_json(), json!([8, "a"]));
    }

    #[test]
    fn malformed_input_parses_as_unknown() {
        assert_eq!(TaggedValue::from_json(&json!("plain")), TaggedValue::Unknown);
        assert_eq!(TaggedValue::from_json(&json!([])), TaggedValue::Unknown);
        assert_eq!(TaggedValue::from_json(&json!([42, 1])), TaggedValue::Unknown);
        assert_eq!(TaggedValue::from_json(&json!([8, 3])), TaggedValue::Unknown);
        assert_eq!(TaggedValue::from_json(&json!([15, ["bogus"]])), TaggedValue::Unknown);
        assert_eq!(TaggedValue::from_json(&json!([-999])), TaggedValue::Unknown);
    }

    #[test]
    fn non_integral_integer_payload_becomes_double() {
        assert_eq!(TaggedValue::from_json(&json!([17, 2.5])), TaggedValue::Double(2.5));
    }

    #[test]
    fn nested_payloads_parse() {
        let wire = json!([16, {
            "tags": [10, [[8, "a"], [5]]],
            "where": [12, [1.5, -2]],
            "at": [13, [10, 500]],
            "bump": [15, ["increment", 3]],
            "add": [15, ["array_union", [[17, 1]]]]
        }]);
        let TaggedValue::Object(fields) = TaggedValue::from_json(&wire) else {
            panic!("expected object");
        };
        assert_eq!(
            fields["tags"],
            TaggedValue::Array(vec![TaggedValue::String("a".into()), TaggedValue::Boolean(true)])
        );
        assert_eq!(fields["where"], TaggedValue::GeoPoint { latitude: 1.5, longitude: -2.0 });
        assert_eq!(fields["at"], TaggedValue::Timestamp { seconds: 10, nanoseconds: 500 });
        assert_eq!(fields["bump"], TaggedValue::FieldValue(FieldValueSpec::Increment(Number::from(3))));
        assert_eq!(
            fields["add"],
            TaggedValue::FieldValue(FieldValueSpec::ArrayUnion(vec![TaggedValue::Integer(1)]))
        );
    }

    #[test]
    fn non_finite_vector_elements_keep_their_tags() {
        let vector = TaggedValue::Vector(vec![1.5, f64::INFINITY, f64::NEG_INFINITY, f64::NAN]);
        let wire = vector.to_json();
        assert_eq!(wire, json!([19, [1.5, [2], [1], [0]]]));

        let TaggedValue::Vector(values) = TaggedValue::from_json(&wire) else {
            panic!("expected vector");
        };
        assert_eq!(&values[..3], &[1.5, f64::INFINITY, f64::NEG_INFINITY]);
        assert!(values[3].is_nan());

        assert_eq!(TaggedValue::from_json(&json!([19, [1, [8, "x"]]])), TaggedValue::Unknown);
    }

    #[test]
    fn serde_goes_through_wire_form() {
        let value: TaggedValue = serde_json::from_value(json!([11, "cities/SF"])).unwrap();
        assert_eq!(value, TaggedValue::Reference("cities/SF".into()));
        assert_eq!(serde_json::to_value(&value).unwrap(), json!([11, "cities/SF"]));
    }
}
