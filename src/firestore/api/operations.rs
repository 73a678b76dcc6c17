use std::collections::{BTreeMap, HashSet};

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{FieldPath, Timestamp};
use crate::firestore::value::{FirestoreValue, MapValue, SentinelValue, ValueKind};

/// Options that configure the behaviour of `set` writes.
///
/// `merge_fields` takes precedence over `merge` when both are supplied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetOptions {
    /// Merge the provided data into the existing document instead of replacing it.
    pub merge: bool,
    /// Explicit field mask that should be merged.
    pub merge_fields: Option<Vec<FieldPath>>,
}

impl SetOptions {
    /// Builds set options that merge every field present in the provided data.
    pub fn merge_all() -> Self {
        Self {
            merge: true,
            merge_fields: None,
        }
    }

    /// Builds set options that merge only the specified field paths.
    pub fn merge_fields<I>(fields: I) -> FirestoreResult<Self>
    where
        I: IntoIterator<Item = FieldPath>,
    {
        let mut unique = Vec::new();
        let mut seen = HashSet::new();
        for field in fields {
            if seen.insert(field.canonical_string()) {
                unique.push(field);
            }
        }
        if unique.is_empty() {
            return Err(invalid_argument("mergeFields requires at least one field path"));
        }
        Ok(Self {
            merge: false,
            merge_fields: Some(unique),
        })
    }

    pub fn is_merge(&self) -> bool {
        self.merge || self.merge_fields.is_some()
    }

    pub fn field_mask(&self) -> Option<&[FieldPath]> {
        self.merge_fields.as_deref()
    }
}

/// Pre-encoded data for `set` style writes.
///
/// When `mask` is present only the masked paths are written; masked paths
/// absent from `map` are removed from the stored document.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedSetData {
    pub map: MapValue,
    pub mask: Option<Vec<FieldPath>>,
    pub transforms: Vec<FieldTransform>,
}

/// Pre-encoded data for `update` style writes.
///
/// Every path in `field_paths` is written from `map`, or removed when `map` has no value there.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedUpdateData {
    pub map: MapValue,
    pub field_paths: Vec<FieldPath>,
    pub transforms: Vec<FieldTransform>,
}

/// Describes a single field transform applied during a write.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTransform {
    field_path: FieldPath,
    operation: TransformOperation,
}

impl FieldTransform {
    pub fn new(field_path: FieldPath, operation: TransformOperation) -> Self {
        Self {
            field_path,
            operation,
        }
    }

    pub fn field_path(&self) -> &FieldPath {
        &self.field_path
    }

    pub fn operation(&self) -> &TransformOperation {
        &self.operation
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransformOperation {
    ServerTimestamp,
    ArrayUnion(Vec<FirestoreValue>),
    ArrayRemove(Vec<FirestoreValue>),
    NumericIncrement(FirestoreValue),
}

#[derive(Default)]
struct WriteParts {
    transforms: Vec<FieldTransform>,
    deletes: Vec<FieldPath>,
}

pub fn encode_set_data(
    data: BTreeMap<String, FirestoreValue>,
    options: &SetOptions,
) -> FirestoreResult<EncodedSetData> {
    let mut parts = WriteParts::default();
    let sanitized = sanitize_map(&data, &[], &mut parts, options.is_merge())?;

    if !parts.deletes.is_empty() && !options.is_merge() {
        return Err(invalid_argument(
            "FieldValue.delete() cannot be used with set() unless you pass merge: true",
        ));
    }

    let mut available = collect_leaf_paths(&sanitized)?;
    available.extend(parts.deletes.iter().cloned());
    available.extend(parts.transforms.iter().map(|transform| transform.field_path().clone()));
    let available = dedup_paths(available);

    let (mask, transforms) = if let Some(mask) = options.field_mask() {
        validate_mask_against_available(mask, &available)?;
        let transforms = parts
            .transforms
            .into_iter()
            .filter(|transform| mask.iter().any(|field| field.is_prefix_of(transform.field_path())))
            .collect();
        (Some(mask.to_vec()), transforms)
    } else if options.merge {
        // Transforms are applied after the mask, so their paths stay out of it.
        let mask = available
            .into_iter()
            .filter(|path| !parts.transforms.iter().any(|transform| transform.field_path() == path))
            .collect();
        (Some(mask), parts.transforms)
    } else {
        (None, parts.transforms)
    };

    Ok(EncodedSetData {
        map: MapValue::new(sanitized),
        mask,
        transforms,
    })
}

/// Encodes update data whose top-level keys are dot-separated field paths.
pub fn encode_update_data(data: BTreeMap<String, FirestoreValue>) -> FirestoreResult<EncodedUpdateData> {
    if data.is_empty() {
        return Err(invalid_argument("update() requires at least one field/value pair"));
    }

    let mut fields = BTreeMap::new();
    let mut field_paths = Vec::new();
    let mut transforms = Vec::new();
    for (key, value) in &data {
        let path = FieldPath::from_dot_separated(key)?;
        match value.kind() {
            ValueKind::Sentinel(SentinelValue::Delete) => field_paths.push(path),
            ValueKind::Sentinel(sentinel) => {
                transforms.push(transform_from_sentinel(path, sentinel.clone())?);
            }
            ValueKind::Map(map) => {
                let mut parts = WriteParts::default();
                let nested = sanitize_map(map.fields(), path.segments(), &mut parts, false)?;
                if !parts.deletes.is_empty() {
                    return Err(invalid_argument(
                        "FieldValue.delete() can only appear at the top level of your update data",
                    ));
                }
                transforms.extend(parts.transforms);
                set_value_at_field_path(&mut fields, &path, FirestoreValue::from_map(nested));
                field_paths.push(path);
            }
            _ => {
                validate_plain_value(value, &path)?;
                set_value_at_field_path(&mut fields, &path, value.clone());
                field_paths.push(path);
            }
        }
    }

    let all_paths: Vec<&FieldPath> = field_paths
        .iter()
        .chain(transforms.iter().map(|transform| transform.field_path()))
        .collect();
    for (index, path) in all_paths.iter().enumerate() {
        for other in &all_paths[index + 1..] {
            if path.is_prefix_of(other) || other.is_prefix_of(path) {
                return Err(invalid_argument(format!(
                    "Field '{path}' conflicts with field '{other}' in the same update"
                )));
            }
        }
    }

    Ok(EncodedUpdateData {
        map: MapValue::new(fields),
        field_paths,
        transforms,
    })
}

fn sanitize_map(
    data: &BTreeMap<String, FirestoreValue>,
    parent_segments: &[String],
    parts: &mut WriteParts,
    allow_delete: bool,
) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
    let mut cleaned = BTreeMap::new();
    for (key, value) in data {
        let mut segments = parent_segments.to_vec();
        segments.push(key.clone());
        let field_path = FieldPath::new(segments.clone())?;
        match value.kind() {
            ValueKind::Sentinel(SentinelValue::Delete) => {
                if !allow_delete {
                    return Err(invalid_argument(format!(
                        "FieldValue.delete() cannot be used at field '{field_path}'"
                    )));
                }
                parts.deletes.push(field_path);
            }
            ValueKind::Sentinel(sentinel) => {
                parts
                    .transforms
                    .push(transform_from_sentinel(field_path, sentinel.clone())?);
            }
            ValueKind::Map(map) => {
                let nested = sanitize_map(map.fields(), &segments, parts, allow_delete)?;
                // An empty map is a value of its own; a map emptied by sentinels is not.
                if !nested.is_empty() || map.fields().is_empty() {
                    cleaned.insert(key.clone(), FirestoreValue::from_map(nested));
                }
            }
            _ => {
                validate_plain_value(value, &field_path)?;
                cleaned.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(cleaned)
}

fn transform_from_sentinel(field_path: FieldPath, sentinel: SentinelValue) -> FirestoreResult<FieldTransform> {
    let operation = match sentinel {
        SentinelValue::Delete => {
            return Err(invalid_argument(format!(
                "FieldValue.delete() cannot be used at field '{field_path}'"
            )))
        }
        SentinelValue::ServerTimestamp => TransformOperation::ServerTimestamp,
        SentinelValue::ArrayUnion(elements) => {
            validate_array_elements(&elements, &field_path)?;
            TransformOperation::ArrayUnion(elements)
        }
        SentinelValue::ArrayRemove(elements) => {
            validate_array_elements(&elements, &field_path)?;
            TransformOperation::ArrayRemove(elements)
        }
        SentinelValue::NumericIncrement(operand) => match operand.kind() {
            ValueKind::Integer(_) | ValueKind::Double(_) => TransformOperation::NumericIncrement(*operand),
            _ => {
                return Err(invalid_argument(
                    "FieldValue.increment() requires a numeric operand",
                ))
            }
        },
    };
    Ok(FieldTransform::new(field_path, operation))
}

fn validate_array_elements(elements: &[FirestoreValue], context: &FieldPath) -> FirestoreResult<()> {
    for element in elements {
        validate_plain_value(element, context)?;
    }
    Ok(())
}

/// Rejects values that cannot be stored: sentinels outside of field position and
/// query-only markers.
fn validate_plain_value(value: &FirestoreValue, context: &FieldPath) -> FirestoreResult<()> {
    match value.kind() {
        ValueKind::Sentinel(_) => Err(invalid_argument(format!(
            "Invalid data. FieldValue sentinels cannot be used inside arrays (field '{context}')."
        ))),
        ValueKind::DocumentId => Err(invalid_argument(format!(
            "Invalid data. FieldPath.documentId() is only valid in queries (field '{context}')."
        ))),
        ValueKind::Unrecognized(type_name) => Err(invalid_argument(format!(
            "Invalid data. Unsupported field value of type '{type_name}' (field '{context}')."
        ))),
        ValueKind::Array(array) => {
            for element in array.values() {
                validate_plain_value(element, context)?;
            }
            Ok(())
        }
        ValueKind::Map(map) => {
            for element in map.fields().values() {
                validate_plain_value(element, context)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_mask_against_available(mask: &[FieldPath], available: &[FieldPath]) -> FirestoreResult<()> {
    for field in mask {
        let covered = available
            .iter()
            .any(|path| field.is_prefix_of(path) || path.is_prefix_of(field));
        if !covered {
            return Err(invalid_argument(format!(
                "Field '{field}' is specified in your field mask but missing from your input data."
            )));
        }
    }
    Ok(())
}

fn dedup_paths(paths: Vec<FieldPath>) -> Vec<FieldPath> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(path.canonical_string()))
        .collect()
}

fn collect_leaf_paths(data: &BTreeMap<String, FirestoreValue>) -> FirestoreResult<Vec<FieldPath>> {
    let mut paths = Vec::new();
    for (key, value) in data {
        collect_paths_from_value(&mut paths, vec![key.clone()], value)?;
    }
    Ok(paths)
}

fn collect_paths_from_value(
    acc: &mut Vec<FieldPath>,
    segments: Vec<String>,
    value: &FirestoreValue,
) -> FirestoreResult<()> {
    match value.kind() {
        ValueKind::Map(map) if !map.fields().is_empty() => {
            for (child_key, child_value) in map.fields() {
                let mut child_segments = segments.clone();
                child_segments.push(child_key.clone());
                collect_paths_from_value(acc, child_segments, child_value)?;
            }
            Ok(())
        }
        _ => {
            acc.push(FieldPath::new(segments)?);
            Ok(())
        }
    }
}

pub(crate) fn value_for_field_path(map: &MapValue, path: &FieldPath) -> Option<FirestoreValue> {
    value_for_segments(map.fields(), path.segments())
}

fn value_for_segments(fields: &BTreeMap<String, FirestoreValue>, segments: &[String]) -> Option<FirestoreValue> {
    let (first, rest) = segments.split_first()?;
    let value = fields.get(first)?;
    if rest.is_empty() {
        Some(value.clone())
    } else if let ValueKind::Map(child) = value.kind() {
        value_for_segments(child.fields(), rest)
    } else {
        None
    }
}

/// Writes `value` at `path`, replacing any non-map value found on the way.
pub(crate) fn set_value_at_field_path(
    fields: &mut BTreeMap<String, FirestoreValue>,
    path: &FieldPath,
    value: FirestoreValue,
) {
    set_value_at_segments(fields, path.segments(), value);
}

fn set_value_at_segments(fields: &mut BTreeMap<String, FirestoreValue>, segments: &[String], value: FirestoreValue) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.insert(first.clone(), value);
        return;
    }

    let entry = fields
        .entry(first.clone())
        .or_insert_with(|| FirestoreValue::from_map(BTreeMap::new()));
    let mut child_fields = match entry.kind() {
        ValueKind::Map(map) => map.fields().clone(),
        _ => BTreeMap::new(),
    };
    set_value_at_segments(&mut child_fields, rest, value);
    *entry = FirestoreValue::from_map(child_fields);
}

pub(crate) fn remove_value_at_field_path(fields: &mut BTreeMap<String, FirestoreValue>, path: &FieldPath) {
    remove_value_at_segments(fields, path.segments());
}

fn remove_value_at_segments(fields: &mut BTreeMap<String, FirestoreValue>, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.remove(first);
        return;
    }
    if let Some(entry) = fields.get_mut(first) {
        if let ValueKind::Map(map) = entry.kind() {
            let mut child_fields = map.fields().clone();
            remove_value_at_segments(&mut child_fields, rest);
            *entry = FirestoreValue::from_map(child_fields);
        }
    }
}

/// Resolves transforms against the document's current fields, in order.
pub(crate) fn apply_transforms(fields: &mut BTreeMap<String, FirestoreValue>, transforms: &[FieldTransform]) {
    for transform in transforms {
        let current = value_for_segments(fields, transform.field_path().segments());
        let next = match transform.operation() {
            TransformOperation::ServerTimestamp => FirestoreValue::from_timestamp(Timestamp::now()),
            TransformOperation::ArrayUnion(elements) => {
                let mut values = existing_array(current);
                for element in elements {
                    if !values.contains(element) {
                        values.push(element.clone());
                    }
                }
                FirestoreValue::from_array(values)
            }
            TransformOperation::ArrayRemove(elements) => {
                let values = existing_array(current)
                    .into_iter()
                    .filter(|value| !elements.contains(value))
                    .collect();
                FirestoreValue::from_array(values)
            }
            TransformOperation::NumericIncrement(operand) => increment(current, operand),
        };
        set_value_at_field_path(fields, transform.field_path(), next);
    }
}

fn existing_array(current: Option<FirestoreValue>) -> Vec<FirestoreValue> {
    match current.map(FirestoreValue::into_kind) {
        Some(ValueKind::Array(array)) => array.into_values(),
        _ => Vec::new(),
    }
}

fn increment(current: Option<FirestoreValue>, operand: &FirestoreValue) -> FirestoreValue {
    let current = current.map(FirestoreValue::into_kind);
    match (current, operand.kind()) {
        (Some(ValueKind::Integer(base)), ValueKind::Integer(delta)) => {
            FirestoreValue::from_integer(base.saturating_add(*delta))
        }
        (Some(ValueKind::Integer(base)), ValueKind::Double(delta)) => FirestoreValue::from_double(base as f64 + delta),
        (Some(ValueKind::Double(base)), ValueKind::Integer(delta)) => FirestoreValue::from_double(base + *delta as f64),
        (Some(ValueKind::Double(base)), ValueKind::Double(delta)) => FirestoreValue::from_double(base + delta),
        _ => operand.clone(),
    }
}
