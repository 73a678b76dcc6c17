use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::firestore::api::aggregate::{AggregateOperation, AggregateSpec};
use crate::firestore::api::operations::value_for_field_path;
use crate::firestore::api::{
    Bound, CompositeOperator, DocumentSnapshot, FieldFilter, Filter, FilterOperator, LimitType, OrderBy,
    OrderDirection, QueryDefinition,
};
use crate::firestore::model::FieldPath;
use crate::firestore::value::{FirestoreValue, ValueKind};

/// Applies the query definition to a set of candidate documents and returns the
/// filtered, ordered and bounded result set.
///
/// Candidates outside the query target or without data are dropped.
pub(crate) fn apply_query_to_documents(
    documents: Vec<DocumentSnapshot>,
    definition: &QueryDefinition,
) -> Vec<DocumentSnapshot> {
    let order_by = definition.result_order_by();
    let mut filtered: Vec<DocumentSnapshot> = documents
        .into_iter()
        .filter(|snapshot| snapshot.exists())
        .filter(|snapshot| definition.matches_target(snapshot.document_key()))
        .filter(|snapshot| definition.filters().iter().all(|filter| matches_filter(snapshot, filter)))
        // Documents missing an ordered field never appear in ordered results.
        .filter(|snapshot| order_by.iter().all(|order| get_field_value(snapshot, order.field()).is_some()))
        .collect();

    filtered.sort_by(|left, right| compare_snapshots(left, right, &order_by));

    if let Some(bound) = definition.start_at() {
        filtered.retain(|snapshot| !is_before_start_bound(snapshot, bound, &order_by));
    }

    if let Some(bound) = definition.end_at() {
        filtered.retain(|snapshot| !is_after_end_bound(snapshot, bound, &order_by));
    }

    if let Some(limit) = definition.limit() {
        let limit = limit as usize;
        if filtered.len() > limit {
            match definition.limit_type() {
                LimitType::First => filtered.truncate(limit),
                LimitType::Last => {
                    let start = filtered.len() - limit;
                    filtered.drain(0..start);
                }
            }
        }
    }

    filtered
}

/// Computes every aggregate in `spec` over an already evaluated result set.
pub(crate) fn compute_aggregates(
    documents: &[DocumentSnapshot],
    spec: &AggregateSpec,
) -> BTreeMap<String, FirestoreValue> {
    spec.iter()
        .map(|(alias, field)| {
            let value = match field.operation() {
                AggregateOperation::Count => FirestoreValue::from_integer(documents.len() as i64),
                AggregateOperation::Sum(path) => sum(documents, path),
                AggregateOperation::Average(path) => average(documents, path),
            };
            (alias.clone(), value)
        })
        .collect()
}

fn numeric_values<'a>(documents: &'a [DocumentSnapshot], path: &'a FieldPath) -> impl Iterator<Item = FirestoreValue> + 'a {
    documents
        .iter()
        .filter_map(move |snapshot| get_field_value(snapshot, path))
        .filter(|value| matches!(value.kind(), ValueKind::Integer(_) | ValueKind::Double(_)))
}

fn sum(documents: &[DocumentSnapshot], path: &FieldPath) -> FirestoreValue {
    let mut integer_total: Option<i64> = Some(0);
    let mut double_total = 0.0;
    for value in numeric_values(documents, path) {
        match value.kind() {
            ValueKind::Integer(number) => {
                integer_total = integer_total.and_then(|total| total.checked_add(*number));
                double_total += *number as f64;
            }
            ValueKind::Double(number) => {
                integer_total = None;
                double_total += number;
            }
            _ => {}
        }
    }
    match integer_total {
        Some(total) => FirestoreValue::from_integer(total),
        None => FirestoreValue::from_double(double_total),
    }
}

fn average(documents: &[DocumentSnapshot], path: &FieldPath) -> FirestoreValue {
    let mut count = 0usize;
    let mut total = 0.0;
    for value in numeric_values(documents, path) {
        count += 1;
        total += as_f64(&value).unwrap_or_default();
    }
    if count == 0 {
        FirestoreValue::null()
    } else {
        FirestoreValue::from_double(total / count as f64)
    }
}

fn matches_filter(snapshot: &DocumentSnapshot, filter: &Filter) -> bool {
    match filter {
        Filter::Field(field_filter) => match get_field_value(snapshot, field_filter.field()) {
            Some(value) => evaluate_filter(field_filter, &value),
            None => false,
        },
        Filter::Composite(composite) => match composite.operator() {
            CompositeOperator::And => composite.filters().iter().all(|child| matches_filter(snapshot, child)),
            CompositeOperator::Or => composite.filters().iter().any(|child| matches_filter(snapshot, child)),
        },
    }
}

fn evaluate_filter(filter: &FieldFilter, value: &FirestoreValue) -> bool {
    let operand = filter.value();
    match filter.operator() {
        FilterOperator::Equal => values_equal(value, operand),
        FilterOperator::NotEqual => !is_null(value) && !values_equal(value, operand),
        FilterOperator::LessThan => compare_same_type(value, operand) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => {
            matches!(compare_same_type(value, operand), Some(Ordering::Less | Ordering::Equal))
        }
        FilterOperator::GreaterThan => compare_same_type(value, operand) == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => {
            matches!(compare_same_type(value, operand), Some(Ordering::Greater | Ordering::Equal))
        }
        FilterOperator::ArrayContains => {
            array_elements(value).is_some_and(|elements| elements.iter().any(|element| values_equal(element, operand)))
        }
        FilterOperator::ArrayContainsAny => match (array_elements(value), array_elements(operand)) {
            (Some(elements), Some(needles)) => needles
                .iter()
                .any(|needle| elements.iter().any(|element| values_equal(element, needle))),
            _ => false,
        },
        FilterOperator::In => {
            array_elements(operand).is_some_and(|needles| needles.iter().any(|needle| values_equal(value, needle)))
        }
        FilterOperator::NotIn => {
            !is_null(value)
                && array_elements(operand)
                    .is_some_and(|needles| needles.iter().all(|needle| !values_equal(value, needle)))
        }
    }
}

fn get_field_value(snapshot: &DocumentSnapshot, field: &FieldPath) -> Option<FirestoreValue> {
    if field.is_document_id() {
        let key = snapshot.document_key();
        return Some(FirestoreValue::from_reference(key.path().canonical_string()));
    }
    value_for_field_path(snapshot.map_value()?, field)
}

fn is_null(value: &FirestoreValue) -> bool {
    matches!(value.kind(), ValueKind::Null)
}

fn array_elements(value: &FirestoreValue) -> Option<&[FirestoreValue]> {
    match value.kind() {
        ValueKind::Array(array) => Some(array.values()),
        _ => None,
    }
}

fn as_f64(value: &FirestoreValue) -> Option<f64> {
    match value.kind() {
        ValueKind::Integer(number) => Some(*number as f64),
        ValueKind::Double(number) => Some(*number),
        _ => None,
    }
}

/// Integers and doubles compare by numeric value; NaN equals NaN.
fn values_equal(left: &FirestoreValue, right: &FirestoreValue) -> bool {
    compare_values(left, right) == Ordering::Equal
}

fn compare_same_type(left: &FirestoreValue, right: &FirestoreValue) -> Option<Ordering> {
    if type_order(left) != type_order(right) {
        return None;
    }
    Some(compare_values(left, right))
}

fn type_order(value: &FirestoreValue) -> u8 {
    match value.kind() {
        ValueKind::Null => 0,
        ValueKind::Boolean(_) => 1,
        ValueKind::Integer(_) | ValueKind::Double(_) => 2,
        ValueKind::Timestamp(_) => 3,
        ValueKind::Sentinel(_) => 4,
        ValueKind::String(_) => 5,
        ValueKind::Bytes(_) => 6,
        ValueKind::Reference(_) | ValueKind::DocumentId => 7,
        ValueKind::GeoPoint(_) => 8,
        ValueKind::Array(_) => 9,
        ValueKind::Vector(_) => 10,
        ValueKind::Map(_) => 11,
        ValueKind::Unrecognized(_) => 12,
    }
}

/// Total order across all value types, following Firestore's cross-type ordering.
pub(crate) fn compare_values(left: &FirestoreValue, right: &FirestoreValue) -> Ordering {
    let by_type = type_order(left).cmp(&type_order(right));
    if by_type != Ordering::Equal {
        return by_type;
    }
    match (left.kind(), right.kind()) {
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => a.cmp(b),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => a.cmp(b),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => a.cmp(b),
        (ValueKind::String(a), ValueKind::String(b)) => a.cmp(b),
        (ValueKind::Bytes(a), ValueKind::Bytes(b)) => a.as_slice().cmp(b.as_slice()),
        (ValueKind::Reference(a), ValueKind::Reference(b)) => compare_paths(a, b),
        (ValueKind::GeoPoint(a), ValueKind::GeoPoint(b)) => a.compare(b),
        (ValueKind::Array(a), ValueKind::Array(b)) => compare_sequences(a.values(), b.values()),
        (ValueKind::Vector(a), ValueKind::Vector(b)) => a.len().cmp(&b.len()).then_with(|| {
            a.values()
                .iter()
                .zip(b.values())
                .map(|(x, y)| compare_doubles(*x, *y))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        (ValueKind::Map(a), ValueKind::Map(b)) => {
            for ((left_key, left_value), (right_key, right_value)) in a.fields().iter().zip(b.fields()) {
                let ordering = left_key
                    .cmp(right_key)
                    .then_with(|| compare_values(left_value, right_value));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.fields().len().cmp(&b.fields().len())
        }
        (ValueKind::Unrecognized(a), ValueKind::Unrecognized(b)) => a.cmp(b),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => compare_doubles(a, b),
            _ => Ordering::Equal,
        },
    }
}

/// NaN sorts before every other number and equals itself.
fn compare_doubles(left: f64, right: f64) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

fn compare_paths(left: &str, right: &str) -> Ordering {
    left.split('/').cmp(right.split('/'))
}

fn compare_sequences(left: &[FirestoreValue], right: &[FirestoreValue]) -> Ordering {
    for (a, b) in left.iter().zip(right) {
        let ordering = compare_values(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

fn compare_snapshots(left: &DocumentSnapshot, right: &DocumentSnapshot, order_by: &[OrderBy]) -> Ordering {
    for order in order_by {
        let left_value = get_field_value(left, order.field()).unwrap_or_else(FirestoreValue::null);
        let right_value = get_field_value(right, order.field()).unwrap_or_else(FirestoreValue::null);
        let mut ordering = compare_values(&left_value, &right_value);
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn is_before_start_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_snapshot_to_bound(snapshot, bound, order_by);
    if bound.inclusive() {
        ordering == Ordering::Less
    } else {
        ordering != Ordering::Greater
    }
}

fn is_after_end_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_snapshot_to_bound(snapshot, bound, order_by);
    if bound.inclusive() {
        ordering == Ordering::Greater
    } else {
        ordering != Ordering::Less
    }
}

fn compare_snapshot_to_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> Ordering {
    for (order, bound_value) in order_by.iter().zip(bound.values()) {
        let snapshot_value = get_field_value(snapshot, order.field()).unwrap_or_else(FirestoreValue::null);
        let mut ordering = compare_values(&snapshot_value, bound_value);
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::api::aggregate::AggregateField;
    use crate::firestore::api::{Query, SnapshotMetadata};
    use crate::firestore::model::DocumentKey;
    use crate::firestore::value::MapValue;
    use crate::test_support::test_firestore;

    fn doc(path: &str, fields: Vec<(&str, FirestoreValue)>) -> DocumentSnapshot {
        let map = fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect::<BTreeMap<_, _>>();
        DocumentSnapshot::new(
            DocumentKey::from_string(path).unwrap(),
            Some(MapValue::new(map)),
            SnapshotMetadata::default(),
        )
    }

    fn field(path: &str) -> FieldPath {
        FieldPath::from_dot_separated(path).unwrap()
    }

    fn cities() -> Vec<DocumentSnapshot> {
        vec![
            doc(
                "cities/LA",
                vec![("state", FirestoreValue::from_string("CA")), ("population", FirestoreValue::from_integer(4))],
            ),
            doc(
                "cities/SF",
                vec![("state", FirestoreValue::from_string("CA")), ("population", FirestoreValue::from_double(0.5))],
            ),
            doc(
                "cities/NYC",
                vec![("state", FirestoreValue::from_string("NY")), ("population", FirestoreValue::from_integer(8))],
            ),
            doc("cities/SF/landmarks/bridge", vec![("state", FirestoreValue::from_string("CA"))]),
        ]
    }

    fn ids(documents: &[DocumentSnapshot]) -> Vec<&str> {
        documents.iter().map(|snapshot| snapshot.id()).collect()
    }

    fn query() -> Query {
        test_firestore().collection("cities").unwrap()
    }

    #[test]
    fn filters_and_orders_numbers_across_types() {
        let query = query()
            .where_filter(Filter::field(field("state"), FilterOperator::Equal, FirestoreValue::from_string("CA")))
            .unwrap()
            .order_by(field("population"), OrderDirection::Descending)
            .unwrap();
        let results = apply_query_to_documents(cities(), query.definition());
        assert_eq!(ids(&results), vec!["LA", "SF"]);
    }

    #[test]
    fn or_filter_matches_either_branch() {
        let query = query()
            .where_filter(Filter::or(vec![
                Filter::field(field("state"), FilterOperator::Equal, FirestoreValue::from_string("NY")),
                Filter::field(field("population"), FilterOperator::LessThan, FirestoreValue::from_integer(1)),
            ]))
            .unwrap();
        let results = apply_query_to_documents(cities(), query.definition());
        // Ordered by the inequality field first.
        assert_eq!(ids(&results), vec!["SF", "NYC"]);
    }

    #[test]
    fn limit_to_last_keeps_tail() {
        let query = query()
            .order_by(field("population"), OrderDirection::Ascending)
            .unwrap()
            .limit_to_last(2)
            .unwrap();
        let results = apply_query_to_documents(cities(), query.definition());
        assert_eq!(ids(&results), vec!["LA", "NYC"]);
    }

    #[test]
    fn start_after_cursor_skips_bound() {
        let query = query()
            .order_by(field("population"), OrderDirection::Ascending)
            .unwrap()
            .start_after(vec![FirestoreValue::from_integer(4)])
            .unwrap();
        let results = apply_query_to_documents(cities(), query.definition());
        assert_eq!(ids(&results), vec!["NYC"]);
    }

    #[test]
    fn collection_group_spans_parents() {
        let query = test_firestore().collection_group("landmarks").unwrap();
        let results = apply_query_to_documents(cities(), query.definition());
        assert_eq!(ids(&results), vec!["bridge"]);
    }

    #[test]
    fn not_in_excludes_missing_and_listed_values() {
        let query = query()
            .where_filter(Filter::field(
                field("state"),
                FilterOperator::NotIn,
                FirestoreValue::from_array(vec![FirestoreValue::from_string("NY")]),
            ))
            .unwrap();
        let results = apply_query_to_documents(cities(), query.definition());
        assert_eq!(ids(&results), vec!["LA", "SF"]);
    }

    #[test]
    fn aggregates_count_sum_and_average() {
        let query = query();
        let results = apply_query_to_documents(cities(), query.definition());
        let spec = AggregateSpec::new()
            .with_field("count", AggregateField::count())
            .unwrap()
            .with_field("total", AggregateField::sum(field("population")))
            .unwrap()
            .with_field("avg", AggregateField::average(field("missing")))
            .unwrap();
        let data = compute_aggregates(&results, &spec);
        assert_eq!(data["count"], FirestoreValue::from_integer(3));
        assert_eq!(data["total"], FirestoreValue::from_double(12.5));
        assert_eq!(data["avg"], FirestoreValue::null());
    }

    #[test]
    fn integers_and_doubles_compare_numerically() {
        assert!(values_equal(&FirestoreValue::from_integer(1), &FirestoreValue::from_double(1.0)));
        assert_eq!(
            compare_values(&FirestoreValue::from_bool(true), &FirestoreValue::from_integer(0)),
            Ordering::Less
        );
    }
}
