//! Compiles wire filter, order and cursor descriptors into query constraints.

use serde::Deserialize;

use crate::firestore::api::{
    Filter, FilterOperator, Firestore, OrderBy, OrderDirection, Query, QueryConstraint,
};
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::FieldPath;

use super::codec;
use super::tagged::TaggedValue;

/// A field path given either as a dotted string or as explicit segments.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldPathSpec {
    Dotted(String),
    Segments(Vec<String>),
}

impl FieldPathSpec {
    pub fn to_field_path(&self) -> FirestoreResult<FieldPath> {
        match self {
            FieldPathSpec::Dotted(path) => FieldPath::from_dot_separated(path),
            FieldPathSpec::Segments(segments) => FieldPath::new(segments.iter().cloned()),
        }
    }
}

/// Either a leaf `{fieldPath, operator, value}` or a composite `{operator: AND|OR, queries}`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    #[serde(default)]
    pub field_path: Option<FieldPathSpec>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<TaggedValue>,
    #[serde(default)]
    pub queries: Option<Vec<FilterSpec>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    pub field_path: FieldPathSpec,
    #[serde(default)]
    pub direction: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptionsSpec {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub limit_to_last: Option<i64>,
    #[serde(default)]
    pub start_at: Option<Vec<TaggedValue>>,
    #[serde(default)]
    pub start_after: Option<Vec<TaggedValue>>,
    #[serde(default)]
    pub end_at: Option<Vec<TaggedValue>>,
    #[serde(default)]
    pub end_before: Option<Vec<TaggedValue>>,
}

/// Something that can absorb one query constraint at a time.
pub trait ConstraintTarget: Sized {
    fn apply_constraint(self, constraint: QueryConstraint) -> FirestoreResult<Self>;
}

impl ConstraintTarget for Query {
    fn apply_constraint(self, constraint: QueryConstraint) -> FirestoreResult<Self> {
        self.apply(constraint)
    }
}

fn filter_operator(operator: &str) -> FirestoreResult<FilterOperator> {
    let operator = match operator {
        "EQUAL" => FilterOperator::Equal,
        "NOT_EQUAL" => FilterOperator::NotEqual,
        "GREATER_THAN" => FilterOperator::GreaterThan,
        "GREATER_THAN_OR_EQUAL" => FilterOperator::GreaterThanOrEqual,
        "LESS_THAN" => FilterOperator::LessThan,
        "LESS_THAN_OR_EQUAL" => FilterOperator::LessThanOrEqual,
        "ARRAY_CONTAINS" => FilterOperator::ArrayContains,
        "ARRAY_CONTAINS_ANY" => FilterOperator::ArrayContainsAny,
        "IN" => FilterOperator::In,
        "NOT_IN" => FilterOperator::NotIn,
        _ => return Err(invalid_argument("Invalid filter operator")),
    };
    Ok(operator)
}

pub fn compile_filter(firestore: &Firestore, spec: &FilterSpec) -> FirestoreResult<Filter> {
    if let (Some(field_path), Some(operator), Some(value)) = (&spec.field_path, &spec.operator, &spec.value) {
        let operator = filter_operator(operator)?;
        let field = field_path.to_field_path()?;
        return Ok(Filter::field(field, operator, codec::decode(firestore, value)));
    }

    match (spec.operator.as_deref(), &spec.queries) {
        (Some(combinator @ ("AND" | "OR")), Some(queries)) => {
            let filters = queries
                .iter()
                .map(|child| compile_filter(firestore, child))
                .collect::<FirestoreResult<Vec<_>>>()?;
            Ok(if combinator == "AND" {
                Filter::and(filters)
            } else {
                Filter::or(filters)
            })
        }
        _ => Err(invalid_argument("Invalid filter.")),
    }
}

fn compile_order(spec: &OrderSpec) -> FirestoreResult<OrderBy> {
    let direction = if spec.direction == "ASCENDING" {
        OrderDirection::Ascending
    } else {
        OrderDirection::Descending
    };
    Ok(OrderBy::new(spec.field_path.to_field_path()?, direction))
}

/// Translates every descriptor into constraints, in application order: filters,
/// then orderings, then `limit`, `limitToLast`, `startAt`, `startAfter`, `endAt`, `endBefore`.
pub fn compile_constraints(
    firestore: &Firestore,
    filters: &[FilterSpec],
    orders: &[OrderSpec],
    options: &QueryOptionsSpec,
) -> FirestoreResult<Vec<QueryConstraint>> {
    let mut constraints = Vec::new();
    for filter in filters {
        constraints.push(QueryConstraint::Where(compile_filter(firestore, filter)?));
    }
    for order in orders {
        constraints.push(QueryConstraint::OrderBy(compile_order(order)?));
    }

    let cursor = |values: &Vec<TaggedValue>| codec::decode_array(firestore, values);
    if let Some(limit) = options.limit {
        constraints.push(QueryConstraint::Limit(limit));
    }
    if let Some(limit) = options.limit_to_last {
        constraints.push(QueryConstraint::LimitToLast(limit));
    }
    if let Some(values) = &options.start_at {
        constraints.push(QueryConstraint::StartAt(cursor(values)));
    }
    if let Some(values) = &options.start_after {
        constraints.push(QueryConstraint::StartAfter(cursor(values)));
    }
    if let Some(values) = &options.end_at {
        constraints.push(QueryConstraint::EndAt(cursor(values)));
    }
    if let Some(values) = &options.end_before {
        constraints.push(QueryConstraint::EndBefore(cursor(values)));
    }
    Ok(constraints)
}

/// Folds the compiled constraints into `query`, one at a time and in order.
///
/// Every descriptor is compiled before the first constraint is applied, so a
/// malformed filter fails without touching the query.
pub fn build_query<Q: ConstraintTarget>(
    firestore: &Firestore,
    query: Q,
    filters: &[FilterSpec],
    orders: &[OrderSpec],
    options: &QueryOptionsSpec,
) -> FirestoreResult<Q> {
    compile_constraints(firestore, filters, orders, options)?
        .into_iter()
        .try_fold(query, |query, constraint| query.apply_constraint(constraint))
}
