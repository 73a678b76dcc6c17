use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, FieldPath, ResourcePath};
use crate::firestore::value::{FirestoreValue, ValueKind};

use super::database::Firestore;
use super::snapshot::{DocumentSnapshot, SnapshotMetadata};

/// The set of documents a query scans before filtering.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryTarget {
    Collection(ResourcePath),
    CollectionGroup(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "==",
            FilterOperator::NotEqual => "!=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::ArrayContains => "array-contains",
            FilterOperator::ArrayContainsAny => "array-contains-any",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not-in",
        }
    }

    /// Inequality operators force an implicit ordering on their field.
    pub fn is_inequality(&self) -> bool {
        matches!(
            self,
            FilterOperator::NotEqual
                | FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual
                | FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
                | FilterOperator::NotIn
        )
    }

    fn requires_array_operand(&self) -> bool {
        matches!(
            self,
            FilterOperator::ArrayContainsAny | FilterOperator::In | FilterOperator::NotIn
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: FieldPath,
    operator: FilterOperator,
    value: FirestoreValue,
}

impl FieldFilter {
    pub fn new(field: FieldPath, operator: FilterOperator, value: FirestoreValue) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &FirestoreValue {
        &self.value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeOperator {
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompositeFilter {
    operator: CompositeOperator,
    filters: Vec<Filter>,
}

impl CompositeFilter {
    pub fn new(operator: CompositeOperator, filters: Vec<Filter>) -> Self {
        Self { operator, filters }
    }

    pub fn operator(&self) -> CompositeOperator {
        self.operator
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

/// A single `where` constraint: a field comparison or an AND/OR tree of them.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Field(FieldFilter),
    Composite(CompositeFilter),
}

impl Filter {
    pub fn field(field: FieldPath, operator: FilterOperator, value: FirestoreValue) -> Self {
        Filter::Field(FieldFilter::new(field, operator, value))
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::Composite(CompositeFilter::new(CompositeOperator::And, filters))
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Composite(CompositeFilter::new(CompositeOperator::Or, filters))
    }

    /// Every field comparison in the tree, depth first.
    pub fn field_filters(&self) -> Vec<&FieldFilter> {
        match self {
            Filter::Field(filter) => vec![filter],
            Filter::Composite(composite) => composite
                .filters
                .iter()
                .flat_map(|child| child.field_filters())
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    field: FieldPath,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn new(field: FieldPath, direction: OrderDirection) -> Self {
        Self { field, direction }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitType {
    #[default]
    First,
    Last,
}

/// A cursor position. `inclusive` distinguishes startAt/endAt from startAfter/endBefore.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    values: Vec<FirestoreValue>,
    inclusive: bool,
}

impl Bound {
    pub fn new(values: Vec<FirestoreValue>, inclusive: bool) -> Self {
        Self { values, inclusive }
    }

    pub fn values(&self) -> &[FirestoreValue] {
        &self.values
    }

    pub fn inclusive(&self) -> bool {
        self.inclusive
    }
}

/// One step of query construction, applied with [`Query::apply`].
#[derive(Clone, Debug, PartialEq)]
pub enum QueryConstraint {
    Where(Filter),
    OrderBy(OrderBy),
    Limit(i64),
    LimitToLast(i64),
    StartAt(Vec<FirestoreValue>),
    StartAfter(Vec<FirestoreValue>),
    EndAt(Vec<FirestoreValue>),
    EndBefore(Vec<FirestoreValue>),
}

/// Backend-facing description of a query, free of the owning `Firestore` handle.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDefinition {
    target: QueryTarget,
    filters: Vec<Filter>,
    explicit_order_by: Vec<OrderBy>,
    limit: Option<u32>,
    limit_type: LimitType,
    start_at: Option<Bound>,
    end_at: Option<Bound>,
}

impl QueryDefinition {
    fn new(target: QueryTarget) -> Self {
        Self {
            target,
            filters: Vec::new(),
            explicit_order_by: Vec::new(),
            limit: None,
            limit_type: LimitType::First,
            start_at: None,
            end_at: None,
        }
    }

    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn explicit_order_by(&self) -> &[OrderBy] {
        &self.explicit_order_by
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn limit_type(&self) -> LimitType {
        self.limit_type
    }

    pub fn start_at(&self) -> Option<&Bound> {
        self.start_at.as_ref()
    }

    pub fn end_at(&self) -> Option<&Bound> {
        self.end_at.as_ref()
    }

    pub(crate) fn matches_target(&self, key: &DocumentKey) -> bool {
        match &self.target {
            QueryTarget::Collection(path) => &key.collection_path() == path,
            QueryTarget::CollectionGroup(collection_id) => key.collection_group() == collection_id,
        }
    }

    /// Explicit orderings followed by the implicit ones: inequality fields that are
    /// not ordered yet (lexicographically) and finally the document key.
    pub fn result_order_by(&self) -> Vec<OrderBy> {
        let mut order_by = self.explicit_order_by.clone();
        let last_direction = order_by
            .last()
            .map(|order| order.direction())
            .unwrap_or(OrderDirection::Ascending);

        let mut inequality_fields: Vec<FieldPath> = self
            .filters
            .iter()
            .flat_map(|filter| filter.field_filters())
            .filter(|filter| filter.operator().is_inequality())
            .map(|filter| filter.field().clone())
            .collect();
        inequality_fields.sort_by_key(|field| field.canonical_string());
        inequality_fields.dedup();

        for field in inequality_fields {
            if !field.is_document_id() && !order_by.iter().any(|order| order.field() == &field) {
                order_by.push(OrderBy::new(field, last_direction));
            }
        }

        if !order_by.iter().any(|order| order.field().is_document_id()) {
            order_by.push(OrderBy::new(FieldPath::document_id(), last_direction));
        }
        order_by
    }
}

/// A Firestore query: a target plus the constraints applied to it so far.
///
/// Queries are immutable values; every constraint produces a new query.
#[derive(Clone, Debug)]
pub struct Query {
    firestore: Firestore,
    definition: QueryDefinition,
}

impl Query {
    pub(crate) fn new(firestore: Firestore, target: QueryTarget) -> Self {
        Self {
            firestore,
            definition: QueryDefinition::new(target),
        }
    }

    /// Returns the Firestore instance that created this query.
    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    pub fn definition(&self) -> &QueryDefinition {
        &self.definition
    }

    /// Returns a new query with `constraint` appended.
    pub fn apply(self, constraint: QueryConstraint) -> FirestoreResult<Query> {
        match constraint {
            QueryConstraint::Where(filter) => self.where_filter(filter),
            QueryConstraint::OrderBy(order) => self.order_by(order.field, order.direction),
            QueryConstraint::Limit(limit) => self.limit(limit),
            QueryConstraint::LimitToLast(limit) => self.limit_to_last(limit),
            QueryConstraint::StartAt(values) => self.start_at(values),
            QueryConstraint::StartAfter(values) => self.start_after(values),
            QueryConstraint::EndAt(values) => self.end_at(values),
            QueryConstraint::EndBefore(values) => self.end_before(values),
        }
    }

    pub fn where_filter(mut self, filter: Filter) -> FirestoreResult<Query> {
        let filter = self.normalize_filter(filter)?;
        self.definition.filters.push(filter);
        Ok(self)
    }

    pub fn order_by(mut self, field: FieldPath, direction: OrderDirection) -> FirestoreResult<Query> {
        if self.definition.start_at.is_some() || self.definition.end_at.is_some() {
            return Err(invalid_argument(
                "Invalid query. You must not call startAt() / startAfter() / endAt() / endBefore() before calling orderBy().",
            ));
        }
        self.definition.explicit_order_by.push(OrderBy::new(field, direction));
        Ok(self)
    }

    pub fn limit(self, limit: i64) -> FirestoreResult<Query> {
        self.with_limit(limit, LimitType::First, "limit")
    }

    pub fn limit_to_last(self, limit: i64) -> FirestoreResult<Query> {
        self.with_limit(limit, LimitType::Last, "limitToLast")
    }

    pub fn start_at(self, values: Vec<FirestoreValue>) -> FirestoreResult<Query> {
        self.with_start(values, true, "startAt")
    }

    pub fn start_after(self, values: Vec<FirestoreValue>) -> FirestoreResult<Query> {
        self.with_start(values, false, "startAfter")
    }

    pub fn end_at(self, values: Vec<FirestoreValue>) -> FirestoreResult<Query> {
        self.with_end(values, true, "endAt")
    }

    pub fn end_before(self, values: Vec<FirestoreValue>) -> FirestoreResult<Query> {
        self.with_end(values, false, "endBefore")
    }

    fn with_limit(mut self, limit: i64, limit_type: LimitType, method: &str) -> FirestoreResult<Query> {
        if limit <= 0 || limit > u32::MAX as i64 {
            return Err(invalid_argument(format!(
                "Function {method}() requires a positive number, but it was: {limit}."
            )));
        }
        self.definition.limit = Some(limit as u32);
        self.definition.limit_type = limit_type;
        Ok(self)
    }

    fn with_start(mut self, values: Vec<FirestoreValue>, inclusive: bool, method: &str) -> FirestoreResult<Query> {
        let bound = self.bound(values, inclusive, method)?;
        self.definition.start_at = Some(bound);
        Ok(self)
    }

    fn with_end(mut self, values: Vec<FirestoreValue>, inclusive: bool, method: &str) -> FirestoreResult<Query> {
        let bound = self.bound(values, inclusive, method)?;
        self.definition.end_at = Some(bound);
        Ok(self)
    }

    fn bound(&self, values: Vec<FirestoreValue>, inclusive: bool, method: &str) -> FirestoreResult<Bound> {
        let order_by = &self.definition.explicit_order_by;
        if values.len() > order_by.len() {
            return Err(invalid_argument(format!(
                "Too many arguments provided to {method}(). The number of arguments must be less than or equal to the number of orderBy() clauses."
            )));
        }
        let values = values
            .into_iter()
            .zip(order_by.iter())
            .map(|(value, order)| {
                if order.field().is_document_id() {
                    self.document_id_operand(value)
                } else {
                    Ok(value)
                }
            })
            .collect::<FirestoreResult<Vec<_>>>()?;
        Ok(Bound::new(values, inclusive))
    }

    fn normalize_filter(&self, filter: Filter) -> FirestoreResult<Filter> {
        match filter {
            Filter::Field(field_filter) => {
                let FieldFilter {
                    field,
                    operator,
                    value,
                } = field_filter;
                if operator.requires_array_operand() && !matches!(value.kind(), ValueKind::Array(_)) {
                    return Err(invalid_argument(format!(
                        "Invalid Query. A non-empty array is required for '{}' filters.",
                        operator.as_str()
                    )));
                }
                let value = if field.is_document_id() {
                    self.document_id_filter_operand(operator, value)?
                } else {
                    value
                };
                Ok(Filter::Field(FieldFilter::new(field, operator, value)))
            }
            Filter::Composite(composite) => {
                let filters = composite
                    .filters
                    .into_iter()
                    .map(|child| self.normalize_filter(child))
                    .collect::<FirestoreResult<Vec<_>>>()?;
                Ok(Filter::Composite(CompositeFilter::new(composite.operator, filters)))
            }
        }
    }

    fn document_id_filter_operand(&self, operator: FilterOperator, value: FirestoreValue) -> FirestoreResult<FirestoreValue> {
        if operator.requires_array_operand() {
            let ValueKind::Array(array) = value.into_kind() else {
                return Ok(FirestoreValue::null());
            };
            let values = array
                .into_values()
                .into_iter()
                .map(|element| self.document_id_operand(element))
                .collect::<FirestoreResult<Vec<_>>>()?;
            return Ok(FirestoreValue::from_array(values));
        }
        self.document_id_operand(value)
    }

    /// Document-id comparisons accept a bare id (collection queries) or a full path.
    fn document_id_operand(&self, value: FirestoreValue) -> FirestoreResult<FirestoreValue> {
        match value.kind() {
            ValueKind::String(id) => {
                let path = match &self.definition.target {
                    QueryTarget::Collection(collection) if !id.contains('/') => collection.child([id.as_str()]),
                    _ => ResourcePath::from_string(id)?,
                };
                let key = DocumentKey::from_path(path)?;
                Ok(FirestoreValue::from_reference(key.path().canonical_string()))
            }
            ValueKind::Reference(_) => Ok(value),
            _ => Err(invalid_argument(
                "Invalid query. When querying with documentId(), you must provide a valid string or a DocumentReference.",
            )),
        }
    }
}

/// Metadata reported alongside query results.
pub type QuerySnapshotMetadata = SnapshotMetadata;

/// A snapshot containing the results of executing a query.
#[derive(Clone, Debug)]
pub struct QuerySnapshot {
    query: Query,
    documents: Vec<DocumentSnapshot>,
    metadata: QuerySnapshotMetadata,
}

impl QuerySnapshot {
    pub fn new(query: Query, documents: Vec<DocumentSnapshot>, metadata: QuerySnapshotMetadata) -> Self {
        Self {
            query,
            documents,
            metadata,
        }
    }

    /// Returns the query used to obtain this snapshot.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns all document snapshots returned by the query.
    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    pub fn metadata(&self) -> &QuerySnapshotMetadata {
        &self.metadata
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }
}
