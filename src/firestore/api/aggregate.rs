use std::collections::BTreeMap;

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::FieldPath;
use crate::firestore::value::{FirestoreValue, ValueKind};

use super::query::Query;

#[derive(Clone, Debug, PartialEq)]
pub enum AggregateOperation {
    Count,
    Sum(FieldPath),
    Average(FieldPath),
}

/// A single aggregation computed over the documents of a query.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateField {
    operation: AggregateOperation,
}

impl AggregateField {
    pub fn count() -> Self {
        Self {
            operation: AggregateOperation::Count,
        }
    }

    /// Sums the numeric values stored at `field`. Non-numeric values are ignored.
    pub fn sum(field: FieldPath) -> Self {
        Self {
            operation: AggregateOperation::Sum(field),
        }
    }

    /// Averages the numeric values stored at `field`; `null` when none are numeric.
    pub fn average(field: FieldPath) -> Self {
        Self {
            operation: AggregateOperation::Average(field),
        }
    }

    pub fn operation(&self) -> &AggregateOperation {
        &self.operation
    }
}

/// Aggregate fields keyed by the alias used in the result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateSpec {
    fields: BTreeMap<String, AggregateField>,
}

impl AggregateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: impl Into<String>, field: AggregateField) -> FirestoreResult<()> {
        let alias = alias.into();
        if alias.trim().is_empty() {
            return Err(invalid_argument(
                "Aggregate aliases must contain at least one non-whitespace character",
            ));
        }
        self.fields.insert(alias, field);
        Ok(())
    }

    pub fn with_field(mut self, alias: impl Into<String>, field: AggregateField) -> FirestoreResult<Self> {
        self.insert(alias, field)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AggregateField)> {
        self.fields.iter()
    }
}

#[derive(Clone, Debug)]
pub struct AggregateQuerySnapshot {
    query: Query,
    data: BTreeMap<String, FirestoreValue>,
}

impl AggregateQuerySnapshot {
    pub(crate) fn new(query: Query, data: BTreeMap<String, FirestoreValue>) -> Self {
        Self { query, data }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn data(&self) -> &BTreeMap<String, FirestoreValue> {
        &self.data
    }

    pub fn into_data(self) -> BTreeMap<String, FirestoreValue> {
        self.data
    }

    pub fn get(&self, alias: &str) -> Option<&FirestoreValue> {
        self.data.get(alias)
    }

    /// Returns the integer count recorded under `alias`, if present.
    pub fn count(&self, alias: &str) -> FirestoreResult<Option<i64>> {
        match self.data.get(alias) {
            Some(value) => match value.kind() {
                ValueKind::Integer(count) => Ok(Some(*count)),
                other => Err(invalid_argument(format!(
                    "Aggregate alias '{alias}' does not resolve to an integer count (found {other:?})"
                ))),
            },
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_spec_rejects_empty_alias() {
        let mut spec = AggregateSpec::new();
        let err = spec.insert(" ", AggregateField::count()).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn aggregate_spec_is_keyed_by_alias() {
        let spec = AggregateSpec::new()
            .with_field("total", AggregateField::sum(FieldPath::from_dot_separated("population").unwrap()))
            .unwrap()
            .with_field("count", AggregateField::count())
            .unwrap();
        let aliases: Vec<&String> = spec.iter().map(|(alias, _)| alias).collect();
        assert_eq!(aliases, vec!["count", "total"]);
    }
}
