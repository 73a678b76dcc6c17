pub(crate) mod aggregate;
mod database;
pub mod document;
pub(crate) mod operations;
pub(crate) mod query;
mod reference;
mod snapshot;
mod transaction;
mod write_batch;

pub use aggregate::{AggregateField, AggregateOperation, AggregateQuerySnapshot, AggregateSpec};
pub use database::Firestore;
pub use document::FirestoreClient;
pub use operations::{FieldTransform, SetOptions, TransformOperation};
pub use query::{
    Bound, CompositeFilter, CompositeOperator, FieldFilter, Filter, FilterOperator, LimitType, OrderBy,
    OrderDirection, Query, QueryConstraint, QueryDefinition, QuerySnapshot, QueryTarget,
};
pub use reference::DocumentReference;
pub use snapshot::{DocumentSnapshot, SnapshotMetadata};
pub use transaction::{Transaction, TransactionOptions};
pub use write_batch::WriteBatch;
