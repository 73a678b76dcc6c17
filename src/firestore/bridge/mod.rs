//! Bridge between JSON-shaped platform calls and the typed Firestore API.
//!
//! Values cross the boundary as tagged tuples ([`TaggedValue`]); writes, queries and
//! transactions are rebuilt on this side by the batch parser, the query compiler and
//! the transaction session registry. [`FirestoreModule`] ties them together.

pub mod batch;
pub mod codec;
mod dispatch;
pub mod events;
pub mod module;
pub mod query_compiler;
pub mod snapshot;
pub mod tagged;
pub mod transaction;

pub use batch::{apply_writes, parse_batch, SetOptionsSpec, WireEntry, WriteDescriptor, WriteTarget, WriteType};
pub use codec::{decode, decode_array, decode_object, encode, encode_array, encode_object};
pub use events::{BridgeEvent, ChannelEventEmitter, EventEmitter, TransactionEventBody, TransactionId};
pub use module::{
    AggregateFieldSpec, AggregateType, CountWire, DatastoreFactory, FirestoreModule, FirestoreModuleBuilder,
    FirestoreModuleSettings, GetOptionsSpec, InMemoryDatastoreFactory, QueryRequest, QueryType,
};
pub use query_compiler::{build_query, compile_filter, ConstraintTarget, FieldPathSpec, FilterSpec, OrderSpec, QueryOptionsSpec};
pub use snapshot::{DocumentChangeWire, DocumentSnapshotWire, QuerySnapshotWire};
pub use tagged::{FieldValueSpec, TaggedValue};
pub use transaction::{SessionKey, TransactionRegistry};
