pub mod api;
pub mod bridge;
mod constants;
pub mod error;
pub mod model;
mod query_evaluator;
pub mod remote;
pub mod value;

pub use api::{DocumentReference, Firestore, FirestoreClient, Query, Transaction, WriteBatch};
pub use bridge::FirestoreModule;
pub use constants::{DEFAULT_DATABASE_ID, DOCUMENT_ID_FIELD};
pub use error::{FirestoreError, FirestoreErrorCode, FirestoreResult, NativeError};
