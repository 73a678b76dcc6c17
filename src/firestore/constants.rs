pub const DEFAULT_DATABASE_ID: &str = "(default)";

/// Reserved field path that addresses a document's key.
pub const DOCUMENT_ID_FIELD: &str = "__name__";

/// Name of the event the transaction bridge emits for lifecycle transitions.
pub const TRANSACTION_EVENT_NAME: &str = "firestore_transaction_event";
