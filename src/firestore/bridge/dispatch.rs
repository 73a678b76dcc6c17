//! JSON method table for hosts that forward `(method, args)` pairs verbatim.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::firestore::error::{internal_error, invalid_argument, unsupported, FirestoreResult, NativeError};
use crate::platform::runtime;

use super::batch::WireEntry;
use super::events::TransactionId;
use super::module::{AggregateFieldSpec, FirestoreModule, QueryRequest, QueryType, UNSUPPORTED_OPERATIONS};

/// Positional call arguments.
struct Args<'a> {
    method: &'a str,
    values: Vec<Value>,
}

impl<'a> Args<'a> {
    fn new(method: &'a str, args: Value) -> FirestoreResult<Self> {
        let values = match args {
            Value::Array(values) => values,
            Value::Null => Vec::new(),
            _ => {
                return Err(invalid_argument(format!(
                    "Arguments for {method} must be a JSON array"
                )))
            }
        };
        Ok(Self { method, values })
    }

    fn get<T: DeserializeOwned>(&self, index: usize) -> FirestoreResult<T> {
        let value = self.values.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|err| {
            invalid_argument(format!("Invalid argument {index} for {}: {err}", self.method))
        })
    }

    /// Like [`Args::get`], but a missing or `null` argument yields `T::default()`.
    fn get_or_default<T: DeserializeOwned + Default>(&self, index: usize) -> FirestoreResult<T> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(_) => self.get(index),
        }
    }

    fn query(&self, path: usize) -> FirestoreResult<QueryRequest> {
        Ok(QueryRequest {
            path: self.get(path)?,
            query_type: self.get::<Option<QueryType>>(path + 1)?.unwrap_or(QueryType::Collection),
            filters: self.get_or_default(path + 2)?,
            orders: self.get_or_default(path + 3)?,
            options: self.get_or_default(path + 4)?,
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> FirestoreResult<Value> {
    serde_json::to_value(value).map_err(|err| internal_error(format!("Failed to encode result: {err}")))
}

impl FirestoreModule {
    /// Invokes `method` with positional JSON `args` (`[appName, databaseId, ...]`).
    ///
    /// `transactionBegin` resolves as soon as the transaction is started; its
    /// outcome arrives through the event emitter. An unknown or deleted app
    /// rejects the call itself.
    pub async fn invoke(&self, method: &str, args: Value) -> Result<Value, NativeError> {
        self.dispatch(method, args).await.map_err(|err| err.to_native())
    }

    async fn dispatch(&self, method: &str, args: Value) -> FirestoreResult<Value> {
        let args = Args::new(method, args)?;
        if UNSUPPORTED_OPERATIONS.contains(&method) {
            return Err(unsupported(method));
        }

        let app: String = args.get(0)?;
        let database: String = args.get_or_default(1)?;
        match method {
            "documentGet" => {
                let path: String = args.get(2)?;
                let snapshot = self
                    .document_get(&app, &database, &path, &args.get_or_default(3)?)
                    .await?;
                to_json(&snapshot)
            }
            "documentSet" => {
                let path: String = args.get(2)?;
                self.document_set(&app, &database, &path, &args.get(3)?, &args.get_or_default(4)?)
                    .await?;
                Ok(Value::Null)
            }
            "documentUpdate" => {
                let path: String = args.get(2)?;
                self.document_update(&app, &database, &path, &args.get(3)?).await?;
                Ok(Value::Null)
            }
            "documentDelete" => {
                let path: String = args.get(2)?;
                self.document_delete(&app, &database, &path).await?;
                Ok(Value::Null)
            }
            "documentBatch" => {
                let writes: Vec<WireEntry> = args.get(2)?;
                self.document_batch(&app, &database, &writes).await?;
                Ok(Value::Null)
            }
            "collectionGet" => {
                let request = args.query(2)?;
                let snapshot = self
                    .collection_get(&app, &database, &request, &args.get_or_default(7)?)
                    .await?;
                to_json(&snapshot)
            }
            "collectionCount" => {
                let request = args.query(2)?;
                to_json(&self.collection_count(&app, &database, &request).await?)
            }
            "aggregateQuery" => {
                let request = args.query(2)?;
                let aggregates: Vec<AggregateFieldSpec> = args.get(7)?;
                to_json(&self.aggregate_query(&app, &database, &request, &aggregates).await?)
            }
            "transactionBegin" => {
                let transaction_id: TransactionId = args.get(2)?;
                // Failures before the first attempt reject the call; no event would follow them.
                self.instance(&app, &database)?;
                let module = self.clone();
                runtime::spawn_detached(async move {
                    if let Err(err) = module.transaction_begin(&app, &database, transaction_id.clone()).await {
                        log::debug!("transaction {transaction_id} finished with {err}");
                    }
                });
                Ok(Value::Null)
            }
            "transactionGetDocument" => {
                let path: String = args.get(3)?;
                let snapshot = self
                    .transaction_get_document(&app, &database, args.get(2)?, &path)
                    .await?;
                to_json(&snapshot)
            }
            "transactionApplyBuffer" => {
                let buffer: Vec<WireEntry> = args.get(3)?;
                self.transaction_apply_buffer(&app, &database, args.get(2)?, &buffer)?;
                Ok(Value::Null)
            }
            "transactionDispose" => {
                self.transaction_dispose(&app, &database, args.get(2)?);
                Ok(Value::Null)
            }
            "terminate" => {
                self.terminate(&app, &database)?;
                Ok(Value::Null)
            }
            "waitForPendingWrites" => {
                self.wait_for_pending_writes(&app, &database).await?;
                Ok(Value::Null)
            }
            _ => {
                log::debug!("rejecting unknown Firestore bridge method {method}");
                Err(unsupported(method))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FirebaseOptions;
    use serde_json::json;

    fn module() -> FirestoreModule {
        let module = FirestoreModule::builder().build();
        let options = FirebaseOptions {
            project_id: Some("dispatch-project".into()),
            ..Default::default()
        };
        module.apps().initialize_app(options, None).unwrap();
        module
    }

    #[tokio::test]
    async fn rejects_non_array_arguments() {
        let err = module().invoke("documentGet", json!({"path": "a/b"})).await.unwrap_err();
        assert_eq!(err.code, "invalid-argument");
    }

    #[tokio::test]
    async fn unsupported_operations_reject_before_reading_arguments() {
        let err = module().invoke("loadBundle", Value::Null).await.unwrap_err();
        assert_eq!(err.code, "unsupported");
        assert_eq!(err.message, "loadBundle is not supported in this environment.");
    }

    #[tokio::test]
    async fn unknown_method_is_unsupported() {
        let err = module()
            .invoke("documentTeleport", json!(["[DEFAULT]", ""]))
            .await
            .unwrap_err();
        assert_eq!(err.code, "unsupported");
    }

    #[tokio::test]
    async fn delete_then_get_reports_missing_document() {
        let module = module();
        module
            .invoke(
                "documentSet",
                json!(["[DEFAULT]", "", "cities/LA", {"name": [8, "LA"]}, {}]),
            )
            .await
            .unwrap();
        let result = module
            .invoke("documentDelete", json!(["[DEFAULT]", "", "cities/LA"]))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
        let snapshot = module
            .invoke("documentGet", json!(["[DEFAULT]", "", "cities/LA"]))
            .await
            .unwrap();
        assert_eq!(snapshot["exists"], json!(false));
    }

    #[tokio::test]
    async fn collection_get_applies_filters_orders_and_limit() {
        let module = module();
        let writes = json!([
            {"type": "SET", "path": "cities/SF", "data": {"population": [17, 8]}},
            {"type": "SET", "path": "cities/LA", "data": {"population": [17, 4]}},
            {"type": "SET", "path": "cities/NYC", "data": {"population": [17, 9]}}
        ]);
        module
            .invoke("documentBatch", json!(["[DEFAULT]", "", writes]))
            .await
            .unwrap();

        let snapshot = module
            .invoke(
                "collectionGet",
                json!([
                    "[DEFAULT]",
                    "",
                    "cities",
                    "collection",
                    [{"fieldPath": "population", "operator": "GREATER_THAN", "value": [17, 5]}],
                    [{"fieldPath": "population", "direction": "DESCENDING"}],
                    {"limit": 1},
                    {}
                ]),
            )
            .await
            .unwrap();
        assert_eq!(snapshot["source"], json!("get"));
        let documents = snapshot["documents"].as_array().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["path"], json!("cities/NYC"));
        assert_eq!(snapshot["changes"][0]["oi"], json!(-1));
    }

    #[tokio::test]
    async fn invalid_filter_is_invalid_argument() {
        let err = module()
            .invoke(
                "collectionGet",
                json!(["[DEFAULT]", "", "cities", "collection", [{"operator": "XOR"}], [], {}]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, "invalid-argument");
        assert_eq!(err.message, "Invalid filter.");
    }

    #[tokio::test]
    async fn collection_count_returns_count_object() {
        let module = module();
        module
            .invoke("documentSet", json!(["[DEFAULT]", "", "cities/SF", {}, {}]))
            .await
            .unwrap();
        let result = module
            .invoke("collectionCount", json!(["[DEFAULT]", "", "cities", "collection", [], [], {}]))
            .await
            .unwrap();
        assert_eq!(result, json!({"count": 1}));
    }
}
