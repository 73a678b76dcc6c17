//! The root context the platform bridge talks to.
//!
//! A [`FirestoreModule`] owns everything that used to live in module-level
//! globals: the app registry handle, one cached [`FirestoreClient`] per
//! (app, database) pair, and the live transaction sessions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::AppRegistry;
use crate::firestore::api::{
    AggregateField, AggregateSpec, FirestoreClient, Firestore, Query, TransactionOptions,
};
use crate::firestore::constants::DEFAULT_DATABASE_ID;
use crate::firestore::error::{invalid_argument, unsupported, FirestoreResult};
use crate::firestore::model::DatabaseId;
use crate::firestore::remote::{Datastore, InMemoryDatastore};
use crate::firestore::value::{FirestoreValue, ValueKind};
use crate::util::BackoffConfig;

use super::batch::{apply_writes, parse_batch, SetOptionsSpec, WireEntry};
use super::codec;
use super::events::{BridgeEvent, EventEmitter, TransactionId};
use super::query_compiler::{build_query, FieldPathSpec, FilterSpec, OrderSpec, QueryOptionsSpec};
use super::snapshot::{DocumentSnapshotWire, QuerySnapshotWire};
use super::tagged::TaggedValue;
use super::transaction::{SessionKey, TransactionRegistry};

pub const DEFAULT_TRANSACTION_BUFFER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TRANSACTION_MAX_ATTEMPTS: u32 = 5;

/// Operations that need a realtime or persistent backend and are rejected outright.
pub const UNSUPPORTED_OPERATIONS: &[&str] = &[
    "documentOnSnapshot",
    "collectionOnSnapshot",
    "loadBundle",
    "namedQuery",
    "clearPersistence",
    "enableNetwork",
    "disableNetwork",
];

/// Creates the backend a new Firestore instance talks to.
pub trait DatastoreFactory: Send + Sync {
    fn create(&self, firestore: &Firestore) -> FirestoreResult<Arc<dyn Datastore>>;
}

/// Gives every instance its own in-memory store.
#[derive(Clone, Copy, Debug, Default)]
pub struct InMemoryDatastoreFactory;

impl DatastoreFactory for InMemoryDatastoreFactory {
    fn create(&self, _firestore: &Firestore) -> FirestoreResult<Arc<dyn Datastore>> {
        Ok(Arc::new(InMemoryDatastore::new()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FirestoreModuleSettings {
    /// How long a transaction attempt waits for its command buffer. `None` waits forever.
    pub transaction_buffer_timeout: Option<Duration>,
    pub transaction_max_attempts: u32,
    pub transaction_backoff: BackoffConfig,
}

impl Default for FirestoreModuleSettings {
    fn default() -> Self {
        Self {
            transaction_buffer_timeout: Some(DEFAULT_TRANSACTION_BUFFER_TIMEOUT),
            transaction_max_attempts: DEFAULT_TRANSACTION_MAX_ATTEMPTS,
            transaction_backoff: BackoffConfig::default(),
        }
    }
}

impl FirestoreModuleSettings {
    fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions {
            max_attempts: self.transaction_max_attempts,
            backoff: self.transaction_backoff,
        }
    }
}

/// `{source}` read option. Only server reads are available here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct GetOptionsSpec {
    #[serde(default)]
    pub source: Option<String>,
}

impl GetOptionsSpec {
    fn ensure_supported(&self, operation: &str) -> FirestoreResult<()> {
        if self.source.as_deref() == Some("cache") {
            return Err(unsupported(&format!("{operation} with source 'cache'")));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryType {
    Collection,
    CollectionGroup,
}

/// Everything needed to rebuild a query on the native side.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryRequest {
    pub path: String,
    pub query_type: QueryType,
    pub filters: Vec<FilterSpec>,
    pub orders: Vec<OrderSpec>,
    pub options: QueryOptionsSpec,
}

impl QueryRequest {
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query_type: QueryType::Collection,
            filters: Vec::new(),
            orders: Vec::new(),
            options: QueryOptionsSpec::default(),
        }
    }

    fn build(&self, firestore: &Firestore) -> FirestoreResult<Query> {
        let base = match self.query_type {
            QueryType::Collection => firestore.collection(&self.path)?,
            QueryType::CollectionGroup => firestore.collection_group(&self.path)?,
        };
        build_query(firestore, base, &self.filters, &self.orders, &self.options)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    Count,
    Sum,
    Average,
}

/// `{aggregateType, field, key}` as sent by `aggregateQuery`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateFieldSpec {
    pub aggregate_type: AggregateType,
    #[serde(default)]
    pub field: Option<FieldPathSpec>,
    pub key: String,
}

impl AggregateFieldSpec {
    fn to_field(&self) -> FirestoreResult<AggregateField> {
        if self.aggregate_type == AggregateType::Count {
            return Ok(AggregateField::count());
        }
        let field = self
            .field
            .as_ref()
            .ok_or_else(|| invalid_argument(format!("Aggregate '{}' requires a field", self.key)))?
            .to_field_path()?;
        Ok(match self.aggregate_type {
            AggregateType::Sum => AggregateField::sum(field),
            _ => AggregateField::average(field),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CountWire {
    pub count: i64,
}

pub struct FirestoreModuleBuilder {
    apps: AppRegistry,
    datastore_factory: Arc<dyn DatastoreFactory>,
    emitter: Arc<dyn EventEmitter>,
    settings: FirestoreModuleSettings,
}

impl FirestoreModuleBuilder {
    pub fn apps(mut self, apps: AppRegistry) -> Self {
        self.apps = apps;
        self
    }

    pub fn datastore_factory(mut self, factory: impl DatastoreFactory + 'static) -> Self {
        self.datastore_factory = Arc::new(factory);
        self
    }

    pub fn emitter(mut self, emitter: impl EventEmitter + 'static) -> Self {
        self.emitter = Arc::new(emitter);
        self
    }

    pub fn settings(mut self, settings: FirestoreModuleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> FirestoreModule {
        FirestoreModule {
            inner: Arc::new(ModuleInner {
                apps: self.apps,
                datastore_factory: self.datastore_factory,
                emitter: self.emitter,
                settings: self.settings,
                instances: Mutex::new(HashMap::new()),
                transactions: TransactionRegistry::new(),
            }),
        }
    }
}

type InstanceKey = (String, String);

/// Cheap to clone; clones share instances and sessions.
#[derive(Clone)]
pub struct FirestoreModule {
    inner: Arc<ModuleInner>,
}

struct ModuleInner {
    apps: AppRegistry,
    datastore_factory: Arc<dyn DatastoreFactory>,
    emitter: Arc<dyn EventEmitter>,
    settings: FirestoreModuleSettings,
    instances: Mutex<HashMap<InstanceKey, FirestoreClient>>,
    transactions: TransactionRegistry,
}

fn database_or_default(database_id: &str) -> &str {
    if database_id.trim().is_empty() {
        DEFAULT_DATABASE_ID
    } else {
        database_id
    }
}

fn discard_event(event: BridgeEvent) {
    log::debug!(
        "no emitter installed; dropping {} for {}",
        event.event_name,
        event.listener_id
    );
}

impl FirestoreModule {
    pub fn builder() -> FirestoreModuleBuilder {
        FirestoreModuleBuilder {
            apps: AppRegistry::new(),
            datastore_factory: Arc::new(InMemoryDatastoreFactory),
            emitter: Arc::new(discard_event),
            settings: FirestoreModuleSettings::default(),
        }
    }

    pub fn new(apps: AppRegistry) -> Self {
        Self::builder().apps(apps).build()
    }

    pub fn apps(&self) -> &AppRegistry {
        &self.inner.apps
    }

    pub fn settings(&self) -> &FirestoreModuleSettings {
        &self.inner.settings
    }

    fn instances(&self) -> MutexGuard<'_, HashMap<InstanceKey, FirestoreClient>> {
        self.inner
            .instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session_key(app_name: &str, database_id: &str, transaction_id: TransactionId) -> SessionKey {
        SessionKey::new(app_name, database_or_default(database_id), transaction_id)
    }

    /// Returns the client for `(app_name, database_id)`, creating it on first use.
    pub fn instance(&self, app_name: &str, database_id: &str) -> FirestoreResult<FirestoreClient> {
        let database = database_or_default(database_id);
        let key = (app_name.to_string(), database.to_string());
        let mut instances = self.instances();
        if let Some(client) = instances.get(&key) {
            return Ok(client.clone());
        }

        let app = self.inner.apps.get_app(Some(app_name))?;
        app.check_destroyed()?;
        let database_id = DatabaseId::from_app(&app, database)?;
        let firestore = Firestore::new(app, database_id);
        let datastore = self.inner.datastore_factory.create(&firestore)?;
        let client = FirestoreClient::new(firestore, datastore);
        log::debug!("created Firestore instance for app '{app_name}' database '{database}'");
        instances.insert(key, client.clone());
        Ok(client)
    }

    /// Drops the cached instance. The next call recreates it with a fresh backend.
    pub fn terminate(&self, app_name: &str, database_id: &str) -> FirestoreResult<()> {
        let key = (app_name.to_string(), database_or_default(database_id).to_string());
        self.instances().remove(&key);
        Ok(())
    }

    /// Deletes `app_name` from the registry and forgets its instances and transaction sessions.
    pub fn remove_app(&self, app_name: &str) -> FirestoreResult<()> {
        self.instances().retain(|(app, _), _| app != app_name);
        self.inner.transactions.dispose_app(app_name);
        if let Ok(app) = self.inner.apps.get_app(Some(app_name)) {
            self.inner.apps.delete_app(&app)?;
        }
        Ok(())
    }

    pub async fn document_get(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
        options: &GetOptionsSpec,
    ) -> FirestoreResult<DocumentSnapshotWire> {
        options.ensure_supported("documentGet")?;
        let client = self.instance(app_name, database_id)?;
        let snapshot = client.get_doc(path).await?;
        Ok(DocumentSnapshotWire::from(&snapshot))
    }

    pub async fn document_set(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
        data: &BTreeMap<String, TaggedValue>,
        options: &SetOptionsSpec,
    ) -> FirestoreResult<()> {
        let client = self.instance(app_name, database_id)?;
        let data = codec::decode_object(client.firestore(), data);
        client.set_doc(path, data, Some(options.to_set_options()?)).await
    }

    pub async fn document_update(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
        data: &BTreeMap<String, TaggedValue>,
    ) -> FirestoreResult<()> {
        let client = self.instance(app_name, database_id)?;
        let data = codec::decode_object(client.firestore(), data);
        client.update_doc(path, data).await
    }

    pub async fn document_delete(&self, app_name: &str, database_id: &str, path: &str) -> FirestoreResult<()> {
        let client = self.instance(app_name, database_id)?;
        client.delete_doc(path).await
    }

    /// Commits every entry atomically, in order.
    pub async fn document_batch(&self, app_name: &str, database_id: &str, entries: &[WireEntry]) -> FirestoreResult<()> {
        let client = self.instance(app_name, database_id)?;
        let firestore = client.firestore();
        let writes = parse_batch(firestore, entries);
        let mut batch = client.batch();
        apply_writes(firestore, &mut batch, writes)?;
        batch.commit().await
    }

    pub async fn collection_get(
        &self,
        app_name: &str,
        database_id: &str,
        request: &QueryRequest,
        options: &GetOptionsSpec,
    ) -> FirestoreResult<QuerySnapshotWire> {
        options.ensure_supported("collectionGet")?;
        let client = self.instance(app_name, database_id)?;
        let query = request.build(client.firestore())?;
        let snapshot = client.get_docs(&query).await?;
        Ok(QuerySnapshotWire::from(&snapshot))
    }

    pub async fn collection_count(
        &self,
        app_name: &str,
        database_id: &str,
        request: &QueryRequest,
    ) -> FirestoreResult<CountWire> {
        let client = self.instance(app_name, database_id)?;
        let query = request.build(client.firestore())?;
        let snapshot = client.get_count(&query).await?;
        Ok(CountWire {
            count: snapshot.count("count")?.unwrap_or(0),
        })
    }

    /// Runs the aggregations and reports each result under its caller-chosen key.
    pub async fn aggregate_query(
        &self,
        app_name: &str,
        database_id: &str,
        request: &QueryRequest,
        aggregates: &[AggregateFieldSpec],
    ) -> FirestoreResult<BTreeMap<String, Value>> {
        let client = self.instance(app_name, database_id)?;
        let query = request.build(client.firestore())?;
        let mut spec = AggregateSpec::new();
        for aggregate in aggregates {
            spec.insert(aggregate.key.clone(), aggregate.to_field()?)?;
        }
        let snapshot = client.get_aggregate(&query, spec).await?;
        Ok(snapshot
            .into_data()
            .into_iter()
            .map(|(key, value)| (key, aggregate_json(&value)))
            .collect())
    }

    /// Runs a bridged transaction until it commits or fails.
    ///
    /// The outcome is also reported through the emitter as a `complete` or `error` event.
    pub async fn transaction_begin(
        &self,
        app_name: &str,
        database_id: &str,
        transaction_id: TransactionId,
    ) -> FirestoreResult<()> {
        let key = Self::session_key(app_name, database_id, transaction_id);
        let client = self.instance(app_name, database_id)?;
        let settings = &self.inner.settings;
        self.inner
            .transactions
            .begin(
                &client,
                self.inner.emitter.as_ref(),
                key,
                settings.transaction_options(),
                settings.transaction_buffer_timeout,
            )
            .await
    }

    pub async fn transaction_get_document(
        &self,
        app_name: &str,
        database_id: &str,
        transaction_id: TransactionId,
        path: &str,
    ) -> FirestoreResult<DocumentSnapshotWire> {
        let key = Self::session_key(app_name, database_id, transaction_id);
        self.inner.transactions.get_document(&key, path).await
    }

    pub fn transaction_apply_buffer(
        &self,
        app_name: &str,
        database_id: &str,
        transaction_id: TransactionId,
        entries: &[WireEntry],
    ) -> FirestoreResult<()> {
        let client = self.instance(app_name, database_id)?;
        let writes = parse_batch(client.firestore(), entries);
        let key = Self::session_key(app_name, database_id, transaction_id);
        self.inner.transactions.apply_buffer(&key, writes);
        Ok(())
    }

    pub fn transaction_dispose(&self, app_name: &str, database_id: &str, transaction_id: TransactionId) {
        let key = Self::session_key(app_name, database_id, transaction_id);
        self.inner.transactions.dispose(&key);
    }

    /// Every bridged write has committed by the time its call resolves.
    pub async fn wait_for_pending_writes(&self, app_name: &str, database_id: &str) -> FirestoreResult<()> {
        self.instance(app_name, database_id).map(|_| ())
    }
}

/// Aggregate results cross the bridge as plain JSON numbers, not tagged values.
fn aggregate_json(value: &FirestoreValue) -> Value {
    match value.kind() {
        ValueKind::Integer(value) => Value::from(*value),
        ValueKind::Double(value) => serde_json::Number::from_f64(*value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        _ => Value::Null,
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
            project_id: Some("bridge-project".into()),
            ..Default::default()
        };
        module.apps().initialize_app(options, None).unwrap();
        module
    }

    fn city(name: &str, population: i64) -> BTreeMap<String, TaggedValue> {
        BTreeMap::from([
            ("name".to_string(), TaggedValue::String(name.to_string())),
            ("population".to_string(), TaggedValue::Integer(population)),
        ])
    }

    #[test]
    fn instances_are_cached_per_database() {
        let module = module();
        let first = module.instance("[DEFAULT]", "").unwrap();
        let second = module.instance("[DEFAULT]", DEFAULT_DATABASE_ID).unwrap();
        let other = module.instance("[DEFAULT]", "analytics").unwrap();
        assert_eq!(first.firestore().database_id(), second.firestore().database_id());
        assert_eq!(other.firestore().database_id().database(), "analytics");
    }

    #[test]
    fn unknown_app_is_rejected() {
        let module = module();
        let err = module.instance("missing", "").err().unwrap();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[tokio::test]
    async fn terminate_recreates_backend() {
        let module = module();
        module
            .document_set("[DEFAULT]", "", "cities/SF", &city("SF", 1), &SetOptionsSpec::default())
            .await
            .unwrap();
        module.terminate("[DEFAULT]", "").unwrap();
        let snapshot = module
            .document_get("[DEFAULT]", "", "cities/SF", &GetOptionsSpec::default())
            .await
            .unwrap();
        assert!(!snapshot.exists);
    }

    #[tokio::test]
    async fn cache_source_is_unsupported() {
        let module = module();
        let options = GetOptionsSpec {
            source: Some("cache".into()),
        };
        let err = module
            .document_get("[DEFAULT]", "", "cities/SF", &options)
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "firestore/unsupported");
    }

    #[tokio::test]
    async fn count_and_aggregate_queries() {
        let module = module();
        for (id, population) in [("SF", 2), ("LA", 4), ("NYC", 9)] {
            module
                .document_set(
                    "[DEFAULT]",
                    "",
                    &format!("cities/{id}"),
                    &city(id, population),
                    &SetOptionsSpec::default(),
                )
                .await
                .unwrap();
        }

        let request = QueryRequest::collection("cities");
        let count = module.collection_count("[DEFAULT]", "", &request).await.unwrap();
        assert_eq!(count, CountWire { count: 3 });

        let aggregates: Vec<AggregateFieldSpec> = serde_json::from_value(json!([
            {"aggregateType": "sum", "field": "population", "key": "total"},
            {"aggregateType": "average", "field": "population", "key": "mean"},
            {"aggregateType": "count", "key": "n"}
        ]))
        .unwrap();
        let result = module
            .aggregate_query("[DEFAULT]", "", &request, &aggregates)
            .await
            .unwrap();
        assert_eq!(result["total"], json!(15));
        assert_eq!(result["mean"], json!(5.0));
        assert_eq!(result["n"], json!(3));
    }

    #[tokio::test]
    async fn sum_without_field_is_rejected() {
        let module = module();
        let aggregates = vec![AggregateFieldSpec {
            aggregate_type: AggregateType::Sum,
            field: None,
            key: "total".into(),
        }];
        let err = module
            .aggregate_query("[DEFAULT]", "", &QueryRequest::collection("cities"), &aggregates)
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn remove_app_forgets_instances_and_registry_entry() {
        let module = module();
        module.instance("[DEFAULT]", "").unwrap();
        module.remove_app("[DEFAULT]").unwrap();
        assert!(module.apps().app_names().is_empty());
        assert!(module.instance("[DEFAULT]", "").is_err());
    }
}
