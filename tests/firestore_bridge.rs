use std::time::Duration;

use async_channel::Receiver;
use firebase_native_bridge::app::{FirebaseAppSettings, FirebaseOptions};
use firebase_native_bridge::firestore::bridge::{
    BridgeEvent, ChannelEventEmitter, FirestoreModuleSettings, TransactionEventBody,
};
use firebase_native_bridge::firestore::FirestoreModule;
use serde_json::{json, Value};

const APP: &str = "bridge-tests";

fn init_module(settings: FirestoreModuleSettings) -> (FirestoreModule, Receiver<BridgeEvent>) {
    let (emitter, events) = ChannelEventEmitter::new();
    let module = FirestoreModule::builder()
        .emitter(emitter)
        .settings(settings)
        .build();
    let options = FirebaseOptions {
        project_id: Some("bridge-tests".into()),
        ..Default::default()
    };
    let app_settings = FirebaseAppSettings {
        name: Some(APP.into()),
        ..Default::default()
    };
    module
        .apps()
        .initialize_app(options, Some(app_settings))
        .expect("initialize app");
    (module, events)
}

async fn call(module: &FirestoreModule, method: &str, args: Value) -> Value {
    module
        .invoke(method, args)
        .await
        .unwrap_or_else(|err| panic!("{method} failed: {err}"))
}

async fn next_event(events: &Receiver<BridgeEvent>) -> BridgeEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event before timeout")
        .expect("event channel open")
}

#[tokio::test(flavor = "multi_thread")]
async fn set_then_get_returns_tagged_document() {
    let (module, _events) = init_module(FirestoreModuleSettings::default());
    call(
        &module,
        "documentSet",
        json!([APP, "", "cities/NYC", {"name": [8, "New York"], "population": [7, 7]}, {}]),
    )
    .await;

    let snapshot = call(&module, "documentGet", json!([APP, "", "cities/NYC", {}])).await;
    assert_eq!(
        snapshot,
        json!({
            "path": "cities/NYC",
            "exists": true,
            "data": {"name": [8, "New York"], "population": [7, 7]},
            "metadata": [false, false]
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rich_values_survive_a_document_round_trip() {
    let (module, _events) = init_module(FirestoreModuleSettings::default());
    let data = json!({
        "empty": [9],
        "flag": [5],
        "nothing": [3],
        "count": [17, 42],
        "ratio": [7, 0.25],
        "minusZero": [18],
        "at": [13, [1700000000, 500]],
        "where": [12, [37.7, -122.4]],
        "blob": [14, "aGVsbG8="],
        "capital": [11, "cities/SAC"],
        "embedding": [19, [0.5, 1.5]],
        "tags": [10, [[8, "a"], [5], [3]]],
        "nested": [16, {"inner": [8, "x"]}]
    });
    call(&module, "documentSet", json!([APP, "", "states/CA", data.clone(), {}])).await;

    let snapshot = call(&module, "documentGet", json!([APP, "", "states/CA"])).await;
    assert_eq!(snapshot["data"], data);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_tags_are_stored_as_null() {
    let (module, _events) = init_module(FirestoreModuleSettings::default());
    call(
        &module,
        "documentSet",
        json!([APP, "", "odd/one", {"mystery": [-999], "future": [42, "payload"]}, {}]),
    )
    .await;
    let snapshot = call(&module, "documentGet", json!([APP, "", "odd/one"])).await;
    assert_eq!(snapshot["data"], json!({"mystery": [3], "future": [3]}));
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_applies_writes_in_order() {
    let (module, _events) = init_module(FirestoreModuleSettings::default());
    let writes = json!([
        {"type": "SET", "path": "cities/a", "data": {"v": [17, 1]}},
        {"type": "DELETE", "path": "cities/a"},
        {"type": "SET", "path": "cities/b", "data": {"v": [17, 1], "keep": [5]}},
        {"type": "SET", "path": "cities/b", "data": {"v": [17, 2]}, "options": {"merge": true}},
        {"type": "UPDATE", "path": "cities/b", "data": {"v": [15, ["increment", 3]]}}
    ]);
    call(&module, "documentBatch", json!([APP, "", writes])).await;

    let a = call(&module, "documentGet", json!([APP, "", "cities/a"])).await;
    assert_eq!(a["exists"], json!(false));
    let b = call(&module, "documentGet", json!([APP, "", "cities/b"])).await;
    assert_eq!(b["data"], json!({"v": [17, 5], "keep": [5]}));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_batch_leaves_no_partial_writes() {
    let (module, _events) = init_module(FirestoreModuleSettings::default());
    let writes = json!([
        {"type": "SET", "path": "cities/a", "data": {"v": [17, 1]}},
        {"type": "UPDATE", "path": "cities/missing", "data": {"v": [17, 2]}}
    ]);
    let err = module
        .invoke("documentBatch", json!([APP, "", writes]))
        .await
        .unwrap_err();
    assert_eq!(err.code, "not-found");

    let a = call(&module, "documentGet", json!([APP, "", "cities/a"])).await;
    assert_eq!(a["exists"], json!(false));
}

#[tokio::test(flavor = "multi_thread")]
async fn composite_filters_and_cursors() {
    let (module, _events) = init_module(FirestoreModuleSettings::default());
    let writes = json!([
        {"type": "SET", "path": "cities/SF", "data": {"state": [8, "CA"], "population": [17, 8]}},
        {"type": "SET", "path": "cities/LA", "data": {"state": [8, "CA"], "population": [17, 40]}},
        {"type": "SET", "path": "cities/NYC", "data": {"state": [8, "NY"], "population": [17, 80]}},
        {"type": "SET", "path": "cities/BUF", "data": {"state": [8, "NY"], "population": [17, 3]}}
    ]);
    call(&module, "documentBatch", json!([APP, "", writes])).await;

    let filter = json!({
        "operator": "OR",
        "queries": [
            {"fieldPath": "state", "operator": "EQUAL", "value": [8, "CA"]},
            {"fieldPath": ["population"], "operator": "GREATER_THAN_OR_EQUAL", "value": [17, 50]}
        ]
    });
    let snapshot = call(
        &module,
        "collectionGet",
        json!([
            APP,
            "",
            "cities",
            "collection",
            [filter],
            [{"fieldPath": "population", "direction": "ASCENDING"}],
            {"startAfter": [[17, 8]]}
        ]),
    )
    .await;
    let paths: Vec<&str> = snapshot["documents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|doc| doc["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["cities/LA", "cities/NYC"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn transaction_reads_then_commits_buffer() {
    let (module, events) = init_module(FirestoreModuleSettings::default());
    call(&module, "documentSet", json!([APP, "", "counters/main", {"n": [17, 1]}, {}])).await;

    call(&module, "transactionBegin", json!([APP, "", 7])).await;
    let event = next_event(&events).await;
    assert_eq!(event.body, TransactionEventBody::Update);
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({
            "eventName": "firestore_transaction_event",
            "body": {"type": "update"},
            "appName": APP,
            "databaseId": "(default)",
            "listenerId": 7
        })
    );

    let snapshot = call(&module, "transactionGetDocument", json!([APP, "", 7, "counters/main"])).await;
    assert_eq!(snapshot["data"], json!({"n": [17, 1]}));

    call(
        &module,
        "transactionApplyBuffer",
        json!([APP, "", 7, [{"type": "UPDATE", "path": "counters/main", "data": {"n": [17, 2]}}]]),
    )
    .await;
    assert_eq!(next_event(&events).await.body, TransactionEventBody::Complete);

    let snapshot = call(&module, "documentGet", json!([APP, "", "counters/main"])).await;
    assert_eq!(snapshot["data"], json!({"n": [17, 2]}));

    let err = module
        .invoke("transactionGetDocument", json!([APP, "", 7, "counters/main"]))
        .await
        .unwrap_err();
    assert_eq!(err.code, "internal-error");
}

#[tokio::test(flavor = "multi_thread")]
async fn conflicting_write_retries_and_needs_a_new_buffer() {
    let (module, events) = init_module(FirestoreModuleSettings::default());
    call(&module, "documentSet", json!([APP, "", "counters/main", {"n": [17, 1]}, {}])).await;

    call(&module, "transactionBegin", json!([APP, "", "tx-retry"])).await;
    assert_eq!(next_event(&events).await.body, TransactionEventBody::Update);
    call(&module, "transactionGetDocument", json!([APP, "", "tx-retry", "counters/main"])).await;

    call(&module, "documentSet", json!([APP, "", "counters/main", {"n": [17, 10]}, {}])).await;
    let buffer = json!([{"type": "UPDATE", "path": "counters/main", "data": {"n": [15, ["increment", 1]]}}]);
    call(&module, "transactionApplyBuffer", json!([APP, "", "tx-retry", buffer.clone()])).await;

    // The first commit is aborted by the concurrent write; the attempt starts over.
    assert_eq!(next_event(&events).await.body, TransactionEventBody::Update);
    let snapshot = call(&module, "transactionGetDocument", json!([APP, "", "tx-retry", "counters/main"])).await;
    assert_eq!(snapshot["data"], json!({"n": [17, 10]}));
    call(&module, "transactionApplyBuffer", json!([APP, "", "tx-retry", buffer])).await;
    assert_eq!(next_event(&events).await.body, TransactionEventBody::Complete);

    let snapshot = call(&module, "documentGet", json!([APP, "", "counters/main"])).await;
    assert_eq!(snapshot["data"], json!({"n": [17, 11]}));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_buffer_fails_after_deadline() {
    let settings = FirestoreModuleSettings {
        transaction_buffer_timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let (module, events) = init_module(settings);

    call(&module, "transactionBegin", json!([APP, "", 3])).await;
    assert_eq!(next_event(&events).await.body, TransactionEventBody::Update);
    let event = next_event(&events).await;
    let body = serde_json::to_value(&event.body).unwrap();
    assert_eq!(body["type"], json!("error"));
    assert_eq!(body["error"]["code"], json!("deadline-exceeded"));
    assert_eq!(body["error"]["userInfo"]["code"], json!("deadline-exceeded"));
}

#[tokio::test(flavor = "multi_thread")]
async fn transaction_begin_rejects_unknown_and_removed_apps() {
    let (module, events) = init_module(FirestoreModuleSettings::default());

    let err = module
        .invoke("transactionBegin", json!(["no-such-app", "", 1]))
        .await
        .unwrap_err();
    assert_eq!(err.code, "invalid-argument");

    module.remove_app(APP).expect("remove app");
    let err = module
        .invoke("transactionBegin", json!([APP, "", 2]))
        .await
        .unwrap_err();
    assert_eq!(err.code, "invalid-argument");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn buffer_without_open_transaction_is_dropped() {
    let (module, events) = init_module(FirestoreModuleSettings::default());
    let result = call(
        &module,
        "transactionApplyBuffer",
        json!([APP, "", 11, [{"type": "DELETE", "path": "cities/SF"}]]),
    )
    .await;
    assert_eq!(result, Value::Null);
    call(&module, "transactionDispose", json!([APP, "", 11])).await;
    assert!(events.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_operations_reject_with_unsupported_code() {
    let (module, _events) = init_module(FirestoreModuleSettings::default());
    for method in [
        "documentOnSnapshot",
        "collectionOnSnapshot",
        "loadBundle",
        "namedQuery",
        "clearPersistence",
        "enableNetwork",
        "disableNetwork",
    ] {
        let err = module.invoke(method, json!([APP, ""])).await.unwrap_err();
        assert_eq!(err.code, "unsupported", "{method}");
        assert_eq!(err.user_info.code, "unsupported");
    }

    let err = module
        .invoke("documentGet", json!([APP, "", "cities/SF", {"source": "cache"}]))
        .await
        .unwrap_err();
    assert_eq!(err.code, "unsupported");
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_for_pending_writes_and_terminate_resolve() {
    let (module, _events) = init_module(FirestoreModuleSettings::default());
    assert_eq!(call(&module, "waitForPendingWrites", json!([APP, ""])).await, Value::Null);
    assert_eq!(call(&module, "terminate", json!([APP, ""])).await, Value::Null);
}
