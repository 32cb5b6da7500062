use grpc_steps::invocation::PendingInvocation;
use grpc_steps::payload;
use grpc_steps::registry::{Registry, ServiceOption};
use item_service::FILE_DESCRIPTOR_SET;
use item_service_impl::{SLOW_ID, spawn_item_service};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tonic::Code;
use tonic::metadata::MetadataMap;


fn registry(addr: SocketAddr) -> Registry {
    Registry::builder()
        .service_prefix("/grpctest.")
        .register_file_descriptor_set(FILE_DESCRIPTOR_SET, [ServiceOption::socket_addr(addr)])
        .expect("Failed to register the item service")
        .build()
        .expect("Failed to build the registry")
}

fn plan(registry: &Registry, method: &str, text: &str) -> PendingInvocation {
    let method = registry.resolve(method).unwrap();
    let payload = payload::decode(&method.input(), method.shape(), text).unwrap();
    PendingInvocation::plan(method, payload).unwrap()
}

fn plain(text: &str) -> Value {
    grpc_steps::assertion::response_document(text).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_unary_invocation() {
    let (addr, _) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(&registry, "ItemService/GetItem", r#"{"id": 42}"#);
    let text = invocation
        .execute(&MetadataMap::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        plain(&text),
        json!({"id": 42, "name": "widget", "kind": "ITEM_KIND_PHYSICAL"})
    );
}

#[test_log::test(tokio::test)]
async fn test_server_streaming_invocation() {
    let (addr, _) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(&registry, "ItemService/ListItems", r#"{"pageSize": 2}"#);
    let text = invocation
        .execute(&MetadataMap::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        plain(&text),
        json!([{"id": 1, "name": "item-1"}, {"id": 2, "name": "item-2"}])
    );
}

#[test_log::test(tokio::test)]
async fn test_server_streaming_failure_mid_stream() {
    let (addr, _) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(&registry, "ItemService/ListItems", r#"{"pageSize": 5}"#);
    let status = invocation
        .execute(&MetadataMap::new())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(status.code(), Code::ResourceExhausted);
    assert_eq!(status.message(), "page too large");
}

#[test_log::test(tokio::test)]
async fn test_client_streaming_invocation() {
    let (addr, _) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(
        &registry,
        "ItemService/CreateItems",
        r#"[{"id": 1}, {"id": {"$numberInt": "2"}}, {"id": 3}]"#,
    );
    let text = invocation
        .execute(&MetadataMap::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(plain(&text), json!({"numItems": 3, "ids": [1, 2, 3]}));
}

#[test_log::test(tokio::test)]
async fn test_bidirectional_invocation() {
    let (addr, _) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(
        &registry,
        "ItemService/TransformItems",
        r#"[{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]"#,
    );
    let text = invocation
        .execute(&MetadataMap::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        plain(&text),
        json!([{"id": 1, "name": "A"}, {"id": 2, "name": "B"}])
    );
}

#[test_log::test(tokio::test)]
async fn test_execution_is_memoized() {
    let (addr, calls) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(&registry, "ItemService/GetItem", r#"{"id": 404}"#);

    let first = invocation.execute(&MetadataMap::new()).await.unwrap();
    let second = invocation.execute(&MetadataMap::new()).await.unwrap();
    let third = invocation.execute(&MetadataMap::new()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);

    for outcome in [first, second, third] {
        let status = outcome.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "item missing");
    }
}

#[test_log::test(tokio::test)]
async fn test_concurrent_executions_call_the_server_once() {
    let (addr, calls) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(&registry, "ItemService/GetItem", r#"{"id": 42}"#);
    let ambient = MetadataMap::new();

    let (a, b) = tokio::join!(invocation.execute(&ambient), invocation.execute(&ambient));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.unwrap().unwrap(), b.unwrap().unwrap());
}

#[test_log::test(tokio::test)]
async fn test_configuration_is_sealed_after_execution() {
    let (addr, _) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(&registry, "ItemService/GetItem", r#"{"id": 42}"#);
    invocation.execute(&MetadataMap::new()).await.unwrap().unwrap();

    assert!(invocation.with_header("locale", "fr-FR").is_err());
    assert!(invocation.with_timeout(Duration::from_secs(3)).is_err());
}

#[test_log::test(tokio::test)]
async fn test_timeout_is_reported_as_deadline_exceeded() {
    let (addr, calls) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(
        &registry,
        "ItemService/GetItem",
        &format!(r#"{{"id": {SLOW_ID}}}"#),
    );
    invocation.with_timeout(Duration::from_millis(200)).unwrap();

    let status = invocation
        .execute(&MetadataMap::new())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(status.code(), Code::DeadlineExceeded);
    assert!(calls.load(Ordering::SeqCst) <= 1);
}

#[test_log::test(tokio::test)]
async fn test_cancelled_execution_keeps_the_planned_settings() {
    let (addr, calls) = spawn_item_service().await;
    let registry = registry(addr);

    let invocation = plan(
        &registry,
        "ItemService/GetItem",
        &format!(r#"{{"id": {SLOW_ID}}}"#),
    );
    invocation.with_timeout(Duration::from_secs(5)).unwrap();
    invocation.with_header("locale", "fr-FR").unwrap();

    let ambient = MetadataMap::new();
    let dropped = tokio::time::timeout(Duration::from_millis(300), invocation.execute(&ambient)).await;
    assert!(dropped.is_err());

    assert!(!invocation.is_executed());
    assert!(invocation.with_timeout(Duration::from_secs(1)).is_err());
    assert!(invocation.with_header("locale", "en-US").is_err());

    let text = invocation.execute(&ambient).await.unwrap().unwrap();

    assert_eq!(plain(&text), json!({"id": SLOW_ID, "locale": "fr-FR"}));
    assert!(invocation.is_executed());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test_log::test(tokio::test)]
async fn test_headers_are_merged_in_order() {
    let (addr, _) = spawn_item_service().await;

    let registry = Registry::builder()
        .service_prefix("/grpctest.")
        .default_service_options([ServiceOption::header("x-tag", "service")])
        .register_file_descriptor_set(FILE_DESCRIPTOR_SET, [ServiceOption::socket_addr(addr)])
        .unwrap()
        .build()
        .unwrap();

    let invocation = plan(&registry, "ItemService/GetItem", r#"{"id": 42}"#);
    invocation.with_header("x-tag", "request").unwrap();
    invocation.with_header("locale", "en-US").unwrap();

    let mut ambient = MetadataMap::new();
    ambient.append("x-tag", "scenario".parse().unwrap());

    let text = invocation.execute(&ambient).await.unwrap().unwrap();

    assert_eq!(
        plain(&text),
        json!({
            "id": 42,
            "name": "widget",
            "locale": "en-US",
            "tags": ["service", "scenario", "request"],
            "kind": "ITEM_KIND_PHYSICAL"
        })
    );
}
