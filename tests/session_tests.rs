mod common;

use std::sync::Arc;

use common::pk_range;
use http::{HeaderMap, HeaderValue, StatusCode};
use rangefeed::{
    ConsistencyLevel, InMemoryPartitionTopology, OperationRequest, OperationType,
    ResourceType, SessionResolver, SessionTokenStore, ShardedSessionTokenStore, SubStatusCode,
    headers,
};

struct Fixture {
    store: Arc<ShardedSessionTokenStore>,
    topology: Arc<InMemoryPartitionTopology>,
    resolver: SessionResolver,
}

async fn fixture() -> Fixture {
    let store = Arc::new(ShardedSessionTokenStore::new(8).unwrap());
    let topology = Arc::new(InMemoryPartitionTopology::new());
    topology
        .register_container(
            "orders",
            vec![pk_range("4", "", "80"), pk_range("5", "80", "FF")],
        )
        .await
        .unwrap();
    let resolver = SessionResolver::new(
        store.clone(),
        topology.clone(),
        ConsistencyLevel::Session,
    );
    Fixture {
        store,
        topology,
        resolver,
    }
}

fn read_at(key: &str) -> OperationRequest {
    OperationRequest::new(OperationType::Read, ResourceType::Document, "orders")
        .with_effective_partition_key(key)
}

fn response_headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(*name, HeaderValue::from_str(value).unwrap());
    }
    map
}

#[tokio::test]
async fn test_stamps_stored_token_for_resolved_range() {
    let f = fixture().await;
    f.store.set("orders", "5", "1:100#50").unwrap();
    let mut request = read_at("A0");

    f.resolver.apply_session_token(&mut request).await.unwrap();

    assert_eq!(request.session_token(), Some("1:100#50"));
    assert_eq!(request.resolved_range.as_ref().map(|r| r.id.as_str()), Some("5"));
}

#[tokio::test]
async fn test_caller_token_is_never_replaced() {
    let f = fixture().await;
    f.store.set("orders", "5", "5:1#99").unwrap();
    let mut request = read_at("A0").with_session_token("5:1#1").unwrap();

    f.resolver.apply_session_token(&mut request).await.unwrap();

    assert_eq!(request.session_token(), Some("5:1#1"));
    assert!(request.resolved_range.is_none());
}

#[tokio::test]
async fn test_non_session_consistency_and_master_resources_are_skipped() {
    let f = fixture().await;
    f.store.set("orders", "5", "5:1#99").unwrap();

    let mut eventual = read_at("A0").with_consistency_level(ConsistencyLevel::Eventual);
    f.resolver.apply_session_token(&mut eventual).await.unwrap();
    assert_eq!(eventual.session_token(), None);

    let mut master = OperationRequest::new(OperationType::Read, ResourceType::Container, "orders")
        .with_session_token("5:1#1")
        .unwrap();
    f.resolver.apply_session_token(&mut master).await.unwrap();
    assert_eq!(master.session_token(), None);
}

#[tokio::test]
async fn test_missing_range_triggers_one_forced_refresh() {
    let f = fixture().await;
    f.topology
        .publish(
            "orders",
            vec![
                pk_range("4", "", "80"),
                pk_range("6", "80", "C0").with_parents(vec!["5".to_string()]),
                pk_range("7", "C0", "FF").with_parents(vec!["5".to_string()]),
            ],
        )
        .await
        .unwrap();
    f.store.set("orders", "5", "5:1#40").unwrap();
    let mut request = OperationRequest::new(OperationType::Read, ResourceType::Document, "orders")
        .with_partition_key_range_id("7");

    f.resolver.apply_session_token(&mut request).await.unwrap();

    assert_eq!(f.topology.forced_refresh_count(), 1);
    assert_eq!(request.resolved_range.as_ref().map(|r| r.id.as_str()), Some("7"));
    // The child has no token yet, so its parent's applies.
    assert_eq!(request.session_token(), Some("5:1#40"));
}

#[tokio::test]
async fn test_unresolvable_request_goes_out_without_token() {
    let f = fixture().await;
    let mut request = OperationRequest::new(OperationType::Read, ResourceType::Document, "orders")
        .with_partition_key_range_id("99");

    f.resolver.apply_session_token(&mut request).await.unwrap();

    assert_eq!(request.session_token(), None);
    assert!(request.resolved_range.is_none());
    assert_eq!(f.topology.forced_refresh_count(), 1);
}

#[tokio::test]
async fn test_resolved_token_is_refreshed_between_attempts() {
    let f = fixture().await;
    f.store.set("orders", "5", "5:1#10").unwrap();
    let mut request = read_at("A0");
    f.resolver.apply_session_token(&mut request).await.unwrap();
    assert_eq!(request.session_token(), Some("5:1#10"));

    f.store.set("orders", "5", "5:1#12").unwrap();
    f.resolver.apply_session_token(&mut request).await.unwrap();
    assert_eq!(request.session_token(), Some("5:1#12"));
}

#[tokio::test]
async fn test_captures_compound_token_on_success() {
    let f = fixture().await;
    let request = read_at("A0");
    let headers = response_headers(&[(headers::SESSION_TOKEN, "4:1#7,5:1#9")]);

    f.resolver
        .capture_session_token(StatusCode::OK, SubStatusCode::UNKNOWN, &request, &headers)
        .await
        .unwrap();

    assert_eq!(
        f.store.tokens_for_container("orders").unwrap(),
        vec![
            ("4".to_string(), "4:1#7".to_string()),
            ("5".to_string(), "5:1#9".to_string())
        ]
    );
}

#[tokio::test]
async fn test_captures_token_from_not_modified_change_feed_page() {
    let f = fixture().await;
    let request = OperationRequest::new(OperationType::ReadFeed, ResourceType::Document, "orders")
        .as_change_feed();
    let headers = response_headers(&[(headers::SESSION_TOKEN, "0:1#42")]);

    f.resolver
        .capture_session_token(StatusCode::NOT_MODIFIED, SubStatusCode::UNKNOWN, &request, &headers)
        .await
        .unwrap();

    assert_eq!(f.store.get("orders", "0").unwrap().as_deref(), Some("0:1#42"));
}

#[tokio::test]
async fn test_failure_capture_follows_write_outcome_statuses() {
    let cases = [
        (StatusCode::CONFLICT, SubStatusCode::UNKNOWN, true),
        (StatusCode::PRECONDITION_FAILED, SubStatusCode::UNKNOWN, true),
        (StatusCode::NOT_FOUND, SubStatusCode::UNKNOWN, true),
        (StatusCode::NOT_FOUND, SubStatusCode::READ_SESSION_NOT_AVAILABLE, false),
        (StatusCode::TOO_MANY_REQUESTS, SubStatusCode::UNKNOWN, false),
        (StatusCode::SERVICE_UNAVAILABLE, SubStatusCode::UNKNOWN, false),
    ];
    for (status, sub_status, captured) in cases {
        let f = fixture().await;
        let request = OperationRequest::new(OperationType::Create, ResourceType::Document, "orders");
        let headers = response_headers(&[(headers::SESSION_TOKEN, "5:1#3")]);
        f.resolver
            .capture_session_token(status, sub_status, &request, &headers)
            .await
            .unwrap();
        assert_eq!(
            f.store.get("orders", "5").unwrap().is_some(),
            captured,
            "{} / {}",
            status,
            sub_status
        );
    }
}

#[tokio::test]
async fn test_master_resource_failures_are_not_captured() {
    let f = fixture().await;
    let request = OperationRequest::new(OperationType::Create, ResourceType::Database, "orders");
    let headers = response_headers(&[(headers::SESSION_TOKEN, "5:1#3")]);
    f.resolver
        .capture_session_token(StatusCode::CONFLICT, SubStatusCode::UNKNOWN, &request, &headers)
        .await
        .unwrap();
    assert_eq!(f.store.get("orders", "5").unwrap(), None);
}

#[tokio::test]
async fn test_container_delete_clears_its_tokens() {
    let f = fixture().await;
    f.store.set("orders", "4", "4:1#1").unwrap();
    f.store.set("orders", "5", "5:1#1").unwrap();
    f.store.set("invoices", "0", "0:1#1").unwrap();
    let request = OperationRequest::new(OperationType::Delete, ResourceType::Container, "orders");

    f.resolver
        .capture_session_token(
            StatusCode::NO_CONTENT,
            SubStatusCode::UNKNOWN,
            &request,
            &response_headers(&[(headers::SESSION_TOKEN, "5:1#2")]),
        )
        .await
        .unwrap();

    assert!(f.store.tokens_for_container("orders").unwrap().is_empty());
    assert_eq!(f.store.get("invoices", "0").unwrap().as_deref(), Some("0:1#1"));
}

#[tokio::test]
async fn test_served_range_mismatch_refreshes_routing() {
    let f = fixture().await;
    let mut request = read_at("A0");
    f.resolver.apply_session_token(&mut request).await.unwrap();

    let same = response_headers(&[(headers::PARTITION_KEY_RANGE_ID, "5")]);
    f.resolver
        .capture_session_token(StatusCode::OK, SubStatusCode::UNKNOWN, &request, &same)
        .await
        .unwrap();
    assert!(f.topology.range_refreshes().await.is_empty());

    let drifted = response_headers(&[(headers::PARTITION_KEY_RANGE_ID, "9")]);
    f.resolver
        .capture_session_token(StatusCode::OK, SubStatusCode::UNKNOWN, &request, &drifted)
        .await
        .unwrap();
    assert_eq!(
        f.topology.range_refreshes().await,
        vec![("orders".to_string(), "9".to_string())]
    );
}

#[tokio::test]
async fn test_store_is_shared_across_concurrent_operations() {
    let f = fixture().await;
    let resolver = Arc::new(f.resolver);
    let mut handles = Vec::new();
    for worker in 0..16u32 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move {
            let range_id = if worker % 2 == 0 { "4" } else { "5" };
            let request =
                OperationRequest::new(OperationType::Upsert, ResourceType::Document, "orders");
            let token = format!("{}:1#{}", range_id, worker);
            let headers = response_headers(&[(headers::SESSION_TOKEN, token.as_str())]);
            resolver
                .capture_session_token(StatusCode::OK, SubStatusCode::UNKNOWN, &request, &headers)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(f.store.get("orders", "4").unwrap().as_deref(), Some("4:1#14"));
    assert_eq!(f.store.get("orders", "5").unwrap().as_deref(), Some("5:1#15"));
}
