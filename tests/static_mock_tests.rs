#![cfg(feature = "static-mock")]

mod common;

use common::TestServer;
use routemock::{InMemoryMockStore, MockServerBuilder, MockStateManager, StateManager};
use serde_json::Value;
use std::path::PathBuf;

fn static_mock_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/resources/static_mocks")
}

#[tokio::test(flavor = "multi_thread")]
async fn static_mocks_are_served_at_startup() {
    let server =
        TestServer::start_with(MockServerBuilder::new().static_mock_dir(static_mock_dir())).await;

    let res = server.client.get(server.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-total-count"], "1");
    assert_eq!(res.text().await.unwrap(), r#"[{"id": 1, "name": "Ada"}]"#);

    let res = server
        .client
        .get(server.url("/users/search?name=Grace"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), r#"{"query": "Grace"}"#);

    let res = server
        .client
        .post(server.url("/echo"))
        .body("ping")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    assert_eq!(res.text().await.unwrap(), "echo: ping");

    let mocks: Vec<Value> = server
        .client
        .get(server.admin_url("/mocks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mocks.len(), 3);

    server.stop().await;
}

#[test]
fn static_mocks_are_validated() {
    let state = MockStateManager::new(InMemoryMockStore::new()).unwrap();

    let count = routemock::read_static_mock_definitions(static_mock_dir(), &state).unwrap();
    assert_eq!(count, 3);

    // Loading the same files again collides with the mocks that are already there.
    let err = routemock::read_static_mock_definitions(static_mock_dir(), &state).unwrap_err();
    assert!(err.to_string().contains("has already been taken"));
    assert_eq!(state.list_mocks().unwrap().len(), 3);
}

#[test]
fn missing_static_mock_dir_fails_the_build() {
    let result = MockServerBuilder::new()
        .static_mock_dir(PathBuf::from("/definitely/not/here"))
        .build();

    assert!(result.is_err());
}
