#![allow(dead_code)]

use routemock::MockServerBuilder;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::{sync::oneshot, task::JoinHandle};

/// A mock server running on an ephemeral port for the duration of one test.
pub struct TestServer {
    pub address: SocketAddr,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(MockServerBuilder::new()).await
    }

    pub async fn start_with(builder: MockServerBuilder) -> Self {
        let server = builder.build().expect("cannot build mock server");

        let (addr_sender, addr_receiver) = oneshot::channel();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .start_with_signals(Some(addr_sender), async {
                    let _ = shutdown_receiver.await;
                })
                .await
                .expect("mock server failed");
        });

        let address = addr_receiver
            .await
            .expect("mock server did not publish its address");

        TestServer {
            address,
            client: reqwest::Client::new(),
            shutdown: Some(shutdown_sender),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        self.url(&format!("/__routemock__{}", path))
    }

    /// Creates a mock and returns its id. Panics if the server does not accept it.
    pub async fn create_mock(&self, mock: Value) -> u64 {
        let res = self
            .client
            .post(self.admin_url("/mocks"))
            .json(&mock)
            .send()
            .await
            .unwrap();

        let status = res.status();
        let body: Value = res.json().await.unwrap();

        assert_eq!(status, 201, "mock was rejected: {}", body);
        body["id"].as_u64().unwrap()
    }

    pub async fn stop(mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }
    }
}

/// A valid mock with a static body.
pub fn static_mock(name: &str, method: &str, path: &str, body: &str) -> Value {
    json!({
        "name": name,
        "request_method": method,
        "route_path": path,
        "status": 200,
        "content_type": "application/json",
        "body_type": "static",
        "body_content": body
    })
}
