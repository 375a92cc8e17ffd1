//! Remote executor that talks HTTP to the agent on each client.
//!
//! * start: `POST {base}/api/execute` with `{"command": ...}`
//! * stop:  `POST {base}/api/stop`

use futures::future::BoxFuture;
use preset_core::config::AgentConfig;
use preset_core::registry::ClientDirectory;
use preset_core::{ClientId, DispatchError, DispatchResult, RemoteExecutor};
use std::sync::Arc;

pub struct HttpExecutor {
    http: reqwest::Client,
    directory: Arc<dyn ClientDirectory>,
    agent: AgentConfig,
}

impl HttpExecutor {
    pub fn new(directory: Arc<dyn ClientDirectory>, agent: AgentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            directory,
            agent,
        }
    }

    fn url(&self, client_id: &ClientId, path: &str) -> Result<String, DispatchError> {
        let client = self
            .directory
            .client(client_id)
            .ok_or_else(|| DispatchError::UnknownClient(client_id.clone()))?;
        Ok(format!("{}{}", self.agent.base_url(&client.address), path))
    }

    async fn post(
        &self,
        client_id: &ClientId,
        path: &str,
        body: serde_json::Value,
    ) -> DispatchResult {
        let url = self.url(client_id, path)?;
        tracing::debug!(client_id = %client_id, url = %url, "dispatching");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Unreachable(client_id.clone(), e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        let reason = if detail.trim().is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", detail.trim())
        };
        Err(DispatchError::Rejected(client_id.clone(), reason))
    }
}

impl RemoteExecutor for HttpExecutor {
    fn dispatch_start<'a>(
        &'a self,
        client_id: &'a ClientId,
        command: &'a str,
    ) -> BoxFuture<'a, DispatchResult> {
        Box::pin(self.post(
            client_id,
            "/api/execute",
            serde_json::json!({ "command": command }),
        ))
    }

    fn dispatch_stop<'a>(&'a self, client_id: &'a ClientId) -> BoxFuture<'a, DispatchResult> {
        Box::pin(self.post(client_id, "/api/stop", serde_json::json!({})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preset_core::registry::Registry;
    use preset_core::Client;

    fn executor_for(address: &str) -> HttpExecutor {
        let registry = Registry::new();
        registry.upsert_client(Client {
            id: ClientId::from("c1"),
            name: "Node 1".into(),
            address: address.to_string(),
        });
        HttpExecutor::new(Arc::new(registry), AgentConfig::default())
    }

    #[tokio::test]
    async fn start_posts_command_to_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/execute")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({ "command": "show.exe -dc_node=Node_0" }),
            ))
            .with_status(200)
            .create_async()
            .await;

        let executor = executor_for(&server.url());
        executor
            .dispatch_start(&ClientId::from("c1"), "show.exe -dc_node=Node_0")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn stop_posts_to_stop_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/stop")
            .with_status(204)
            .create_async()
            .await;

        let executor = executor_for(&server.url());
        executor.dispatch_stop(&ClientId::from("c1")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/execute")
            .with_status(500)
            .with_body("process failed to launch")
            .create_async()
            .await;

        let executor = executor_for(&server.url());
        let err = executor
            .dispatch_start(&ClientId::from("c1"), "show.exe")
            .await
            .unwrap_err();
        match err {
            DispatchError::Rejected(id, reason) => {
                assert_eq!(id, ClientId::from("c1"));
                assert!(reason.contains("process failed to launch"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_client_has_no_address() {
        let executor = HttpExecutor::new(Arc::new(Registry::new()), AgentConfig::default());
        let err = executor
            .dispatch_stop(&ClientId::from("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::UnknownClient(ClientId::from("ghost")));
    }

    #[tokio::test]
    async fn connection_refused_is_unreachable() {
        // Port 9 (discard) is not expected to accept HTTP on loopback.
        let executor = executor_for("http://127.0.0.1:9");
        let err = executor
            .dispatch_stop(&ClientId::from("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unreachable(..)));
    }
}
