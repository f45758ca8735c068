use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandState {
    pub command_name: String,
    pub command_status: CommandStatus,
    pub command_error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CommandsResponse {
    commands: Vec<CommandState>,
}

#[derive(Debug, Serialize)]
struct CommandEnvelope<'a> {
    name: &'a str,
    params: Value,
}

/// HTTP client for the in-band agent's command protocol, grounded on
/// `ironic`'s `AgentClient`: commands are POSTed as `{name, params}` to
/// `{agent_url}/{api_version}/commands`, and polled with a bare `GET` of
/// the same URL.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    api_version: String,
}

impl AgentClient {
    pub fn new(api_version: impl Into<String>) -> Self {
        AgentClient {
            http: reqwest::Client::new(),
            api_version: api_version.into(),
        }
    }

    fn command_url(&self, agent_url: &str) -> String {
        format!("{}/{}/commands", agent_url.trim_end_matches('/'), self.api_version)
    }

    async fn command(
        &self,
        agent_url: &str,
        method: &str,
        params: Value,
        wait: bool,
    ) -> Result<Value, AgentError> {
        let url = self.command_url(agent_url);
        debug!(%url, %method, "issuing agent command");
        let response = self
            .http
            .post(&url)
            .query(&[("wait", wait.to_string())])
            .json(&CommandEnvelope { name: method, params })
            .send()
            .await
            .map_err(|e| AgentError::AgentRpc(e.to_string()))?;

        response
            .error_for_status()
            .map_err(|e| AgentError::AgentRpc(e.to_string()))?
            .json::<Value>()
            .await
            .map_err(|e| AgentError::AgentRpc(e.to_string()))
    }

    /// Fetch the agent's command history, most recent last.
    pub async fn get_commands_status(&self, agent_url: &str) -> Result<Vec<CommandState>, AgentError> {
        let url = self.command_url(agent_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::AgentRpc(e.to_string()))?
            .error_for_status()
            .map_err(|e| AgentError::AgentRpc(e.to_string()))?
            .json::<CommandsResponse>()
            .await
            .map_err(|e| AgentError::AgentRpc(e.to_string()))?;
        Ok(response.commands)
    }

    /// Whether the deploy RPC the agent is running has finished: the last
    /// recorded command must be `prepare_image` and no longer `RUNNING`.
    /// Mirrors `ironic.drivers.modules.agent_client.AgentClient.deploy_is_done`.
    pub async fn deploy_is_done(&self, agent_url: &str) -> Result<bool, AgentError> {
        let commands = self.get_commands_status(agent_url).await?;
        let Some(last) = commands.last() else {
            return Ok(false);
        };
        if last.command_name != "prepare_image" {
            return Ok(false);
        }
        Ok(last.command_status != CommandStatus::Running)
    }

    pub async fn prepare_image(
        &self,
        agent_url: &str,
        image_info: Value,
        configdrive: Value,
    ) -> Result<Value, AgentError> {
        self.command(
            agent_url,
            "standby.prepare_image",
            serde_json::json!({ "image_info": image_info, "configdrive": configdrive }),
            false,
        )
        .await
    }

    pub async fn run_image(&self, agent_url: &str) -> Result<Value, AgentError> {
        self.command(agent_url, "standby.run_image", serde_json::json!({}), false)
            .await
    }

    /// Issue a decommission/erase command to the agent. Safe to call
    /// repeatedly without holding the node's exclusive lock (spec.md §8).
    pub async fn clean_up(&self, agent_url: &str) -> Result<Value, AgentError> {
        self.command(agent_url, "decom.erase_drives", serde_json::json!({}), false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn prepare_image_posts_command_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/commands"))
            .and(query_param("wait", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = AgentClient::new("v1");
        let result = client
            .prepare_image(&server.uri(), serde_json::json!({"id": "img"}), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn deploy_is_done_false_when_still_running() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/commands"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "commands": [{"command_name": "prepare_image", "command_status": "RUNNING", "command_error": null}]
            })))
            .mount(&server)
            .await;

        let client = AgentClient::new("v1");
        assert!(!client.deploy_is_done(&server.uri()).await.unwrap());
    }

    #[tokio::test]
    async fn deploy_is_done_true_when_succeeded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/commands"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "commands": [{"command_name": "prepare_image", "command_status": "SUCCEEDED", "command_error": null}]
            })))
            .mount(&server)
            .await;

        let client = AgentClient::new("v1");
        assert!(client.deploy_is_done(&server.uri()).await.unwrap());
    }

    #[tokio::test]
    async fn deploy_is_done_false_with_no_commands() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/commands"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"commands": []})))
            .mount(&server)
            .await;

        let client = AgentClient::new("v1");
        assert!(!client.deploy_is_done(&server.uri()).await.unwrap());
    }
}
