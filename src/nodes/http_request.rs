use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType, render_input, tool_failure};
use crate::error::{ConfigError, UpstreamToolError, WorkflowError};
use crate::services::{HttpClient, HttpRequest};
use crate::state::WorkflowState;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

const METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Deserialize)]
struct HttpPayload {
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<String>,
}

/// Sends an HTTP request built from templates. URL, header values and body
/// are all rendered against the run's variables.
pub struct HttpRequestNode {
    id: String,
    method: String,
    payload: HttpPayload,
    client: Arc<dyn HttpClient>,
}

impl HttpRequestNode {
    pub fn from_config(config: &NodeConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let client = ctx.services.http.clone().ok_or_else(|| ConfigError::MissingService {
            node_id: config.id.clone(),
            service: "http".to_string(),
        })?;
        let payload: HttpPayload = config.payload()?;
        let method = payload.method.to_ascii_uppercase();
        if !METHODS.contains(&method.as_str()) {
            return Err(config.invalid(format!("unsupported HTTP method '{}'", payload.method)));
        }
        if payload.url.trim().is_empty() {
            return Err(config.invalid("url is empty"));
        }
        Ok(Self {
            id: config.id.clone(),
            method,
            payload,
            client,
        })
    }

    fn request(&self, state: &WorkflowState) -> Result<HttpRequest, WorkflowError> {
        let headers = self
            .payload
            .headers
            .iter()
            .map(|(name, value)| -> Result<(String, String), WorkflowError> {
                Ok((name.clone(), render_input(value, state)?))
            })
            .collect::<Result<BTreeMap<_, _>, WorkflowError>>()?;
        let body = match &self.payload.body {
            Some(template) => Some(render_input(template, state)?),
            None => None,
        };
        Ok(HttpRequest {
            method: self.method.clone(),
            url: render_input(&self.payload.url, state)?,
            headers,
            body,
        })
    }
}

impl Node for HttpRequestNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::HttpRequest.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let request = self.request(state)?;
            tracing::debug!(node_id = %self.id, method = %request.method, url = %request.url, "sending request");
            let response = self.client.send(request).await.and_then(|response| {
                if response.status >= 400 {
                    Err(UpstreamToolError::new(
                        "http",
                        format!("status {}: {}", response.status, response.body),
                    ))
                } else {
                    Ok(response)
                }
            });
            let output = match response {
                Ok(response) => {
                    let json_body = serde_json::from_str::<Value>(&response.body).unwrap_or(Value::Null);
                    json!({
                        "output": response.body,
                        "status_code": response.status,
                        "headers": response.headers,
                        "json": json_body,
                    })
                }
                Err(e) => tool_failure(state, &self.id, &e),
            };
            Ok(NodeOutput::new(output))
        })
    }
}
