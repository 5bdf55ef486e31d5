//! HTTP request tool.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::context::ExecutionContext;
use crate::tools::tool::{SideEffect, Tool, ToolError, ToolOutput, optional_u64, require_str};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Tool for making HTTP requests.
pub struct HttpTool {
    client: Client,
}

impl HttpTool {
    /// Create a new HTTP tool.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        "http"
    }

    fn description(&self) -> &str {
        "Make HTTP requests to external APIs. Supports GET, POST, PUT, DELETE and PATCH."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "DELETE", "PATCH"],
                    "description": "HTTP method"
                },
                "url": {
                    "type": "string",
                    "description": "The URL to request"
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "HTTP headers to include"
                },
                "body": {
                    "description": "Request body (for POST/PUT/PATCH)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Request timeout in seconds (default: 30, capped by the call timeout)"
                }
            },
            "required": ["method", "url"]
        })
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Network
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = std::time::Instant::now();

        let method = require_str(&params, "method")?;
        let url = require_str(&params, "url")?;

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidParameters(format!(
                "url must start with http:// or https://, got '{}'",
                url
            )));
        }

        let headers: HashMap<String, String> = params
            .get("headers")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let timeout = optional_u64(&params, "timeout_secs")
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .min(ctx.timeout);

        let mut request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            "PATCH" => self.client.patch(url),
            _ => {
                return Err(ToolError::InvalidParameters(format!(
                    "unsupported method: {}",
                    method
                )));
            }
        };

        request = request.timeout(timeout);
        for (key, value) in headers {
            request = request.header(&key, &value);
        }
        if let Some(body) = params.get("body") {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout(timeout)
            } else {
                ToolError::ExternalService(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(|e| {
            ToolError::ExternalService(format!("failed to read response body: {}", e))
        })?;

        tracing::debug!(url = url, status = status, bytes = body_text.len(), "HTTP request finished");

        // Try to parse as JSON, fall back to string
        let body: serde_json::Value = serde_json::from_str(&body_text)
            .unwrap_or(serde_json::Value::String(body_text));

        let result = serde_json::json!({
            "status": status,
            "body": body
        });

        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallerId;

    #[test]
    fn test_http_schema() {
        let tool = HttpTool::new();
        assert_eq!(tool.name(), "http");
        assert_eq!(tool.side_effect(), SideEffect::Network);
        let schema = tool.parameters_schema();
        assert!(
            schema["required"]
                .as_array()
                .unwrap()
                .contains(&"url".into())
        );
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let ctx = ExecutionContext::new("/tmp", CallerId::Heartbeat);
        let err = HttpTool::new()
            .execute(
                serde_json::json!({"method": "GET", "url": "file:///etc/passwd"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
