use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};

use crate::{
    Result,
    common::Vars,
    flow::nodes::{ExecutionResult, NodeCategory, NodeType},
    runtime::ExecutionContext,
    schema::SchemaState,
};

use super::models::*;

/// Action node performing an outbound HTTP call.
///
/// Network faults are configuration/runtime failures of the node, returned
/// as failed results so the dispatcher's retry policy can apply. Non-2xx
/// responses are still successful executions; the status code is part of the
/// output for downstream branching.
pub struct HttpRequestNode;

impl HttpRequestNode {
    fn build_request(
        params: &HttpRequestParams,
    ) -> std::result::Result<reqwest::RequestBuilder, String> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));

        match &params.auth {
            AuthConfig::None => {}
            AuthConfig::Bearer { token } => {
                let value = format!("Bearer {}", token);
                headers.insert(
                    HeaderName::from_static("authorization"),
                    value.parse().map_err(|e: reqwest::header::InvalidHeaderValue| e.to_string())?,
                );
            }
            AuthConfig::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{}:{}", username, password));
                let value = format!("Basic {}", encoded);
                headers.insert(
                    HeaderName::from_static("authorization"),
                    value.parse().map_err(|e: reqwest::header::InvalidHeaderValue| e.to_string())?,
                );
            }
        }

        for (key, value) in &params.headers {
            headers.insert(
                key.parse::<HeaderName>().map_err(|e| e.to_string())?,
                value.parse::<HeaderValue>().map_err(|e| e.to_string())?,
            );
        }

        let method: reqwest::Method = params.method.as_ref().parse().map_err(|_| format!("invalid method '{:?}'", params.method))?;
        let query: Vec<(String, String)> = params.query.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        let client = reqwest::Client::new();
        let mut request = client.request(method, &params.url).headers(headers).query(&query).timeout(Duration::from_millis(params.timeout));

        match params.body.kind {
            BodyKind::None => {}
            BodyKind::Text => {
                if let Some(data) = &params.body.data {
                    let text = data.as_str().ok_or("text body must be a string")?;
                    request = request.body(text.to_string());
                }
            }
            BodyKind::Json => {
                if let Some(data) = &params.body.data {
                    request = request.json(data);
                }
            }
            BodyKind::Form => {
                if let Some(data) = &params.body.data {
                    let form = data.as_object().ok_or("form body must be an object")?;
                    request = request.form(form);
                }
            }
        }

        Ok(request)
    }
}

#[async_trait]
impl NodeType for HttpRequestNode {
    fn name(&self) -> &'static str {
        "http_request"
    }

    fn display_name(&self) -> &'static str {
        "HTTP Request"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Action
    }

    fn default_parameters(&self) -> Vars {
        Vars::new()
            .with("url", "")
            .with("method", "GET")
            .with("headers", json!({}))
            .with("query", json!({}))
            .with("body", json!({"kind": "none"}))
            .with("auth", json!({"auth_type": "none"}))
            .with("timeout", 30_000)
    }

    fn input_schema(&self) -> SchemaState {
        SchemaState::Empty
    }

    fn output_schema(&self) -> SchemaState {
        SchemaState::Resolved(json!({
            "type": "object",
            "properties": {
                "status_code": {"type": "integer"},
                "headers": {"type": "object"},
                "body": {"type": "string"},
                "data": {}
            },
            "required": ["status_code", "headers", "body"]
        }))
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult> {
        let params: HttpRequestParams = match serde_json::from_value(ctx.parameters().clone().into()) {
            Ok(p) => p,
            Err(e) => return Ok(ExecutionResult::failed(format!("http_request: invalid parameters: {}", e))),
        };
        if params.url.trim().is_empty() {
            return Ok(ExecutionResult::failed("http_request: url is required"));
        }

        let request = match Self::build_request(&params) {
            Ok(r) => r,
            Err(e) => return Ok(ExecutionResult::failed(format!("http_request: {}", e))),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return Ok(ExecutionResult::failed(format!("http_request: {}", e))),
        };

        let mut outputs = Vars::new();
        outputs.set("status_code", response.status().as_u16());

        let header_map: HashMap<String, String> = response.headers().iter().map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string())).collect();
        outputs.insert("headers".to_string(), serde_json::to_value(header_map)?);

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return Ok(ExecutionResult::failed(format!("http_request: {}", e))),
        };
        // structured bodies stay addressable from templates via `data`
        if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
            outputs.set("data", parsed);
        }
        outputs.set("body", body);

        Ok(ExecutionResult::success(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Context;

    #[test]
    fn test_missing_url_is_a_failed_result() {
        let run = Context::new("rid".to_string(), "fid".to_string());
        let ctx = ExecutionContext::new(&run, "n1", "fetch", HttpRequestNode.default_parameters());

        let result = tokio_test::block_on(HttpRequestNode.execute(&ctx)).unwrap();
        assert!(!result.is_success());
        assert!(result.error.unwrap().contains("url is required"));
    }

    #[test]
    fn test_invalid_parameters_are_a_failed_result() {
        let run = Context::new("rid".to_string(), "fid".to_string());
        let params = Vars::new().with("url", "https://example.com").with("method", "TELEPORT");
        let ctx = ExecutionContext::new(&run, "n1", "fetch", params);

        let result = tokio_test::block_on(HttpRequestNode.execute(&ctx)).unwrap();
        assert!(!result.is_success());
        assert!(result.error.unwrap().contains("invalid parameters"));
    }

    #[test]
    fn test_basic_auth_header_is_encoded() {
        let params = HttpRequestParams {
            url: "https://example.com".to_string(),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            query: HashMap::new(),
            body: RequestBody::default(),
            auth: AuthConfig::Basic {
                username: "user".to_string(),
                password: "pass".to_string(),
            },
            timeout: 1000,
        };
        let request = HttpRequestNode::build_request(&params).unwrap().build().unwrap();
        let auth = request.headers().get("authorization").unwrap().to_str().unwrap();
        assert_eq!(auth, format!("Basic {}", STANDARD.encode("user:pass")));
    }
}
