use async_trait::async_trait;
use serde_json::json;

use crate::{
    Result,
    common::Vars,
    flow::{
        connection::OutputHandle,
        nodes::{ExecutionResult, NodeCategory, NodeType},
    },
    runtime::ExecutionContext,
    schema::SchemaState,
};

/// Terminal node that opens a link when the user acts on the upstream
/// rendered component. The graph validator only allows it downstream of
/// interface nodes.
pub struct LinkNode;

#[async_trait]
impl NodeType for LinkNode {
    fn name(&self) -> &'static str {
        "link"
    }

    fn display_name(&self) -> &'static str {
        "Link"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Return
    }

    fn outputs(&self) -> Vec<OutputHandle> {
        Vec::new()
    }

    fn default_parameters(&self) -> Vars {
        Vars::new().with("href", "")
    }

    fn output_schema(&self) -> SchemaState {
        SchemaState::Resolved(json!({
            "type": "object",
            "properties": {
                "type": {"const": "link"},
                "href": {"type": "string"}
            },
            "required": ["type", "href"]
        }))
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult> {
        let raw = ctx.parameters().get::<String>("href").unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(ExecutionResult::failed("link: URL is required"));
        }

        let mut href = ctx.resolve(raw.trim()).trim().to_string();
        if !href.starts_with("http://") && !href.starts_with("https://") {
            href = format!("https://{}", href);
        }

        match reqwest::Url::parse(&href) {
            Ok(_) => Ok(ExecutionResult::success(Vars::new().with("type", "link").with("href", href))),
            Err(e) => {
                // keep the best-effort href so the caller can show what was
                // attempted
                let error = format!("link: invalid URL: {}", e);
                let output = Vars::new().with("type", "link").with("href", href).with("error", error.clone());
                Ok(ExecutionResult::failed_with_output(error, output))
            }
        }
    }
}
