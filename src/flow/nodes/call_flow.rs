use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    Result,
    common::Vars,
    flow::{
        connection::OutputHandle,
        nodes::{ExecutionResult, NodeCategory, NodeType, SchemaDependency},
    },
    runtime::ExecutionContext,
    schema::FIELD_SOURCE_KEY,
};

/// Terminal node that invokes another flow and returns its output.
///
/// The shape of `result` is only known once the target flow is known: the
/// dynamic output schema marks it `x-field-source: dynamic` and names the
/// target as a cross-flow schema dependency for the propagator to resolve.
pub struct CallFlowNode;

impl CallFlowNode {
    fn target_of(parameters: &Vars) -> Option<String> {
        parameters.get::<String>("target_flow_id").map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
    }
}

#[async_trait]
impl NodeType for CallFlowNode {
    fn name(&self) -> &'static str {
        "call_flow"
    }

    fn display_name(&self) -> &'static str {
        "Call Flow"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Return
    }

    fn outputs(&self) -> Vec<OutputHandle> {
        Vec::new()
    }

    fn default_parameters(&self) -> Vars {
        Vars::new().with("target_flow_id", "").with("input_mapping", json!({}))
    }

    fn dynamic_output_schema(
        &self,
        parameters: &Vars,
    ) -> Option<Value> {
        // no target configured: the schema is unknown, not empty, and the
        // propagator must not assume a shape
        Self::target_of(parameters)?;
        Some(json!({
            "type": "object",
            "properties": {
                "result": {FIELD_SOURCE_KEY: "dynamic"}
            },
            "required": ["result"]
        }))
    }

    fn schema_dependency(
        &self,
        parameters: &Vars,
    ) -> Option<SchemaDependency> {
        Self::target_of(parameters).map(SchemaDependency::FlowOutput)
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult> {
        let Some(target) = Self::target_of(ctx.parameters()) else {
            return Ok(ExecutionResult::failed("call_flow: no target flow configured"));
        };

        let mapping = ctx.parameters().get_value("input_mapping").cloned().map(Vars::from).unwrap_or_default();

        match ctx.call_flow(&target, mapping).await {
            Ok(result) => Ok(ExecutionResult::success(Vars::new().with("result", Value::from(result)))),
            Err(e) => Ok(ExecutionResult::failed(format!("Failed to call flow {}: {}", target, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::{AgentflowError, runtime::Context, runtime::FlowInvoker};

    struct RecordingInvoker {
        called: Arc<AtomicBool>,
        response: std::result::Result<Vars, String>,
    }

    #[async_trait]
    impl FlowInvoker for RecordingInvoker {
        async fn invoke(
            &self,
            _flow_id: &str,
            _inputs: Vars,
            _depth: u32,
        ) -> Result<Vars> {
            self.called.store(true, Ordering::SeqCst);
            self.response.clone().map_err(AgentflowError::Runtime)
        }
    }

    fn run_with_invoker(invoker: RecordingInvoker) -> Context {
        Context::new("rid".to_string(), "fid".to_string()).with_invoker(Arc::new(invoker), 0, 8)
    }

    #[test]
    fn test_missing_target_fails_without_invoking() {
        let called = Arc::new(AtomicBool::new(false));
        let run = run_with_invoker(RecordingInvoker {
            called: called.clone(),
            response: Ok(Vars::new()),
        });
        let ctx = ExecutionContext::new(&run, "n1", "call_sub", Vars::new());

        let result = tokio_test::block_on(CallFlowNode.execute(&ctx)).unwrap();
        assert!(!result.is_success());
        assert!(result.error.unwrap().contains("no target flow configured"));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_target_error_is_wrapped() {
        let run = run_with_invoker(RecordingInvoker {
            called: Arc::new(AtomicBool::new(false)),
            response: Err("boom".to_string()),
        });
        let params = Vars::new().with("target_flow_id", "weather_flow");
        let ctx = ExecutionContext::new(&run, "n1", "call_sub", params);

        let result = tokio_test::block_on(CallFlowNode.execute(&ctx)).unwrap();
        assert!(!result.is_success());
        let error = result.error.unwrap();
        assert!(error.contains("Failed to call flow weather_flow"));
        assert!(error.contains("boom"));
    }

    #[test]
    fn test_success_wraps_result() {
        let run = run_with_invoker(RecordingInvoker {
            called: Arc::new(AtomicBool::new(false)),
            response: Ok(Vars::new().with("temperature", 21)),
        });
        let params = Vars::new().with("target_flow_id", "weather_flow");
        let ctx = ExecutionContext::new(&run, "n1", "call_sub", params);

        let result = tokio_test::block_on(CallFlowNode.execute(&ctx)).unwrap();
        assert!(result.is_success());
        assert_eq!(result.output.get_value("result"), Some(&serde_json::json!({"temperature": 21})));
    }

    #[test]
    fn test_dynamic_schema_requires_target() {
        assert_eq!(CallFlowNode.dynamic_output_schema(&Vars::new()), None);
        assert_eq!(CallFlowNode.schema_dependency(&Vars::new()), None);

        let params = Vars::new().with("target_flow_id", "other");
        let schema = CallFlowNode.dynamic_output_schema(&params).unwrap();
        assert_eq!(schema["properties"]["result"][FIELD_SOURCE_KEY], "dynamic");
        assert_eq!(CallFlowNode.schema_dependency(&params), Some(SchemaDependency::FlowOutput("other".to_string())));
    }
}
