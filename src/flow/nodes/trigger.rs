use async_trait::async_trait;
use serde_json::Value;

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

/// Flow entry point. Its output is the tool-call argument bag bound at
/// invocation; the configured `schema` parameter declares the tool's public
/// parameter surface to the propagator.
pub struct TriggerNode;

#[async_trait]
impl NodeType for TriggerNode {
    fn name(&self) -> &'static str {
        "trigger"
    }

    fn display_name(&self) -> &'static str {
        "Trigger"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Trigger
    }

    fn inputs(&self) -> Vec<OutputHandle> {
        Vec::new()
    }

    fn input_schema(&self) -> SchemaState {
        SchemaState::Empty
    }

    fn dynamic_output_schema(
        &self,
        parameters: &Vars,
    ) -> Option<Value> {
        parameters.get_value("schema").cloned()
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult> {
        Ok(ExecutionResult::success(ctx.inputs()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::runtime::Context;

    #[test]
    fn test_trigger_passes_inputs_through() {
        let run = Context::new("rid".to_string(), "fid".to_string()).with_inputs(Vars::new().with("query", "rust"));
        let ctx = ExecutionContext::new(&run, "n1", "start", Vars::new());

        let result = tokio_test::block_on(TriggerNode.execute(&ctx)).unwrap();
        assert!(result.is_success());
        assert_eq!(result.output.get::<String>("query"), Some("rust".to_string()));
    }

    #[test]
    fn test_trigger_schema_comes_from_parameters() {
        let schema = json!({"type": "object", "properties": {"query": {"type": "string"}}});
        let params = Vars::new().with("schema", schema.clone());
        assert_eq!(TriggerNode.dynamic_output_schema(&params), Some(schema));
        assert_eq!(TriggerNode.dynamic_output_schema(&Vars::new()), None);
    }
}
