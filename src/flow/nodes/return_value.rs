use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    Result,
    common::Vars,
    flow::{
        connection::OutputHandle,
        nodes::{ExecutionResult, NodeCategory, NodeType},
    },
    runtime::ExecutionContext,
    schema::infer_value_schema,
};

/// Terminal node returning its resolved `value` parameter as the flow's
/// output. A non-object value is wrapped under a `value` key so the output
/// stays addressable from templates in calling flows.
pub struct ReturnValueNode;

#[async_trait]
impl NodeType for ReturnValueNode {
    fn name(&self) -> &'static str {
        "return_value"
    }

    fn display_name(&self) -> &'static str {
        "Return Value"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Return
    }

    fn outputs(&self) -> Vec<OutputHandle> {
        Vec::new()
    }

    fn default_parameters(&self) -> Vars {
        Vars::new().with("value", json!({}))
    }

    fn dynamic_output_schema(
        &self,
        parameters: &Vars,
    ) -> Option<Value> {
        let value = parameters.get_value("value")?;
        match value {
            Value::Object(_) => Some(infer_value_schema(value)),
            v => Some(json!({
                "type": "object",
                "properties": {"value": infer_value_schema(v)}
            })),
        }
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult> {
        let value = ctx.parameters().get_value("value").cloned().unwrap_or(Value::Null);
        let output = match value {
            Value::Object(obj) => Vars::from(Value::Object(obj)),
            v => Vars::new().with("value", v),
        };
        Ok(ExecutionResult::success(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Context;

    #[test]
    fn test_object_value_is_the_output() {
        let run = Context::new("rid".to_string(), "fid".to_string());
        let params = Vars::new().with("value", json!({"answer": 42}));
        let ctx = ExecutionContext::new(&run, "n1", "done", params);

        let result = tokio_test::block_on(ReturnValueNode.execute(&ctx)).unwrap();
        assert!(result.is_success());
        assert_eq!(result.output.get::<i64>("answer"), Some(42));
    }

    #[test]
    fn test_scalar_value_is_wrapped() {
        let run = Context::new("rid".to_string(), "fid".to_string());
        let params = Vars::new().with("value", "done");
        let ctx = ExecutionContext::new(&run, "n1", "done", params);

        let result = tokio_test::block_on(ReturnValueNode.execute(&ctx)).unwrap();
        assert_eq!(result.output.get::<String>("value"), Some("done".to_string()));
    }

    #[test]
    fn test_schema_inferred_from_value() {
        let params = Vars::new().with("value", json!({"answer": 42}));
        let schema = ReturnValueNode.dynamic_output_schema(&params).unwrap();
        assert_eq!(schema["properties"]["answer"], json!({"type": "number"}));
    }
}
