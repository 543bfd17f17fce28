use async_trait::async_trait;
use serde_json::Value;

use crate::{
    Result,
    common::Vars,
    flow::nodes::{ExecutionResult, NodeCategory, NodeType},
    runtime::ExecutionContext,
    schema::infer_value_schema,
};

/// Pure data reshaping: the `mappings` parameter is an object whose values
/// are templates or literals; the resolved object is the node's output.
pub struct TransformNode;

#[async_trait]
impl NodeType for TransformNode {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn display_name(&self) -> &'static str {
        "Transform"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Transform
    }

    fn default_parameters(&self) -> Vars {
        Vars::new().with("mappings", serde_json::json!({}))
    }

    fn dynamic_output_schema(
        &self,
        parameters: &Vars,
    ) -> Option<Value> {
        match parameters.get_value("mappings") {
            Some(mappings @ Value::Object(_)) => Some(infer_value_schema(mappings)),
            _ => None,
        }
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult> {
        let mappings = match ctx.parameters().get_value("mappings") {
            Some(Value::Object(obj)) => Vars::from(Value::Object(obj.clone())),
            Some(_) => return Ok(ExecutionResult::failed("transform: mappings must be an object")),
            None => Vars::new(),
        };
        Ok(ExecutionResult::success(mappings))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::runtime::Context;

    #[test]
    fn test_transform_emits_mappings() {
        let run = Context::new("rid".to_string(), "fid".to_string());
        // the dispatcher resolves templates before execute; by then the
        // mappings are plain values
        let params = Vars::new().with("mappings", json!({"summary": "3 posts", "count": 3}));
        let ctx = ExecutionContext::new(&run, "n1", "reshape", params);

        let result = tokio_test::block_on(TransformNode.execute(&ctx)).unwrap();
        assert!(result.is_success());
        assert_eq!(result.output.get::<i64>("count"), Some(3));
    }

    #[test]
    fn test_transform_rejects_non_object_mappings() {
        let run = Context::new("rid".to_string(), "fid".to_string());
        let ctx = ExecutionContext::new(&run, "n1", "reshape", Vars::new().with("mappings", json!([1])));

        let result = tokio_test::block_on(TransformNode.execute(&ctx)).unwrap();
        assert!(!result.is_success());
    }

    #[test]
    fn test_transform_schema_follows_mapping_shape() {
        let params = Vars::new().with("mappings", json!({"summary": "{{a.b}}", "count": 3}));
        let schema = TransformNode.dynamic_output_schema(&params).unwrap();
        assert_eq!(schema["properties"]["summary"], json!({"type": "string"}));
        assert_eq!(schema["properties"]["count"], json!({"type": "number"}));
    }
}
