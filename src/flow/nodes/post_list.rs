use std::sync::LazyLock;

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
    schema::SchemaState,
};

/// Payload shape of one post, also the `action:on_read_more` edge schema.
static POST_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "string"},
            "title": {"type": "string"},
            "excerpt": {"type": "string"},
            "author": {"type": "string"},
            "published_at": {"type": "string"}
        },
        "required": ["id", "title", "excerpt", "author", "published_at"]
    })
});

static POST_LIST_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "type": "array",
        "items": POST_SCHEMA.clone()
    })
});

/// Interface node rendering a list of posts.
///
/// Two-phase by contract: `execute` returns the render descriptor and
/// suspends the run; the `on_read_more` action payload (one post) arrives on
/// a later resume call, when the user picks an item.
pub struct PostListNode;

pub const ON_READ_MORE: &str = "on_read_more";

#[async_trait]
impl NodeType for PostListNode {
    fn name(&self) -> &'static str {
        "post_list"
    }

    fn display_name(&self) -> &'static str {
        "Post List"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Interface
    }

    fn outputs(&self) -> Vec<OutputHandle> {
        vec![OutputHandle::action(ON_READ_MORE)]
    }

    fn default_parameters(&self) -> Vars {
        Vars::new().with("posts", json!([]))
    }

    fn input_schema(&self) -> SchemaState {
        SchemaState::Resolved(POST_LIST_SCHEMA.clone())
    }

    fn action_schema(
        &self,
        action: &str,
    ) -> Option<Value> {
        (action == ON_READ_MORE).then(|| POST_SCHEMA.clone())
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult> {
        let posts = ctx.parameters().get_value("posts").cloned().unwrap_or_else(|| json!([]));

        if let Err(e) = jsonschema::validate(&POST_LIST_SCHEMA, &posts) {
            let error = format!("post_list: posts do not match the expected shape: {}", e);
            let output = Vars::new().with("type", "post_list").with("posts", posts).with("error", error.clone());
            return Ok(ExecutionResult::failed_with_output(error, output));
        }

        let descriptor = Vars::new().with("type", "post_list").with("posts", posts).with("appearance", Value::from(ctx.appearance().clone()));
        Ok(ExecutionResult::render(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::ExecutionStatus;
    use crate::runtime::Context;

    fn post(id: &str) -> Value {
        json!({
            "id": id,
            "title": "title",
            "excerpt": "excerpt",
            "author": "author",
            "published_at": "2026-01-01"
        })
    }

    #[test]
    fn test_render_suspends_with_descriptor() {
        let run = Context::new("rid".to_string(), "fid".to_string());
        let params = Vars::new().with("posts", json!([post("p1"), post("p2")]));
        let ctx = ExecutionContext::new(&run, "n1", "posts", params);

        let result = tokio_test::block_on(PostListNode.execute(&ctx)).unwrap();
        assert_eq!(result.status, ExecutionStatus::Suspended);
        assert_eq!(result.output.get::<String>("type"), Some("post_list".to_string()));
        assert_eq!(result.output.get_value("posts").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_posts_fail_with_best_effort_output() {
        let run = Context::new("rid".to_string(), "fid".to_string());
        let params = Vars::new().with("posts", json!([{"id": "p1"}]));
        let ctx = ExecutionContext::new(&run, "n1", "posts", params);

        let result = tokio_test::block_on(PostListNode.execute(&ctx)).unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.unwrap().contains("expected shape"));
        assert!(result.output.contains_key("posts"));
    }

    #[test]
    fn test_action_schema_types_the_edge() {
        let schema = PostListNode.action_schema(ON_READ_MORE).unwrap();
        assert_eq!(schema["required"], json!(["id", "title", "excerpt", "author", "published_at"]));
        assert_eq!(PostListNode.action_schema("other"), None);
    }
}
