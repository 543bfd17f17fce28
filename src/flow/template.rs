//! Template expression parsing and resolution.
//!
//! Parameters may embed references to upstream node outputs in the form
//! `{{slug.field.path}}`. Parsing is purely syntactic; resolution walks the
//! referenced node's output in the run context. Resolution is best-effort by
//! design: a reference to a missing node or field substitutes the empty
//! string instead of failing the run.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::{common::Vars, runtime::Context};

/// Matches `{{ slug.field.path }}`. A bare `{{slug}}` with no field path is
/// not a reference and is left untouched.
static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z][A-Za-z0-9_]*)((?:\.[A-Za-z0-9_]+)+)\s*\}\}").unwrap());

/// Matches `{{$VAR_NAME$}}` references into the flow's environment map.
static ENV_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\$([A-Za-z_][A-Za-z0-9_]*)\$\}\}").unwrap());

/// One parsed template reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateReference {
    /// Normalized `slug.field.path` form.
    pub full_path: String,
    /// The referenced node's slug, lowercased.
    pub node_slug: String,
    /// Field path segments below the node output.
    pub field_path: Vec<String>,
}

/// Parse every template reference out of `input`.
///
/// Matching is case-insensitive; slugs and paths are normalized to
/// lowercase. References are deduplicated by `full_path` in order of first
/// appearance. Malformed expressions are silently skipped.
pub fn parse_template_references(input: &str) -> Vec<TemplateReference> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    for caps in TEMPLATE_RE.captures_iter(input) {
        let node_slug = caps[1].to_lowercase();
        let path = caps[2].to_lowercase();
        let full_path = format!("{}{}", node_slug, path);

        if !seen.insert(full_path.clone()) {
            continue;
        }
        refs.push(TemplateReference {
            full_path,
            node_slug,
            field_path: path.trim_start_matches('.').split('.').map(str::to_string).collect(),
        });
    }
    refs
}

/// Recursively collect every reference in a parameter tree.
pub fn extract_all_references(value: &Value) -> Vec<TemplateReference> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    collect_references(value, &mut seen, &mut refs);
    refs
}

fn collect_references(
    value: &Value,
    seen: &mut HashSet<String>,
    refs: &mut Vec<TemplateReference>,
) {
    match value {
        Value::String(s) => {
            for r in parse_template_references(s) {
                if seen.insert(r.full_path.clone()) {
                    refs.push(r);
                }
            }
        }
        Value::Array(arr) => {
            for v in arr {
                collect_references(v, seen, refs);
            }
        }
        Value::Object(obj) => {
            for v in obj.values() {
                collect_references(v, seen, refs);
            }
        }
        _ => {}
    }
}

/// Substitute every reference in `template` with the string form of the
/// referenced output value.
///
/// A missing node, a missing field, or a lookup error all substitute `""`:
/// partial resolution, never failure.
pub fn resolve_template(
    ctx: &Context,
    template: &str,
) -> String {
    let resolved = ENV_RE.replace_all(template, |caps: &regex::Captures| ctx.env().get(&caps[1].to_string()).unwrap_or_default());

    TEMPLATE_RE
        .replace_all(&resolved, |caps: &regex::Captures| {
            let slug = caps[1].to_lowercase();
            let path: Vec<String> = caps[2].to_lowercase().trim_start_matches('.').split('.').map(str::to_string).collect();
            lookup(ctx, &slug, &path).map(|v| value_to_string(&v)).unwrap_or_default()
        })
        .into_owned()
}

/// Resolve every template expression in a JSON value recursively.
///
/// A string that resolves to a JSON object or array literal is re-parsed so
/// a reference to a structured output stays structured.
pub fn resolve_value(
    ctx: &Context,
    value: &Value,
) -> Value {
    match value {
        Value::String(s) => {
            let resolved = resolve_template(ctx, s);
            if resolved.starts_with('{') || resolved.starts_with('[') {
                serde_json::from_str(&resolved).unwrap_or(Value::String(resolved))
            } else {
                Value::String(resolved)
            }
        }
        Value::Array(arr) => Value::Array(arr.iter().map(|v| resolve_value(ctx, v)).collect()),
        Value::Object(obj) => Value::Object(obj.iter().map(|(k, v)| (k.clone(), resolve_value(ctx, v))).collect()),
        _ => value.clone(),
    }
}

/// Resolve every template expression in a parameter set.
pub fn resolve_vars(
    ctx: &Context,
    vars: &Vars,
) -> Vars {
    Vars::from(resolve_value(ctx, &vars.clone().into()))
}

/// Return the referenced slugs that are not present in the flow, for
/// editor-time linting.
pub fn validate_node_references(
    refs: &[TemplateReference],
    valid_slugs: &HashSet<String>,
) -> Vec<String> {
    let mut missing: Vec<String> = refs.iter().filter(|r| !valid_slugs.contains(&r.node_slug)).map(|r| r.node_slug.clone()).collect();
    missing.sort();
    missing.dedup();
    missing
}

fn lookup(
    ctx: &Context,
    slug: &str,
    path: &[String],
) -> Option<Value> {
    let outputs = ctx.node_value(slug).ok()?;

    let mut current: Option<Value> = outputs.get_value(path.first()?).cloned();
    for key in path.iter().skip(1) {
        current = current.as_ref().and_then(|v| v.get(key)).cloned();
    }
    current
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        v => v.to_string(),
    }
}
