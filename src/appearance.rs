//! Static appearance/config option registry for visual components.
//!
//! The editor reads this table to render configuration knobs; the engine
//! applies the same defaults and validation before execution so both sides
//! agree on the effective config of every instance.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde_json::Value;

use crate::{AgentflowError, Result, common::Vars};

/// One typed configuration option of a component.
#[derive(Debug, Clone)]
pub struct AppearanceOption {
    pub name: &'static str,
    pub kind: AppearanceKind,
}

#[derive(Debug, Clone)]
pub enum AppearanceKind {
    Enum {
        values: &'static [&'static str],
        default: &'static str,
    },
    Boolean {
        default: bool,
    },
}

impl AppearanceOption {
    fn default_value(&self) -> Value {
        match &self.kind {
            AppearanceKind::Enum { default, .. } => Value::String((*default).to_string()),
            AppearanceKind::Boolean { default } => Value::Bool(*default),
        }
    }

    fn validate(
        &self,
        value: &Value,
    ) -> Result<()> {
        match (&self.kind, value) {
            (AppearanceKind::Enum { values, .. }, Value::String(s)) => {
                if values.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(AgentflowError::Config(format!("appearance option '{}' does not accept '{}' (one of: {})", self.name, s, values.join(", "))))
                }
            }
            (AppearanceKind::Enum { .. }, _) => Err(AgentflowError::Config(format!("appearance option '{}' must be a string", self.name))),
            (AppearanceKind::Boolean { .. }, Value::Bool(_)) => Ok(()),
            (AppearanceKind::Boolean { .. }, _) => Err(AgentflowError::Config(format!("appearance option '{}' must be a boolean", self.name))),
        }
    }
}

/// Appearance options per component/node type. Types without an entry carry
/// no configuration knobs.
pub static COMPONENT_APPEARANCE_REGISTRY: LazyLock<HashMap<&'static str, Vec<AppearanceOption>>> = LazyLock::new(|| {
    HashMap::from([
        (
            "post_list",
            vec![
                AppearanceOption {
                    name: "layout",
                    kind: AppearanceKind::Enum {
                        values: &["list", "grid"],
                        default: "list",
                    },
                },
                AppearanceOption {
                    name: "show_excerpt",
                    kind: AppearanceKind::Boolean {
                        default: true,
                    },
                },
                AppearanceOption {
                    name: "show_author",
                    kind: AppearanceKind::Boolean {
                        default: true,
                    },
                },
            ],
        ),
        (
            "link",
            vec![
                AppearanceOption {
                    name: "style",
                    kind: AppearanceKind::Enum {
                        values: &["button", "inline"],
                        default: "button",
                    },
                },
                AppearanceOption {
                    name: "open_in_new_tab",
                    kind: AppearanceKind::Boolean {
                        default: true,
                    },
                },
            ],
        ),
    ])
});

/// The merged defaults for a component type.
pub fn default_appearance_config(component: &str) -> Vars {
    let mut config = Vars::new();
    if let Some(options) = COMPONENT_APPEARANCE_REGISTRY.get(component) {
        for option in options {
            config.insert(option.name.to_string(), option.default_value());
        }
    }
    config
}

/// Validate an instance config against the registry and fill in defaults
/// for omitted options. Unknown keys and out-of-range values are
/// configuration errors.
pub fn apply_appearance(
    component: &str,
    instance: Option<&Value>,
) -> Result<Vars> {
    let mut config = default_appearance_config(component);

    let Some(instance) = instance else {
        return Ok(config);
    };
    let Value::Object(configured) = instance else {
        return Err(AgentflowError::Config(format!("appearance config for '{}' must be an object", component)));
    };

    let options = COMPONENT_APPEARANCE_REGISTRY.get(component);
    for (key, value) in configured {
        let option = options
            .and_then(|opts| opts.iter().find(|o| o.name == key))
            .ok_or_else(|| AgentflowError::Config(format!("unknown appearance option '{}' for '{}'", key, component)))?;
        option.validate(value)?;
        config.insert(key.clone(), value.clone());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_defaults_are_merged() {
        let config = default_appearance_config("post_list");
        assert_eq!(config.get::<String>("layout"), Some("list".to_string()));
        assert_eq!(config.get::<bool>("show_excerpt"), Some(true));
        assert_eq!(config.get::<bool>("show_author"), Some(true));
    }

    #[test]
    fn test_unregistered_component_has_no_options() {
        assert!(default_appearance_config("http_request").is_empty());
    }

    #[test]
    fn test_apply_overrides_and_defaults() {
        let instance = json!({"layout": "grid"});
        let config = apply_appearance("post_list", Some(&instance)).unwrap();
        assert_eq!(config.get::<String>("layout"), Some("grid".to_string()));
        // omitted options keep their defaults
        assert_eq!(config.get::<bool>("show_excerpt"), Some(true));
    }

    #[test]
    fn test_apply_rejects_unknown_option() {
        let err = apply_appearance("post_list", Some(&json!({"sparkles": true}))).unwrap_err();
        assert!(err.to_string().contains("unknown appearance option"));
    }

    #[test]
    fn test_apply_rejects_out_of_range_enum() {
        let err = apply_appearance("post_list", Some(&json!({"layout": "mosaic"}))).unwrap_err();
        assert!(err.to_string().contains("does not accept"));
    }

    #[test]
    fn test_apply_rejects_type_mismatch() {
        let err = apply_appearance("post_list", Some(&json!({"show_excerpt": "yes"}))).unwrap_err();
        assert!(err.to_string().contains("must be a boolean"));
    }
}
